// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The "Device retrieval mdoc response" data model, per section 8.3.2.1.2.2 of the [ISO/IEC
//! 18013-5:2021][1] standard.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use std::collections::HashMap;

use bh_jose::{base64_url_decode, base64_url_encode, JwkPublic, SignatureVerifier, SigningAlgorithm};
use bh_status_list::StatusClaim;
use bh_x509::X509Trust;
use bherror::traits::{ErrorContext as _, ForeignError as _};
use serde::{Deserialize, Serialize};

use super::{
    common::{Claims, DataElementIdentifier, DataElementValue, DocType, NameSpace, RequestedElements},
    device_auth::{DeviceAuth, SessionBinding},
    issuer_auth::{DigestAlgorithm, IssuerAuth},
};
use crate::{
    models::{Bytes, BytesCbor},
    utils::digest::{sha256, sha384, sha512},
    DeviceKey, MdocError, Result,
};

/// The version of the [`DeviceResponse`] structure, per section 8.3.2.1.2.2 of the standard.
const DEVICE_RESPONSE_VERSION: &str = "1.0";

/// `DeviceResponse` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<Vec<Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_errors: Option<Vec<DocumentError>>,
    status: u64,
}

impl DeviceResponse {
    pub(crate) fn new(documents: Vec<Document>) -> Self {
        Self {
            version: DEVICE_RESPONSE_VERSION.to_owned(),
            // set to `None` if no `Document`s are present
            documents: (!documents.is_empty()).then_some(documents),
            document_errors: None,
            status: 0,
        }
    }

    /// Parse a `base64url`-encoded (**without padding**) CBOR `DeviceResponse`, as carried in
    /// an OpenID4VP `vp_token` per Table B.6 of [ISO/IEC TS 18013-7:2024][1].
    ///
    /// [1]: <https://www.iso.org/standard/82772.html>
    pub fn from_base64_cbor(value: &str) -> Result<Self> {
        let decoded = base64_url_decode(value)
            .foreign_err(|| MdocError::DeviceResponseParse("invalid base64".to_owned()))?;

        ciborium::from_reader(decoded.as_slice())
            .foreign_err(|| MdocError::DeviceResponseParse("invalid CBOR".to_owned()))
    }

    /// Serialize to the `base64url`-encoded (**without padding**) CBOR form.
    pub fn to_base64_cbor(&self) -> Result<String> {
        let mut cbor = Vec::new();
        ciborium::into_writer(self, &mut cbor).foreign_err(|| {
            MdocError::DeviceResponseParse("serialization to CBOR failed".to_owned())
        })?;

        Ok(base64_url_encode(cbor))
    }

    /// Consume the [`DeviceResponse`] and return the underlying [`Document`]s.
    pub fn into_documents(self) -> Option<Vec<Document>> {
        self.documents
    }
}

/// `Document` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub(crate) doc_type: DocType,
    pub(crate) issuer_signed: IssuerSigned,
    pub(crate) device_signed: DeviceSigned,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Errors>,
}

impl Document {
    pub(crate) fn new(
        doc_type: DocType,
        issuer_signed: IssuerSigned,
        device_signed: DeviceSigned,
    ) -> Self {
        Self {
            doc_type,
            issuer_signed,
            device_signed,
            errors: None,
        }
    }

    /// The document type.
    pub fn doc_type(&self) -> &DocType {
        &self.doc_type
    }

    /// Validate the issuer-signed claims: validity window, `docType`, and the digests of the
    /// presented items.
    ///
    /// This is the **verifier's** view; the holder validates through
    /// [`IssuerSigned::validate_device`].
    pub(crate) fn validate(&self, current_time: u64) -> Result<()> {
        self.issuer_signed
            .validate_verifier(current_time, &self.doc_type)
    }

    /// Extract and return only the data elements.
    pub(crate) fn into_claims(self) -> Claims {
        self.issuer_signed.into_claims()
    }

    /// Verify both the issuer signature and the device signature of this [`Document`].
    ///
    /// With an [`X509Trust`] provided, the issuer's authenticity is verified as well.  Device
    /// MACs are not supported.
    pub(crate) fn verify<'a>(
        &self,
        session: &SessionBinding<'_>,
        trust: Option<&X509Trust>,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<()> {
        self.issuer_signed
            .verify_signature(trust, &get_signature_verifier)
            .ctx(|| "issuer signature")?;

        let device_key = self.issuer_signed.device_key()?;

        self.device_signed
            .verify_signature(
                session,
                &self.doc_type,
                &device_key,
                get_signature_verifier,
            )
            .ctx(|| "device signature")
    }

    /// Get the pointer to the credential's status, if any.
    pub fn status(&self) -> Result<Option<StatusClaim>> {
        self.issuer_signed.status()
    }
}

/// `DocumentError` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentError(DocType, i64);

/// `IssuerSigned` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name_spaces: Option<IssuerNameSpaces>,
    pub(crate) issuer_auth: IssuerAuth,
}

impl IssuerSigned {
    pub(crate) fn new(name_spaces: IssuerNameSpaces, issuer_auth: IssuerAuth) -> Self {
        Self {
            name_spaces: Some(name_spaces),
            issuer_auth,
        }
    }

    /// Deserialize a CBOR-serialized, `base64url`-encoded (**without padding**)
    /// `IssuerSigned`, as issued over OpenID4VCI.
    pub fn from_base64_cbor(base64_url: &str) -> Result<Self> {
        let decoded = base64_url_decode(base64_url)
            .foreign_err(|| MdocError::IssuerSignedParse)
            .ctx(|| "invalid base64-url payload")?;

        ciborium::from_reader(decoded.as_slice())
            .foreign_err(|| MdocError::IssuerSignedParse)
            .ctx(|| "invalid CBOR payload")
    }

    /// Serialize to the `base64url`-encoded (**without padding**) CBOR form.
    pub fn to_base64_cbor(&self) -> Result<String> {
        let mut cbor = Vec::new();
        ciborium::into_writer(self, &mut cbor)
            .foreign_err(|| MdocError::IssuerSignedParse)
            .ctx(|| "serialization to CBOR failed")?;

        Ok(base64_url_encode(cbor))
    }

    /// A new [`IssuerSigned`] with the claims filtered to the requested elements, i.e. with the
    /// remaining claims selectively *not* disclosed.
    pub(crate) fn filtered_claims(&self, requested: &RequestedElements) -> Self {
        let filtered = self
            .name_spaces
            .as_ref()
            .and_then(|all_name_spaces| all_name_spaces.filtered_claims(requested));

        Self {
            name_spaces: filtered,
            issuer_auth: self.issuer_auth.clone(),
        }
    }

    /// Extract and return only the data elements.
    pub fn into_claims(self) -> Claims {
        self.name_spaces
            .map(IssuerNameSpaces::into_claims)
            .unwrap_or_default()
    }

    /// The signed [`DeviceKey`] of the device the credential was issued to.
    pub fn device_key(&self) -> Result<DeviceKey> {
        self.issuer_auth.device_key()
    }

    /// Verify the issuer's signature of the underlying [`IssuerAuth`].
    pub(crate) fn verify_signature<'a>(
        &self,
        trust: Option<&X509Trust>,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<()> {
        self.issuer_auth
            .verify_signature(trust, get_signature_verifier)
    }

    /// Validate the claims of the underlying [`IssuerAuth`] as the Verifier.
    fn validate_verifier(&self, current_time: u64, doc_type: &DocType) -> Result<()> {
        self.issuer_auth
            .validate_verifier(current_time, doc_type, self.name_spaces.as_ref())
    }

    /// Validate the claims of the underlying [`IssuerAuth`] as the Device.
    ///
    /// Unlike the Verifier, the Device accepts *not-yet-valid* credentials.
    pub(crate) fn validate_device(&self, current_time: u64, doc_type: &DocType) -> Result<()> {
        self.issuer_auth
            .validate_device(current_time, doc_type, self.name_spaces.as_ref())
    }

    /// Get the pointer to the credential's status, if any.
    pub fn status(&self) -> Result<Option<StatusClaim>> {
        self.issuer_auth.status()
    }
}

/// `IssuerNameSpaces` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerNameSpaces(pub(crate) HashMap<NameSpace, Vec<IssuerSignedItemBytes>>);

impl IssuerNameSpaces {
    /// Extract and return only the data elements.
    pub fn into_claims(self) -> Claims {
        Claims(
            self.0
                .into_iter()
                .map(|(k, vs)| {
                    let vs_map = vs
                        .into_iter()
                        .map(|item| {
                            let item = IssuerSignedItem::from(item);
                            (item.element_identifier, item.element_value)
                        })
                        .collect();

                    (k, vs_map)
                })
                .collect(),
        )
    }

    /// Keep only the requested items; [`None`] when nothing remains.
    fn filtered_claims(&self, requested: &RequestedElements) -> Option<Self> {
        let mut filtered = HashMap::new();

        for (name_space, issuer_signed_items) in &self.0 {
            let kept: Vec<IssuerSignedItemBytes> = issuer_signed_items
                .iter()
                .filter(|item| requested.contains(name_space, &item.0.inner.element_identifier))
                .cloned()
                .collect();

            if !kept.is_empty() {
                filtered.insert(name_space.clone(), kept);
            }
        }

        (!filtered.is_empty()).then_some(Self(filtered))
    }
}

/// `IssuerSignedItemBytes` per section 8.3.2.1.2.2 of the standard: the tag-24-wrapped
/// [`IssuerSignedItem`], whose exact bytes the MSO digests commit to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerSignedItemBytes(pub(crate) BytesCbor<IssuerSignedItem>);

impl IssuerSignedItemBytes {
    /// Compute the digest of the tag-24 wire bytes of `self`.
    pub fn digest(&self, alg: &DigestAlgorithm) -> Result<Vec<u8>> {
        let payload = self
            .0
            .tagged_bytes()
            .foreign_err(|| MdocError::IssuerAuth)
            .ctx(|| "unable to serialize `IssuerSignedItemBytes`")?;

        Ok(match alg {
            DigestAlgorithm::Sha256 => sha256(&payload).to_vec(),
            DigestAlgorithm::Sha384 => sha384(&payload).to_vec(),
            DigestAlgorithm::Sha512 => sha512(&payload).to_vec(),
        })
    }
}

impl From<IssuerSignedItem> for IssuerSignedItemBytes {
    fn from(value: IssuerSignedItem) -> Self {
        Self(value.into())
    }
}

impl From<IssuerSignedItemBytes> for IssuerSignedItem {
    fn from(value: IssuerSignedItemBytes) -> Self {
        value.0.inner
    }
}

/// `IssuerSignedItem` per section 8.3.2.1.2.2 of the standard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    /// At least 16 random bytes, making the item digest unlinkable.
    pub(crate) random: Bytes,
    #[serde(rename = "digestID")]
    pub(crate) digest_id: DigestID,
    pub(crate) element_value: DataElementValue,
    pub(crate) element_identifier: DataElementIdentifier,
}

/// Digest ID for issuer data authentication; unique per namespace.
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DigestID(pub(crate) u64);

impl std::fmt::Display for DigestID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DigestID {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<usize> for DigestID {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

/// `DeviceSigned` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSigned {
    pub(crate) name_spaces: DeviceNameSpacesBytes,
    pub(crate) device_auth: DeviceAuth,
}

impl DeviceSigned {
    /// Create a new [`DeviceSigned`] by signing the device authentication structure for the
    /// given session binding.
    pub(crate) fn new(
        name_spaces: DeviceNameSpaces,
        session: &SessionBinding<'_>,
        doc_type: &DocType,
        signer: &impl bh_jose::Signer,
    ) -> Result<Self> {
        let name_spaces: DeviceNameSpacesBytes = name_spaces.into();

        let device_auth = DeviceAuth::new_signature(session, doc_type, &name_spaces, signer)?;

        Ok(Self {
            name_spaces,
            device_auth,
        })
    }

    /// Verify the device signature.
    ///
    /// For the OID4VPHandover binding the signed payload is detached and recomputed from the
    /// session parameters; for the legacy bare-challenge binding the payload is the nonce
    /// itself.
    fn verify_signature<'a>(
        &self,
        session: &SessionBinding<'_>,
        doc_type: &DocType,
        device_key: &DeviceKey,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<()> {
        self.device_auth.verify_signature(
            session,
            doc_type,
            &self.name_spaces,
            device_key,
            get_signature_verifier,
        )
    }
}

/// `DeviceNameSpacesBytes` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNameSpacesBytes(pub(crate) BytesCbor<DeviceNameSpaces>);

impl From<DeviceNameSpaces> for DeviceNameSpacesBytes {
    fn from(value: DeviceNameSpaces) -> Self {
        Self(value.into())
    }
}

/// `DeviceNameSpaces` per section 8.3.2.1.2.2 of the standard.
///
/// Data elements signed by the *device* rather than the issuer; empty in the common
/// OpenID4VP flow, where all elements are issuer-signed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceNameSpaces(pub(crate) HashMap<NameSpace, DeviceSignedItems>);

/// `DeviceSignedItems` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignedItems(pub(crate) HashMap<DataElementIdentifier, DataElementValue>);

/// `Errors` per section 8.3.2.1.2.2 of the standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Errors(HashMap<NameSpace, HashMap<DataElementIdentifier, i64>>);

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::Es256Verifier;

    use super::*;
    use crate::utils::test::{present_dummy_mdoc, DUMMY_DOC_TYPE, DUMMY_NAMESPACE};

    #[test]
    fn device_response_base64_cbor_roundtrip() {
        let (response, _session) = present_dummy_mdoc(1000, None);

        let serialized = response.to_base64_cbor().unwrap();
        let deserialized = DeviceResponse::from_base64_cbor(&serialized).unwrap();

        // wire-level roundtrip is byte-exact
        assert_eq!(deserialized.to_base64_cbor().unwrap(), serialized);

        let documents = deserialized.into_documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].doc_type(), &DUMMY_DOC_TYPE.into());
    }

    #[test]
    fn device_response_with_padding_fails() {
        let (response, _) = present_dummy_mdoc(1000, None);
        let payload = response.to_base64_cbor().unwrap() + "=";

        let err = DeviceResponse::from_base64_cbor(&payload).unwrap_err();

        assert_matches!(
            err.error,
            MdocError::DeviceResponseParse(m) if m == "invalid base64"
        );
    }

    #[test]
    fn issuer_signed_base64_cbor_roundtrip() {
        let (response, _) = present_dummy_mdoc(1000, None);
        let issuer_signed = response.into_documents().unwrap().remove(0).issuer_signed;

        let serialized = issuer_signed.to_base64_cbor().unwrap();
        let deserialized = IssuerSigned::from_base64_cbor(&serialized).unwrap();

        assert_eq!(deserialized.to_base64_cbor().unwrap(), serialized);
    }

    #[test]
    fn claims_extraction() {
        let (response, _) = present_dummy_mdoc(1000, None);
        let document = response.into_documents().unwrap().remove(0);

        let claims = document.into_claims();
        assert_eq!(
            claims.get(&DUMMY_NAMESPACE.into(), &"family_name".into()),
            Some(&"Doe".into())
        );
    }

    #[test]
    fn filtering_drops_unrequested_items() {
        let (response, _) = present_dummy_mdoc(1000, None);
        let issuer_signed = response.into_documents().unwrap().remove(0).issuer_signed;

        let mut requested = RequestedElements::default();
        requested.add(DUMMY_NAMESPACE, "family_name");

        let filtered = issuer_signed.filtered_claims(&requested);
        let claims = filtered.into_claims();

        assert!(claims
            .get(&DUMMY_NAMESPACE.into(), &"family_name".into())
            .is_some());
        assert!(claims
            .get(&DUMMY_NAMESPACE.into(), &"given_name".into())
            .is_none());

        // requesting nothing leaves no namespaces at all
        let nothing = RequestedElements::default();
        let (response, _) = present_dummy_mdoc(1000, None);
        let issuer_signed = response.into_documents().unwrap().remove(0).issuer_signed;
        assert!(issuer_signed.filtered_claims(&nothing).name_spaces.is_none());
    }

    #[test]
    fn document_verify_device_signature_roundtrip() {
        let (response, session) = present_dummy_mdoc(1000, None);
        let document = response.into_documents().unwrap().remove(0);

        document
            .verify(&session.as_binding(), None, |_| Some(&Es256Verifier))
            .unwrap();
    }

    #[test]
    fn document_verify_rejects_wrong_nonce() {
        let (response, mut session) = present_dummy_mdoc(1000, None);
        let document = response.into_documents().unwrap().remove(0);

        session.nonce = "some-other-nonce".to_owned();

        let err = document
            .verify(&session.as_binding(), None, |_| Some(&Es256Verifier))
            .unwrap_err();
        assert_matches!(err.error, MdocError::InvalidSignature);
    }

    #[test]
    fn document_verify_rejects_wrong_client_id() {
        let (response, mut session) = present_dummy_mdoc(1000, None);
        let document = response.into_documents().unwrap().remove(0);

        session.client_id = "https://attacker.example".to_owned();

        let err = document
            .verify(&session.as_binding(), None, |_| Some(&Es256Verifier))
            .unwrap_err();
        assert_matches!(err.error, MdocError::InvalidSignature);
    }

    #[test]
    fn document_verify_requires_verifier_implementation() {
        let (response, session) = present_dummy_mdoc(1000, None);
        let document = response.into_documents().unwrap().remove(0);

        let err = document
            .verify(&session.as_binding(), None, |_| None)
            .unwrap_err();
        assert_matches!(
            err.error,
            MdocError::MissingSignatureVerifier(SigningAlgorithm::Es256)
        );
    }
}
