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

//! `IssuerAuth` and the `MobileSecurityObject`, per section 9.1.2 of [ISO/IEC
//! 18013-5:2021][1] and [RFC 9052][2]/[RFC 9360][3].
//!
//! [1]: <https://www.iso.org/standard/69084.html>
//! [2]: <https://datatracker.ietf.org/doc/rfc9052/>
//! [3]: <https://datatracker.ietf.org/doc/rfc9360/>

use std::collections::HashMap;

use bh_jose::{public_jwk_from_x5chain_leaf, JwkPublic, SignatureVerifier, SigningAlgorithm};
use bh_status_list::StatusClaim;
use bh_x509::{X509Trust, X5Chain};
use bherror::traits::{
    ErrorContext as _, ForeignBoxed as _, ForeignError as _, PropagateError as _,
};
use coset::{
    iana::{EnumI64 as _, HeaderParameter},
    Algorithm, CoseKey, Header, Label,
};

use super::{
    common::{DataElementIdentifier, DocType, NameSpace},
    response::{DigestID, IssuerNameSpaces, IssuerSignedItemBytes},
};
use crate::{
    error::MdocError,
    models::{Bytes, BytesCbor, DateTime},
    utils::coset::{
        cose_key_from_jwk, cose_key_to_jwk, deserialize_coset, registered_alg_to_jws_alg,
        serialize_coset,
    },
    Result,
};

/// The version of the [`MobileSecurityObject`] structure, per section 9.1.2.4 of the standard.
const MOBILE_SECURITY_OBJECT_VERSION: &str = "1.0";

/// The digest algorithm used when issuing.
const MSO_DEFAULT_DIGEST_ALG: DigestAlgorithm = DigestAlgorithm::Sha256;

/// `IssuerAuth` per section 9.1.2.4 of the standard: a `COSE_Sign1` whose payload is the
/// tag-24-wrapped [`MobileSecurityObject`].
///
/// The protected header carries `alg`; the unprotected header carries the issuer `x5chain`
/// (RFC 9360), which verifiers resolve the issuer key from.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IssuerAuth(
    #[serde(
        serialize_with = "serialize_coset",
        deserialize_with = "deserialize_coset"
    )]
    pub(crate) coset::CoseSign1,
);

impl IssuerAuth {
    /// Build and sign a new `IssuerAuth` for the provided namespaces.
    ///
    /// Digests of every [`IssuerSignedItemBytes`] land in the MSO `valueDigests`; the device
    /// key is committed via `deviceKeyInfo.deviceKey`.  Only `ES256` signing is currently
    /// supported.
    pub fn new<S: bh_jose::Signer + bh_jose::HasX5Chain>(
        doc_type: DocType,
        name_spaces: &IssuerNameSpaces,
        device_key: DeviceKey,
        validity_info: ValidityInfo,
        status: Option<StatusClaim>,
        signer: &S,
    ) -> Result<Self> {
        let alg = match signer.algorithm() {
            SigningAlgorithm::Es256 => coset::iana::Algorithm::ES256,
            _ => {
                return Err(bherror::Error::root(MdocError::IssuerAuth)
                    .ctx("Only ES256 signatures are currently supported"))
            }
        };
        let protected = Header {
            alg: Some(Algorithm::Assigned(alg)),
            ..Default::default()
        };

        let unprotected = Header {
            rest: vec![(
                Label::Int(HeaderParameter::X5Chain.to_i64()),
                x5chain_to_cbor_value(signer.x5chain())?,
            )],
            ..Default::default()
        };

        let mso =
            MobileSecurityObject::new(doc_type, name_spaces, device_key, validity_info, status)?;
        let mso: MobileSecurityObjectBytes = mso.into();
        let mut mso_bytes = vec![];
        ciborium::into_writer(&mso, &mut mso_bytes).foreign_err(|| MdocError::IssuerAuth)?;

        let cose_sign1 = coset::CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected)
            .payload(mso_bytes)
            .try_create_signature(&[], |data| signer.sign(data))
            .foreign_boxed_err(|| MdocError::IssuerAuth)?
            .build();

        Ok(Self(cose_sign1))
    }

    /// Verify the issuer's signature, resolving the issuer key from the `x5chain` header.
    ///
    /// With an [`X509Trust`] provided, the chain must verify against the trust anchors;
    /// without one, the leaf key is used without authenticating the issuer.
    pub(crate) fn verify_signature<'a>(
        &self,
        trust: Option<&X509Trust>,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<()> {
        let alg = self
            .signing_algorithm()
            .ok_or_else(|| bherror::Error::root(MdocError::MissingSigningAlgorithm))
            .ctx(|| "issuer authentication")?;

        let x5chain = self.x5chain()?;

        if let Some(trust) = trust {
            trust
                .verify(&x5chain)
                .with_err(|| MdocError::X5Chain)
                .ctx(|| "issuer not trusted")?;
        }

        let jwk = public_jwk_from_x5chain_leaf(&x5chain, &alg, None)
            .with_err(|| MdocError::InvalidPublicKey)?;

        let signature_verifier = get_signature_verifier(alg)
            .ok_or_else(|| bherror::Error::root(MdocError::MissingSignatureVerifier(alg)))?;

        self.0.verify_signature(&[], |sig, data| {
            let verified = signature_verifier
                .verify(data, sig, &jwk)
                .foreign_boxed_err(|| MdocError::InvalidSignature)
                .ctx(|| "error while verifying signature")?;

            if !verified {
                return Err(bherror::Error::root(MdocError::InvalidSignature)
                    .ctx("the signature is not valid"));
            };

            Ok(())
        })
    }

    /// Validate the MSO claims as the Verifier: `docType`, the full validity window, and the
    /// digests of the presented namespaces.
    pub(crate) fn validate_verifier(
        &self,
        current_time: u64,
        doc_type: &DocType,
        name_spaces: Option<&IssuerNameSpaces>,
    ) -> Result<()> {
        self.mso()?
            .validate(current_time, doc_type, name_spaces, true)
    }

    /// Validate the MSO claims as the Device: like the Verifier, but accepting not-yet-valid
    /// credentials.
    pub(crate) fn validate_device(
        &self,
        current_time: u64,
        doc_type: &DocType,
        name_spaces: Option<&IssuerNameSpaces>,
    ) -> Result<()> {
        self.mso()?
            .validate(current_time, doc_type, name_spaces, false)
    }

    /// Return the [`MobileSecurityObject`] from the payload.
    pub(crate) fn mso(&self) -> Result<MobileSecurityObject> {
        let Some(payload) = &self.0.payload else {
            return Err(bherror::Error::root(MdocError::IssuerAuth).ctx("MSO is missing"));
        };

        let mso: MobileSecurityObjectBytes = ciborium::from_reader(payload.as_slice())
            .foreign_err(|| MdocError::IssuerAuth)
            .ctx(|| "Invalid Mobile Security Object")?;

        Ok(mso.into())
    }

    /// Returns the [`DeviceKey`] committed by the underlying MSO.
    pub fn device_key(&self) -> Result<DeviceKey> {
        Ok(self.mso()?.device_key_info.device_key)
    }

    /// Get the pointer to the credential's status from the MSO, if any.
    pub fn status(&self) -> Result<Option<StatusClaim>> {
        Ok(self.mso()?.status)
    }

    /// Return the `alg` element of the protected header.
    pub fn signing_algorithm(&self) -> Option<SigningAlgorithm> {
        let alg = self.0.protected.header.alg.as_ref()?;
        registered_alg_to_jws_alg(alg)
    }

    /// Return the `x5chain` from the unprotected header.
    pub fn x5chain(&self) -> Result<X5Chain> {
        let x5chain = self
            .0
            .unprotected
            .rest
            .iter()
            .find_map(|(l, v)| (l == &Label::Int(HeaderParameter::X5Chain.to_i64())).then_some(v))
            .ok_or_else(|| bherror::Error::root(MdocError::X5Chain).ctx("missing `x5chain`"))?;

        cbor_value_to_x5chain(x5chain.clone())
    }
}

/// Serialize an [`X5Chain`] per [RFC 9360][1]: a single certificate as a CBOR byte string, a
/// chain as an array of byte strings.
///
/// [1]: <https://www.rfc-editor.org/rfc/rfc9360.html#section-2-5.4.4>
fn x5chain_to_cbor_value(x5chain: X5Chain) -> Result<ciborium::Value> {
    let mut certs = x5chain
        .as_bytes()
        .with_err(|| MdocError::X5Chain)
        .ctx(|| "X.509 certificate to DER error")?
        .into_iter()
        .map(|cert| cert.into())
        .collect::<Vec<ciborium::Value>>();

    Ok(if certs.len() == 1 {
        certs.remove(0)
    } else {
        certs.into()
    })
}

/// Inverse of [`x5chain_to_cbor_value`].
fn cbor_value_to_x5chain(value: ciborium::Value) -> Result<X5Chain> {
    let chain = match value {
        ciborium::Value::Bytes(bytes) => vec![bytes],
        ciborium::Value::Array(arr) => arr
            .into_iter()
            .map(ciborium::Value::into_bytes)
            .collect::<std::result::Result<_, _>>()
            // `map_err` because the underlying error is not a `std` error
            .map_err(|_| {
                bherror::Error::root(MdocError::X5Chain).ctx("`x5chain` must only contain bytes")
            })?,
        _ => {
            return Err(
                bherror::Error::root(MdocError::X5Chain).ctx("`x5chain` must only contain bytes")
            )
        }
    };

    X5Chain::from_raw_bytes(&chain)
        .with_err(|| MdocError::X5Chain)
        .ctx(|| "invalid `x5chain`")
}

/// The tag-24-wrapped form of the [`MobileSecurityObject`], whose exact bytes are what the
/// `IssuerAuth` signature covers.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct MobileSecurityObjectBytes(BytesCbor<MobileSecurityObject>);

impl From<MobileSecurityObject> for MobileSecurityObjectBytes {
    fn from(value: MobileSecurityObject) -> Self {
        Self(value.into())
    }
}

impl From<MobileSecurityObjectBytes> for MobileSecurityObject {
    fn from(value: MobileSecurityObjectBytes) -> Self {
        value.0.inner
    }
}

/// The `MobileSecurityObject` per section 9.1.2.4 of the standard: the issuer's signed
/// commitment to the document's items, device key and validity.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileSecurityObject {
    version: String,
    digest_algorithm: DigestAlgorithm,
    value_digests: ValueDigests,
    device_key_info: DeviceKeyInfo,
    doc_type: DocType,
    validity_info: ValidityInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<StatusClaim>,
}

impl MobileSecurityObject {
    fn new(
        doc_type: DocType,
        IssuerNameSpaces(ref name_spaces): &IssuerNameSpaces,
        device_key: DeviceKey,
        validity_info: ValidityInfo,
        status: Option<StatusClaim>,
    ) -> Result<Self> {
        let digest = |item: &IssuerSignedItemBytes| -> Result<(DigestID, Bytes)> {
            Ok((
                item.0.inner.digest_id,
                item.digest(&MSO_DEFAULT_DIGEST_ALG)?.into(),
            ))
        };

        let value_digests = name_spaces
            .iter()
            .map(|(name_space, items)| {
                let digests = items.iter().map(digest).collect::<Result<_>>()?;

                Ok((name_space.clone(), DigestIDs(digests)))
            })
            .collect::<Result<_>>()?;

        Ok(MobileSecurityObject {
            version: MOBILE_SECURITY_OBJECT_VERSION.to_owned(),
            digest_algorithm: MSO_DEFAULT_DIGEST_ALG,
            value_digests: ValueDigests(value_digests),
            device_key_info: DeviceKeyInfo {
                device_key,
                key_authorizations: None,
                key_info: None,
            },
            doc_type,
            validity_info,
            status,
        })
    }

    /// Validate `docType`, the validity window, and the digests of the presented namespaces.
    ///
    /// `check_valid_from` distinguishes the Verifier (which rejects not-yet-valid documents)
    /// from the Device (which may hold them).
    fn validate(
        &self,
        current_time: u64,
        doc_type: &DocType,
        name_spaces: Option<&IssuerNameSpaces>,
        check_valid_from: bool,
    ) -> Result<()> {
        if &self.doc_type != doc_type {
            return Err(bherror::Error::root(MdocError::InvalidDocType(
                doc_type.clone(),
                self.doc_type.clone(),
            )));
        }

        self.validity_info.validate(current_time, check_valid_from)?;

        if let Some(name_spaces) = name_spaces {
            self.validate_name_spaces(name_spaces)?;
        };

        Ok(())
    }

    /// Re-digest every presented data element and check it against `valueDigests`.
    ///
    /// Non-presented digests stay authenticated but hidden; presented items whose digest is
    /// absent or different are an error.
    fn validate_name_spaces(&self, name_spaces: &IssuerNameSpaces) -> Result<()> {
        for (name_space, items) in &name_spaces.0 {
            if items.is_empty() {
                continue;
            }

            let mso_digests = self.value_digests.0.get(name_space).ok_or_else(|| {
                bherror::Error::root(MdocError::MissingDigestNamespace(name_space.clone()))
            })?;

            for item in items {
                let digest_id = &item.0.inner.digest_id;

                let mso_digest = mso_digests.0.get(digest_id).ok_or_else(|| {
                    bherror::Error::root(MdocError::MissingOrInvalidDigest(
                        name_space.clone(),
                        digest_id.0,
                    ))
                    .ctx("the digest is missing")
                })?;
                let target_digest = item.digest(&self.digest_algorithm)?;

                if mso_digest.0 != target_digest {
                    return Err(bherror::Error::root(MdocError::MissingOrInvalidDigest(
                        name_space.clone(),
                        digest_id.0,
                    ))
                    .ctx("the digest is not valid"));
                }
            }
        }

        Ok(())
    }
}

/// Supported digest algorithms per table 21 of section 9.1.2.5 of the standard.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256.
    #[serde(rename = "SHA-256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "SHA-384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "SHA-512")]
    Sha512,
}

/// `ValueDigests` per section 9.1.2.4 of the standard.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValueDigests(HashMap<NameSpace, DigestIDs>);

/// `DigestIDs` per section 9.1.2.4 of the standard.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DigestIDs(HashMap<DigestID, Bytes>);

/// `DeviceKeyInfo` per section 9.1.2.4 of the standard.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    device_key: DeviceKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_authorizations: Option<KeyAuthorizations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_info: Option<HashMap<i64, ciborium::Value>>,
}

/// The device's public key as a `COSE_Key` (RFC 9052).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceKey(
    #[serde(
        serialize_with = "serialize_coset",
        deserialize_with = "deserialize_coset"
    )]
    pub(crate) CoseKey,
);

impl DeviceKey {
    /// Create a [`DeviceKey`] out of a public JWK.
    pub fn from_jwk(jwk: &JwkPublic) -> Result<Self> {
        Ok(Self(
            cose_key_from_jwk(jwk).ctx(|| "Failed to create DeviceKey")?,
        ))
    }

    /// Return a JWK representation of the underlying `COSE_Key`.
    pub fn as_jwk(&self) -> Result<JwkPublic> {
        cose_key_to_jwk(&self.0)
    }
}

/// `KeyAuthorizations` per section 9.1.2.4 of the standard.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAuthorizations {
    #[serde(skip_serializing_if = "Option::is_none")]
    name_spaces: Option<Vec<NameSpace>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_elements: Option<HashMap<NameSpace, Vec<DataElementIdentifier>>>,
}

/// `ValidityInfo` per section 9.1.2.4 of the standard.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityInfo {
    signed: DateTime,
    valid_from: DateTime,
    valid_until: DateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_update: Option<DateTime>,
}

impl ValidityInfo {
    /// Assemble the validity window from seconds-since-epoch timestamps.
    pub fn new(signed: u64, valid_from: u64, valid_until: u64) -> Result<Self> {
        Ok(Self {
            signed: signed.try_into()?,
            valid_from: valid_from.try_into()?,
            valid_until: valid_until.try_into()?,
            expected_update: None,
        })
    }

    /// Validate the window: `validUntil` always, `validFrom` only when `check_valid_from`.
    fn validate(&self, current_time: u64, check_valid_from: bool) -> Result<()> {
        if check_valid_from {
            let valid_from = self.valid_from.timestamp();
            if (current_time as i128) < (valid_from as i128) {
                return Err(bherror::Error::root(MdocError::DocumentNotYetValid(
                    valid_from,
                )));
            }
        }

        let valid_until = self.valid_until.timestamp();
        if (current_time as i128) > (valid_until as i128) {
            return Err(bherror::Error::root(MdocError::DocumentExpired(
                valid_until,
            )));
        }

        Ok(())
    }
}
