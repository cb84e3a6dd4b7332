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

//! Device authentication: binding a presented document to the holder's device key and to the
//! OpenID4VP session.
//!
//! The session transcript follows Annex B of [ISO/IEC TS 18013-7:2024][1]: the device signs
//! `DeviceAuthentication = ["DeviceAuthentication", SessionTranscript, docType,
//! DeviceNameSpacesBytes]` (tag-24-wrapped) as a **detached** `COSE_Sign1` payload, where
//! `SessionTranscript = [null, null, ["OID4VPHandover", sha256(cbor([client_id,
//! mdoc_generated_nonce])), sha256(cbor([response_uri, mdoc_generated_nonce])), nonce]]`.
//!
//! For unencrypted responses there is no `mdoc_generated_nonce`; the retained legacy binding
//! simply signs the verifier nonce as an attached payload.
//!
//! [1]: <https://www.iso.org/standard/82772.html>

use bh_jose::{SignatureVerifier, SigningAlgorithm};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _};
use ciborium::Value;
use coset::{Algorithm, Header};
use serde::{Deserialize, Serialize};

use super::{common::DocType, issuer_auth::DeviceKey, response::DeviceNameSpacesBytes};
use crate::{
    utils::coset::{deserialize_coset, registered_alg_to_jws_alg, serialize_coset},
    utils::digest::sha256,
    MdocError, Result,
};

/// The handover identifier of Annex B of ISO/IEC TS 18013-7:2024.
const OID4VP_HANDOVER: &str = "OID4VPHandover";

/// How a presentation is bound to the verifier's session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionBinding<'a> {
    /// The OpenID4VP session-transcript binding for **encrypted** responses; the
    /// `mdoc_generated_nonce` travels to the verifier in the response JWE `apu` header.
    Oid4vpHandover {
        /// The verifier's client identifier.
        client_id: &'a str,
        /// The URI the response is posted to.
        response_uri: &'a str,
        /// The verifier-chosen nonce of the authorization request.
        nonce: &'a str,
        /// The wallet-generated nonce.
        mdoc_generated_nonce: &'a str,
    },

    /// The bare-challenge binding for **unencrypted** responses: the device signature payload
    /// is the UTF-8 nonce itself.  Retained for backwards compatibility; new deployments
    /// should always use encrypted responses.
    BareNonce {
        /// The verifier-chosen nonce of the authorization request.
        nonce: &'a str,
    },
}

/// `DeviceAuth` per section 8.3.2.1.2.2 of ISO/IEC 18013-5:2021.
///
/// Only the signature variant is produced and verified; device MACs would require the session
/// key agreement of in-person device retrieval, which the OpenID4VP flow does not have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceAuth {
    /// Authentication by an ECDSA device signature.
    DeviceSignature(
        #[serde(
            serialize_with = "serialize_coset",
            deserialize_with = "deserialize_coset"
        )]
        coset::CoseSign1,
    ),
    /// Authentication by a MAC; not supported.
    DeviceMac(
        #[serde(
            serialize_with = "serialize_coset",
            deserialize_with = "deserialize_coset"
        )]
        coset::CoseMac0,
    ),
}

impl DeviceAuth {
    /// Sign the device authentication for the given session binding.
    pub(crate) fn new_signature(
        session: &SessionBinding<'_>,
        doc_type: &DocType,
        device_name_spaces: &DeviceNameSpacesBytes,
        signer: &impl bh_jose::Signer,
    ) -> Result<Self> {
        let alg = match signer.algorithm() {
            SigningAlgorithm::Es256 => coset::iana::Algorithm::ES256,
            _ => {
                return Err(bherror::Error::root(MdocError::DeviceAuth)
                    .ctx("Only ES256 signatures are currently supported"))
            }
        };
        let protected = Header {
            alg: Some(Algorithm::Assigned(alg)),
            ..Default::default()
        };
        let builder = coset::CoseSign1Builder::new().protected(protected);

        let cose_sign1 = match session {
            SessionBinding::Oid4vpHandover { .. } => {
                let payload = device_authentication_bytes(session, doc_type, device_name_spaces)?;

                builder
                    .try_create_detached_signature(&payload, &[], |data| signer.sign(data))
                    .foreign_boxed_err(|| MdocError::DeviceAuth)?
                    .build()
            }
            SessionBinding::BareNonce { nonce } => builder
                .payload(nonce.as_bytes().to_vec())
                .try_create_signature(&[], |data| signer.sign(data))
                .foreign_boxed_err(|| MdocError::DeviceAuth)?
                .build(),
        };

        Ok(Self::DeviceSignature(cose_sign1))
    }

    /// Verify the device signature against the committed [`DeviceKey`].
    pub(crate) fn verify_signature<'a>(
        &self,
        session: &SessionBinding<'_>,
        doc_type: &DocType,
        device_name_spaces: &DeviceNameSpacesBytes,
        device_key: &DeviceKey,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<()> {
        let cose_sign1 = match self {
            Self::DeviceSignature(cose_sign1) => cose_sign1,
            Self::DeviceMac(_) => return Err(bherror::Error::root(MdocError::DeviceMac)),
        };

        let alg = cose_sign1
            .protected
            .header
            .alg
            .as_ref()
            .and_then(registered_alg_to_jws_alg)
            .ok_or_else(|| bherror::Error::root(MdocError::MissingSigningAlgorithm))
            .ctx(|| "device authentication")?;

        let jwk = device_key.as_jwk()?;

        let signature_verifier = get_signature_verifier(alg)
            .ok_or_else(|| bherror::Error::root(MdocError::MissingSignatureVerifier(alg)))?;

        let verify = |sig: &[u8], data: &[u8]| -> Result<()> {
            let verified = signature_verifier
                .verify(data, sig, &jwk)
                .foreign_boxed_err(|| MdocError::InvalidSignature)
                .ctx(|| "error while verifying signature")?;

            if !verified {
                return Err(bherror::Error::root(MdocError::InvalidSignature)
                    .ctx("the signature is not valid"));
            };

            Ok(())
        };

        match session {
            SessionBinding::Oid4vpHandover { .. } => {
                let payload = device_authentication_bytes(session, doc_type, device_name_spaces)?;

                cose_sign1.verify_detached_signature(&payload, &[], verify)
            }
            SessionBinding::BareNonce { nonce } => {
                // the bare-challenge binding carries the nonce as the attached payload
                if cose_sign1.payload.as_deref() != Some(nonce.as_bytes()) {
                    return Err(bherror::Error::root(MdocError::InvalidSignature)
                        .ctx("device signature payload is not the session nonce"));
                }

                cose_sign1.verify_signature(&[], verify)
            }
        }
    }
}

/// The tag-24-wrapped `DeviceAuthentication` bytes, i.e. the detached signature payload.
fn device_authentication_bytes(
    session: &SessionBinding<'_>,
    doc_type: &DocType,
    device_name_spaces: &DeviceNameSpacesBytes,
) -> Result<Vec<u8>> {
    let SessionBinding::Oid4vpHandover {
        client_id,
        response_uri,
        nonce,
        mdoc_generated_nonce,
    } = session
    else {
        return Err(bherror::Error::root(MdocError::DeviceAuth)
            .ctx("no DeviceAuthentication structure for the bare-challenge binding"));
    };

    let transcript = session_transcript(client_id, response_uri, nonce, mdoc_generated_nonce)?;

    let name_spaces_value = device_name_spaces
        .0
        .try_into_cbor()
        .foreign_err(|| MdocError::DeviceAuth)
        .ctx(|| "unable to serialize DeviceNameSpacesBytes")?;

    let device_authentication = Value::Array(vec![
        Value::Text("DeviceAuthentication".to_owned()),
        transcript,
        Value::Text(doc_type.to_string()),
        name_spaces_value,
    ]);

    let mut inner = Vec::new();
    ciborium::into_writer(&device_authentication, &mut inner)
        .foreign_err(|| MdocError::DeviceAuth)?;

    let tagged = Value::Tag(24, Box::new(Value::Bytes(inner)));
    let mut bytes = Vec::new();
    ciborium::into_writer(&tagged, &mut bytes).foreign_err(|| MdocError::DeviceAuth)?;

    Ok(bytes)
}

/// The `SessionTranscript` with the `OID4VPHandover` of Annex B of ISO/IEC TS 18013-7:2024.
///
/// The device-engagement and reader-key slots are `null`, as there is no in-person engagement
/// over OpenID4VP.
fn session_transcript(
    client_id: &str,
    response_uri: &str,
    nonce: &str,
    mdoc_generated_nonce: &str,
) -> Result<Value> {
    let hash_pair = |left: &str| -> Result<Value> {
        let pair = Value::Array(vec![
            Value::Text(left.to_owned()),
            Value::Text(mdoc_generated_nonce.to_owned()),
        ]);

        let mut bytes = Vec::new();
        ciborium::into_writer(&pair, &mut bytes).foreign_err(|| MdocError::DeviceAuth)?;

        Ok(Value::Bytes(sha256(&bytes).to_vec()))
    };

    Ok(Value::Array(vec![
        Value::Null,
        Value::Null,
        Value::Array(vec![
            Value::Text(OID4VP_HANDOVER.to_owned()),
            hash_pair(client_id)?,
            hash_pair(response_uri)?,
            Value::Text(nonce.to_owned()),
        ]),
    ]))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::Es256Verifier;

    use super::*;
    use crate::{models::data_retrieval::response::DeviceNameSpaces, utils::test::dummy_device_key};

    fn handover_session() -> SessionBinding<'static> {
        SessionBinding::Oid4vpHandover {
            client_id: "https://verifier.example/rp2",
            response_uri: "https://verifier.example/cb",
            nonce: "n3",
            mdoc_generated_nonce: "mgn3",
        }
    }

    fn empty_name_spaces() -> DeviceNameSpacesBytes {
        DeviceNameSpaces::default().into()
    }

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    #[test]
    fn handover_signature_roundtrip() {
        let (device_signer, device_key) = dummy_device_key();
        let doc_type: DocType = "org.iso.18013.5.1.mDL".into();

        let auth = DeviceAuth::new_signature(
            &handover_session(),
            &doc_type,
            &empty_name_spaces(),
            &device_signer,
        )
        .unwrap();

        // the handover payload is detached
        let DeviceAuth::DeviceSignature(cose_sign1) = &auth else {
            panic!("expected a device signature");
        };
        assert!(cose_sign1.payload.is_none());

        auth.verify_signature(
            &handover_session(),
            &doc_type,
            &empty_name_spaces(),
            &device_key,
            get_verifier,
        )
        .unwrap();
    }

    #[test]
    fn handover_binds_every_session_parameter() {
        let (device_signer, device_key) = dummy_device_key();
        let doc_type: DocType = "org.iso.18013.5.1.mDL".into();

        let auth = DeviceAuth::new_signature(
            &handover_session(),
            &doc_type,
            &empty_name_spaces(),
            &device_signer,
        )
        .unwrap();

        let tampered_sessions = [
            SessionBinding::Oid4vpHandover {
                client_id: "https://attacker.example",
                response_uri: "https://verifier.example/cb",
                nonce: "n3",
                mdoc_generated_nonce: "mgn3",
            },
            SessionBinding::Oid4vpHandover {
                client_id: "https://verifier.example/rp2",
                response_uri: "https://attacker.example/cb",
                nonce: "n3",
                mdoc_generated_nonce: "mgn3",
            },
            SessionBinding::Oid4vpHandover {
                client_id: "https://verifier.example/rp2",
                response_uri: "https://verifier.example/cb",
                nonce: "3n",
                mdoc_generated_nonce: "mgn3",
            },
            SessionBinding::Oid4vpHandover {
                client_id: "https://verifier.example/rp2",
                response_uri: "https://verifier.example/cb",
                nonce: "n3",
                mdoc_generated_nonce: "other",
            },
        ];

        for session in tampered_sessions {
            let err = auth
                .verify_signature(
                    &session,
                    &doc_type,
                    &empty_name_spaces(),
                    &device_key,
                    get_verifier,
                )
                .unwrap_err();
            assert_matches!(err.error, MdocError::InvalidSignature);
        }
    }

    #[test]
    fn bare_nonce_signature_roundtrip() {
        let (device_signer, device_key) = dummy_device_key();
        let doc_type: DocType = "org.iso.18013.5.1.mDL".into();
        let session = SessionBinding::BareNonce { nonce: "n4" };

        let auth =
            DeviceAuth::new_signature(&session, &doc_type, &empty_name_spaces(), &device_signer)
                .unwrap();

        // the legacy payload is the attached nonce
        let DeviceAuth::DeviceSignature(cose_sign1) = &auth else {
            panic!("expected a device signature");
        };
        assert_eq!(cose_sign1.payload.as_deref(), Some(b"n4".as_slice()));

        auth.verify_signature(
            &session,
            &doc_type,
            &empty_name_spaces(),
            &device_key,
            get_verifier,
        )
        .unwrap();

        // the reversed challenge is rejected
        let err = auth
            .verify_signature(
                &SessionBinding::BareNonce { nonce: "4n" },
                &doc_type,
                &empty_name_spaces(),
                &device_key,
                get_verifier,
            )
            .unwrap_err();
        assert_matches!(err.error, MdocError::InvalidSignature);
    }

    #[test]
    fn foreign_device_key_is_rejected() {
        let (device_signer, _) = dummy_device_key();
        let (_, other_key) = dummy_device_key();
        let doc_type: DocType = "org.iso.18013.5.1.mDL".into();

        let auth = DeviceAuth::new_signature(
            &handover_session(),
            &doc_type,
            &empty_name_spaces(),
            &device_signer,
        )
        .unwrap();

        let err = auth
            .verify_signature(
                &handover_session(),
                &doc_type,
                &empty_name_spaces(),
                &other_key,
                get_verifier,
            )
            .unwrap_err();
        assert_matches!(err.error, MdocError::InvalidSignature);
    }
}
