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

//! This module provides the [`Verifier`] type which is used to verify presented `mso_mdoc`
//! Credentials.

use bh_jose::{SignatureVerifier, SigningAlgorithm};
use bh_status_list::StatusClaim;
use bh_x509::X509Trust;
use rand::Rng;

use crate::{
    models::{
        data_retrieval::response::Document, Claims, DeviceResponse, DocType, SessionBinding,
    },
    utils::rand::generate_nonce,
    MdocError, Result,
};

/// Verifier of presented `mso_mdoc` Credentials.
pub struct Verifier {
    client_id: String,
    response_uri: String,
    nonce: String,
}

/// Claims as verified by the [`Verifier`].
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct VerifiedClaims {
    /// The document type of the credential.
    pub doc_type: DocType,

    /// The actual claims of the credential.
    pub claims: Claims,

    /// The pointer to the status of the credential within the corresponding status list.
    pub status: Option<StatusClaim>,
}

impl Verifier {
    /// Creates a new [`Verifier`] with a fresh session `nonce` drawn from `nonce_rng`.
    pub fn new<R: Rng + ?Sized>(client_id: String, response_uri: String, nonce_rng: &mut R) -> Self {
        let nonce = generate_nonce(nonce_rng);
        Self::from_parts(client_id, response_uri, nonce)
    }

    /// Creates a new [`Verifier`] with the provided `nonce` value.
    ///
    /// The caller must ensure the `nonce` is not reused across sessions.
    pub fn from_parts(client_id: String, response_uri: String, nonce: String) -> Self {
        Self {
            client_id,
            response_uri,
            nonce,
        }
    }

    /// Gets the `nonce` value.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Verifies, extracts and returns the claims of every document of the `mDoc` presentation.
    ///
    /// For responses received **encrypted**, `mdoc_generated_nonce` **MUST** be the `apu`
    /// value of the response JWE, selecting the `OID4VPHandover` session-transcript binding.
    /// For unencrypted responses it **MUST** be [`None`], selecting the legacy bare-challenge
    /// binding.
    ///
    /// With an [`X509Trust`] provided, the issuer's authenticity is verified against the trust
    /// anchors; without one it is **NOT** verified.
    ///
    /// This method takes ownership of the [`Verifier`] to prevent accidental reuse of the
    /// session nonce.
    pub fn verify<'a>(
        self,
        device_response: DeviceResponse,
        current_time: u64,
        mdoc_generated_nonce: Option<&str>,
        trust: Option<&X509Trust>,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<Vec<VerifiedClaims>> {
        let session = match mdoc_generated_nonce {
            Some(mdoc_generated_nonce) => SessionBinding::Oid4vpHandover {
                client_id: &self.client_id,
                response_uri: &self.response_uri,
                nonce: &self.nonce,
                mdoc_generated_nonce,
            },
            None => SessionBinding::BareNonce { nonce: &self.nonce },
        };

        device_response
            .into_documents()
            .ok_or_else(|| bherror::Error::root(MdocError::EmptyDeviceResponse))?
            .into_iter()
            .map(|document| {
                Self::document_verify_into_claims(
                    document,
                    &session,
                    trust,
                    &get_signature_verifier,
                    current_time,
                )
            })
            .collect::<Result<_>>()
    }

    /// Verify a single [`Document`] and extract its data elements.
    fn document_verify_into_claims<'a>(
        document: Document,
        session: &SessionBinding<'_>,
        trust: Option<&X509Trust>,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
        current_time: u64,
    ) -> Result<VerifiedClaims> {
        document.verify(session, trust, get_signature_verifier)?;

        document.validate(current_time)?;

        Ok(VerifiedClaims {
            doc_type: document.doc_type().clone(),
            status: document.status()?,
            claims: document.into_claims(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::Es256Verifier;
    use bh_status_list::UriBuf;

    use super::*;
    use crate::utils::test::{present_dummy_mdoc, DummySession, DUMMY_DOC_TYPE, DUMMY_NAMESPACE};

    fn verifier_for(session: &DummySession) -> Verifier {
        Verifier::from_parts(
            session.client_id.clone(),
            session.response_uri.clone(),
            session.nonce.clone(),
        )
    }

    #[test]
    fn verify_happy_path() {
        let (response, session) = present_dummy_mdoc(1000, None);

        let claims = verifier_for(&session)
            .verify(
                response,
                1005,
                session.mdoc_generated_nonce.as_deref(),
                None,
                |_| Some(&Es256Verifier),
            )
            .unwrap();

        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].doc_type, DUMMY_DOC_TYPE.into());
        assert_eq!(
            claims[0].claims.get(&DUMMY_NAMESPACE.into(), &"family_name".into()),
            Some(&"Doe".into())
        );
        assert_eq!(claims[0].status, None);
    }

    #[test]
    fn verify_carries_status_claim() {
        let status = StatusClaim::new(
            UriBuf::new(b"https://issuer.example/status/1".to_vec()).unwrap(),
            74,
        );

        let (response, session) = present_dummy_mdoc(1000, Some(status.clone()));

        let claims = verifier_for(&session)
            .verify(
                response,
                1005,
                session.mdoc_generated_nonce.as_deref(),
                None,
                |_| Some(&Es256Verifier),
            )
            .unwrap();

        assert_eq!(claims[0].status, Some(status));
    }

    #[test]
    fn verify_fails_with_wrong_mdoc_generated_nonce() {
        let (response, session) = present_dummy_mdoc(1000, None);

        let err = verifier_for(&session)
            .verify(response, 1005, Some("not-mgn3"), None, |_| {
                Some(&Es256Verifier)
            })
            .unwrap_err();

        assert_matches!(err.error, MdocError::InvalidSignature);
    }

    #[test]
    fn verify_fails_when_issuer_not_trusted() {
        let (response, session) = present_dummy_mdoc(1000, None);

        let trust = X509Trust::new(vec![]);

        let err = verifier_for(&session)
            .verify(
                response,
                1005,
                session.mdoc_generated_nonce.as_deref(),
                Some(&trust),
                |_| Some(&Es256Verifier),
            )
            .unwrap_err();

        assert_matches!(err.error, MdocError::X5Chain);
    }

    #[test]
    fn empty_response_is_rejected() {
        let response = DeviceResponse::new(vec![]);

        let session = DummySession {
            client_id: "c".to_owned(),
            response_uri: "r".to_owned(),
            nonce: "n".to_owned(),
            mdoc_generated_nonce: None,
        };

        let err = verifier_for(&session)
            .verify(response, 1005, None, None, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(err.error, MdocError::EmptyDeviceResponse);
    }
}
