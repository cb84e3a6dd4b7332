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

//! The revocation-list credential: a VC-JWT whose subject embeds the compressed bit array of
//! [`RevocationList`].

use bh_jose::{HasX5Chain, PublicKeyLookup, SignatureVerifier, Signer, SigningAlgorithm};
use bh_status_list::{CredentialStatus, RevocationList};
use bh_x509::X509Trust;
use bherror::{
    traits::{ErrorContext as _, PropagateError as _},
    Error,
};
use iref::UriBuf;
use serde_json::json;

use crate::{JsonObject, Result, SecondsSinceEpoch, VcJwtClaims, VcJwtError};

/// The credential type of a revocation-list credential.
pub const REVOCATION_LIST_CREDENTIAL_TYPE: &str = "RevocationList2021Credential";

/// The subject type of a revocation-list credential.
const REVOCATION_LIST_SUBJECT_TYPE: &str = "RevocationList2021";

/// Issue the revocation-list credential published at `list_url`.
///
/// The credential subject embeds the zlib-compressed, base64url-encoded bit array; the subject
/// `id` is the list URL itself (there is no holder).
pub fn issue_revocation_list_credential<S: Signer + HasX5Chain>(
    list_url: &UriBuf,
    issuer: &UriBuf,
    list: &RevocationList,
    issued_at: SecondsSinceEpoch,
    signer: &S,
) -> Result<String> {
    let encoded_list = list
        .encoded_list()
        .with_err(|| VcJwtError::SigningFailed)
        .ctx(|| "unable to encode the revocation list")?;

    let mut subject = JsonObject::new();
    subject.insert("type".to_owned(), REVOCATION_LIST_SUBJECT_TYPE.into());
    subject.insert("encodedList".to_owned(), encoded_list.into());

    let claims = VcJwtClaims::new(
        list_url.to_string(),
        REVOCATION_LIST_CREDENTIAL_TYPE.to_owned(),
        issuer,
        list_url.to_string(),
        subject,
        issued_at,
        None,
        None,
    );

    claims.sign(signer)
}

/// Verify a revocation-list credential and decode the embedded bit array.
///
/// When `expected_issuer` is provided, the credential's `iss` must match it; this ties the
/// revocation list to the issuer of the credential whose status is being evaluated.
pub fn decode_revocation_list_credential<'a>(
    compact: &str,
    expected_issuer: Option<&str>,
    trust: Option<&X509Trust>,
    kid_lookup: Option<&dyn PublicKeyLookup>,
    current_time: SecondsSinceEpoch,
    leeway: SecondsSinceEpoch,
    get_signature_verifier: impl FnOnce(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
) -> Result<RevocationList> {
    let claims = VcJwtClaims::verify(
        compact,
        kid_lookup,
        trust,
        None,
        current_time,
        leeway,
        get_signature_verifier,
    )?;

    if claims.credential_type() != Some(REVOCATION_LIST_CREDENTIAL_TYPE) {
        return Err(Error::root(VcJwtError::InvalidStructure(
            "not a revocation-list credential".to_owned(),
        )));
    }

    if let Some(expected) = expected_issuer {
        if claims.iss != expected {
            return Err(Error::root(VcJwtError::InvalidStructure(
                "revocation list issued by a different issuer".to_owned(),
            )));
        }
    }

    if claims.vc.credential_subject.get("type") != Some(&json!(REVOCATION_LIST_SUBJECT_TYPE)) {
        return Err(Error::root(VcJwtError::InvalidStructure(
            "unexpected revocation-list subject type".to_owned(),
        )));
    }

    let encoded = claims
        .vc
        .credential_subject
        .get("encodedList")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            Error::root(VcJwtError::InvalidStructure(
                "missing `encodedList`".to_owned(),
            ))
        })?;

    RevocationList::from_encoded_list(encoded)
        .with_err(|| VcJwtError::InvalidStructure("undecodable `encodedList`".to_owned()))
}

/// Evaluate a credential's [`CredentialStatus`] against a decoded revocation list.
///
/// A status index beyond the capacity of the list is treated as *not revoked*.
pub fn is_revoked(list: &RevocationList, status: &CredentialStatus) -> bool {
    list.is_revoked(status.index() as usize)
}

#[cfg(test)]
mod tests {
    use bh_jose::{Es256Signer, Es256Verifier, SignerWithChain};
    use bh_status_list::DEFAULT_REVOCATION_LIST_SIZE;

    use super::*;

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    fn list_url() -> UriBuf {
        UriBuf::new(b"https://issuer.example/revocation/1".to_vec()).unwrap()
    }

    fn issuer_uri() -> UriBuf {
        UriBuf::new(b"https://issuer.example".to_vec()).unwrap()
    }

    #[test]
    fn revocation_roundtrip() {
        let signer = SignerWithChain::generate("issuer-kid".to_owned(), "issuer", None).unwrap();

        let mut list = RevocationList::new();
        list.set(42, true).unwrap();

        let compact =
            issue_revocation_list_credential(&list_url(), &issuer_uri(), &list, 1000, &signer)
                .unwrap();

        let decoded = decode_revocation_list_credential(
            &compact,
            Some("https://issuer.example"),
            None,
            None,
            1500,
            0,
            get_verifier,
        )
        .unwrap();

        assert_eq!(decoded.size(), DEFAULT_REVOCATION_LIST_SIZE);

        let revoked = CredentialStatus::new(list_url(), 42);
        let valid = CredentialStatus::new(list_url(), 41);
        let out_of_range = CredentialStatus::new(list_url(), u64::MAX);

        assert!(is_revoked(&decoded, &revoked));
        assert!(!is_revoked(&decoded, &valid));
        // a bit outside the list is simply not revoked
        assert!(!is_revoked(&decoded, &out_of_range));
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let signer = SignerWithChain::generate("issuer-kid".to_owned(), "issuer", None).unwrap();

        let compact = issue_revocation_list_credential(
            &list_url(),
            &issuer_uri(),
            &RevocationList::new(),
            1000,
            &signer,
        )
        .unwrap();

        let err = decode_revocation_list_credential(
            &compact,
            Some("https://other-issuer.example"),
            None,
            None,
            1500,
            0,
            get_verifier,
        )
        .unwrap_err();

        assert!(matches!(err.error, VcJwtError::InvalidStructure(_)));
    }

    #[test]
    fn ordinary_credential_is_not_a_revocation_list() {
        let signer = SignerWithChain::generate("issuer-kid".to_owned(), "issuer", None).unwrap();

        let claims = VcJwtClaims::new(
            "urn:uuid:123".to_owned(),
            "AtomicAttribute2023".to_owned(),
            &issuer_uri(),
            "did:key:holder".to_owned(),
            JsonObject::new(),
            1000,
            None,
            None,
        );
        let compact = claims.sign(&signer).unwrap();

        let err =
            decode_revocation_list_credential(&compact, None, None, None, 1500, 0, get_verifier)
                .unwrap_err();

        assert!(matches!(err.error, VcJwtError::InvalidStructure(_)));
    }

    #[test]
    fn bare_signer_can_be_paired_with_a_chain() {
        // the plain Es256Signer cannot issue (no chain); pairing it with a chain works
        let bare = Es256Signer::generate("issuer-kid".to_owned()).unwrap();
        let pem = bare.private_key_pem().unwrap();
        let chain = bh_x509::X5Chain::self_signed(&pem, "issuer", None).unwrap();
        let signer = SignerWithChain::new(bare, chain);

        issue_revocation_list_credential(
            &list_url(),
            &issuer_uri(),
            &RevocationList::new(),
            1000,
            &signer,
        )
        .unwrap();
    }
}
