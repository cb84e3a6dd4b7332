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

use bh_jose::{
    HasX5Chain, JwsHeader, JwsSigned, PublicKeyLookup, SignatureVerifier, Signer,
    SigningAlgorithm,
};
use bh_status_list::CredentialStatus;
use bh_x509::X509Trust;
use bherror::{
    traits::{ErrorContext as _, ForeignError as _, PropagateError as _},
    Error,
};
use iref::UriBuf;
use serde::{Deserialize, Serialize};

use crate::{JsonObject, Result, SecondsSinceEpoch, VcJwtError};

/// The `typ` header value of a VC-JWT.
pub const TYP_VC_JWT: &str = "JWT";

/// The base JSON-LD context every W3C credential carries.
pub const W3C_CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// The base type every W3C credential carries.
const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

/// The `vc` member of a VC-JWT payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    /// JSON-LD contexts; the first one is always [`W3C_CREDENTIALS_CONTEXT`].
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Credential identifier; equals the `jti` claim.
    pub id: String,

    /// Credential types, always including `VerifiableCredential`.
    #[serde(rename = "type")]
    pub types: Vec<String>,

    /// Credential issuer; equals the `iss` claim.
    pub issuer: String,

    /// Time of issuance in seconds since the UNIX epoch; equals the `nbf` claim.
    pub issuance_date: SecondsSinceEpoch,

    /// Optional expiration time; equals the `exp` claim when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<SecondsSinceEpoch>,

    /// The claims about the credential subject; its `id` member identifies the holder key.
    pub credential_subject: JsonObject,

    /// Optional pointer into a revocation list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatus>,
}

/// The payload of a VC-JWT.
///
/// Invariants: `jti == vc.id`, `iss == vc.issuer`, `nbf == vc.issuanceDate`,
/// `exp == vc.expirationDate` (when present), and `sub` equals the credential subject `id`.
/// [`VcJwtClaims::new`] establishes them; [`VcJwtClaims::verify`] rejects payloads violating
/// them with [`VcJwtError::InvalidStructure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcJwtClaims {
    /// The issuer identifier.
    pub iss: String,

    /// The holder key identifier.
    pub sub: String,

    /// Not-valid-before time.
    pub nbf: SecondsSinceEpoch,

    /// Optional expiration time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<SecondsSinceEpoch>,

    /// The credential identifier.
    pub jti: String,

    /// The credential itself.
    pub vc: VerifiableCredential,
}

impl VcJwtClaims {
    /// Assemble a consistent VC-JWT payload.
    ///
    /// The registered claims are derived from the credential data, so the cross-field
    /// invariants hold by construction.  The holder is identified by `subject_id`, which lands
    /// both in the `sub` claim and the credential subject `id`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        credential_type: String,
        issuer: &UriBuf,
        subject_id: String,
        mut credential_subject: JsonObject,
        issuance_date: SecondsSinceEpoch,
        expiration_date: Option<SecondsSinceEpoch>,
        credential_status: Option<CredentialStatus>,
    ) -> Self {
        credential_subject.insert("id".to_owned(), subject_id.clone().into());

        Self {
            iss: issuer.to_string(),
            sub: subject_id,
            nbf: issuance_date,
            exp: expiration_date,
            jti: id.clone(),
            vc: VerifiableCredential {
                context: vec![W3C_CREDENTIALS_CONTEXT.to_owned()],
                id,
                types: vec![VERIFIABLE_CREDENTIAL_TYPE.to_owned(), credential_type],
                issuer: issuer.to_string(),
                issuance_date,
                expiration_date,
                credential_subject,
                credential_status,
            },
        }
    }

    /// Sign the payload into the compact VC-JWT form, carrying the signer's certificate chain
    /// in the `x5c` header.
    pub fn sign<S: Signer + HasX5Chain>(&self, signer: &S) -> Result<String> {
        let header = JwsHeader::with_x5chain(signer, Some(TYP_VC_JWT))
            .with_err(|| VcJwtError::SigningFailed)?;

        let payload = serde_json::to_vec(self).foreign_err(|| VcJwtError::SigningFailed)?;

        let jws = JwsSigned::sign(header, &payload, signer).with_err(|| VcJwtError::SigningFailed)?;

        Ok(jws.serialize_compact())
    }

    /// Parse & verify a compact VC-JWT.
    ///
    /// The signer key is resolved from the JWS header (`jwk` → `x5c` → `kid` priority; see
    /// [`JwsSigned::resolve_signer_key`]), the §4.5 cross-field invariants are checked, and the
    /// time window is evaluated with the provided `leeway`.  When `expected_subject` is given,
    /// the `sub` claim must equal it, binding the credential to a concrete holder key.
    #[allow(clippy::too_many_arguments)]
    pub fn verify<'a>(
        compact: &str,
        kid_lookup: Option<&dyn PublicKeyLookup>,
        trust: Option<&X509Trust>,
        expected_subject: Option<&str>,
        current_time: SecondsSinceEpoch,
        leeway: SecondsSinceEpoch,
        get_signature_verifier: impl FnOnce(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<Self> {
        let jws = JwsSigned::parse(compact)
            .with_err(|| VcJwtError::NonParseable)
            .ctx(|| "not a compact JWS")?;

        jws.verify(kid_lookup, trust, get_signature_verifier)
            .with_err(|| VcJwtError::InvalidSignature)?;

        let claims: VcJwtClaims = serde_json::from_slice(&jws.payload)
            .foreign_err(|| VcJwtError::NonParseable)
            .ctx(|| "payload is not a VC-JWT claims set")?;

        claims.validate(expected_subject, current_time, leeway)?;

        Ok(claims)
    }

    /// Check the cross-field invariants and the time window.
    fn validate(
        &self,
        expected_subject: Option<&str>,
        current_time: SecondsSinceEpoch,
        leeway: SecondsSinceEpoch,
    ) -> Result<()> {
        let structure = |field: &str| Error::root(VcJwtError::InvalidStructure(field.to_owned()));

        if self.iss != self.vc.issuer {
            return Err(structure("iss"));
        }
        if self.jti != self.vc.id {
            return Err(structure("jti"));
        }
        if self.nbf != self.vc.issuance_date {
            return Err(structure("nbf"));
        }
        if self.exp != self.vc.expiration_date {
            return Err(structure("exp"));
        }
        if !self.vc.types.iter().any(|t| t == VERIFIABLE_CREDENTIAL_TYPE) {
            return Err(structure("type"));
        }

        let subject_id = self
            .vc
            .credential_subject
            .get("id")
            .and_then(serde_json::Value::as_str);
        if subject_id != Some(self.sub.as_str()) {
            return Err(structure("sub"));
        }
        if let Some(expected) = expected_subject {
            if self.sub != expected {
                return Err(structure("sub"));
            }
        }

        if self.nbf > current_time + leeway {
            return Err(Error::root(VcJwtError::NotYetValid(current_time, self.nbf)));
        }
        if let Some(exp) = self.exp {
            if current_time > exp + leeway {
                return Err(Error::root(VcJwtError::Expired(current_time, exp)));
            }
        }

        Ok(())
    }

    /// The credential type beyond the base `VerifiableCredential`, if any.
    pub fn credential_type(&self) -> Option<&str> {
        self.vc
            .types
            .iter()
            .map(String::as_str)
            .find(|t| *t != VERIFIABLE_CREDENTIAL_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::{json_object, Es256Signer, Es256Verifier, SignerWithChain};

    use super::*;

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    fn issuer_uri() -> UriBuf {
        UriBuf::new(b"https://issuer.example".to_vec()).unwrap()
    }

    fn issuer_signer() -> SignerWithChain<Es256Signer> {
        SignerWithChain::generate("issuer-kid".to_owned(), "issuer", None).unwrap()
    }

    fn dummy_claims(exp: Option<u64>) -> VcJwtClaims {
        VcJwtClaims::new(
            "urn:uuid:17e4ad6a-2a9f-4b9b-a6a3-fb91b535f6b2".to_owned(),
            "AtomicAttribute2023".to_owned(),
            &issuer_uri(),
            "did:key:holder".to_owned(),
            json_object!({ "given-name": "Erika" }),
            1000,
            exp,
            None,
        )
    }

    #[test]
    fn invariants_hold_by_construction() {
        let claims = dummy_claims(Some(2000));

        assert_eq!(claims.jti, claims.vc.id);
        assert_eq!(claims.iss, claims.vc.issuer);
        assert_eq!(claims.nbf, claims.vc.issuance_date);
        assert_eq!(claims.exp, claims.vc.expiration_date);
        assert_eq!(
            claims.vc.credential_subject.get("id").unwrap(),
            "did:key:holder"
        );
        assert_eq!(claims.credential_type(), Some("AtomicAttribute2023"));
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let signer = issuer_signer();
        let claims = dummy_claims(Some(2000));

        let compact = claims.sign(&signer).unwrap();

        let verified = VcJwtClaims::verify(
            &compact,
            None,
            None,
            Some("did:key:holder"),
            1500,
            0,
            get_verifier,
        )
        .unwrap();

        assert_eq!(verified, claims);
        assert_eq!(
            verified.vc.credential_subject.get("given-name").unwrap(),
            "Erika"
        );
    }

    #[test]
    fn trust_anchor_is_enforced() {
        let signer = issuer_signer();
        let compact = dummy_claims(None).sign(&signer).unwrap();

        // trusting the issuer's own leaf passes
        let trust = X509Trust::new(vec![signer.x5chain().leaf_certificate().clone()]);
        VcJwtClaims::verify(&compact, None, Some(&trust), None, 1500, 0, get_verifier).unwrap();

        // an empty trust set fails
        let no_trust = X509Trust::new(vec![]);
        let err =
            VcJwtClaims::verify(&compact, None, Some(&no_trust), None, 1500, 0, get_verifier)
                .unwrap_err();
        assert_eq!(err.error, VcJwtError::InvalidSignature);
    }

    #[test]
    fn mismatched_jti_is_invalid_structure() {
        let signer = issuer_signer();
        let mut claims = dummy_claims(None);
        claims.jti = "urn:uuid:different".to_owned();

        let compact = claims.sign(&signer).unwrap();

        let err =
            VcJwtClaims::verify(&compact, None, None, None, 1500, 0, get_verifier).unwrap_err();
        assert_eq!(err.error, VcJwtError::InvalidStructure("jti".to_owned()));
    }

    #[test]
    fn wrong_subject_is_invalid_structure() {
        let signer = issuer_signer();
        let compact = dummy_claims(None).sign(&signer).unwrap();

        let err = VcJwtClaims::verify(
            &compact,
            None,
            None,
            Some("did:key:someone-else"),
            1500,
            0,
            get_verifier,
        )
        .unwrap_err();
        assert_eq!(err.error, VcJwtError::InvalidStructure("sub".to_owned()));
    }

    #[test]
    fn leeway_boundaries() {
        let signer = issuer_signer();
        let leeway = 60;
        let compact = dummy_claims(Some(2000)).sign(&signer).unwrap();

        // `exp` exactly `now - leeway`, i.e. now == exp + leeway: accepted
        VcJwtClaims::verify(&compact, None, None, None, 2000 + leeway, leeway, get_verifier)
            .unwrap();

        // one second later: expired
        let err = VcJwtClaims::verify(
            &compact,
            None,
            None,
            None,
            2000 + leeway + 1,
            leeway,
            get_verifier,
        )
        .unwrap_err();
        assert_matches!(err.error, VcJwtError::Expired(_, 2000));

        // `nbf` within leeway: accepted
        VcJwtClaims::verify(&compact, None, None, None, 1000 - leeway, leeway, get_verifier)
            .unwrap();

        // `nbf` too far in the future: rejected
        let err = VcJwtClaims::verify(
            &compact,
            None,
            None,
            None,
            1000 - leeway - 1,
            leeway,
            get_verifier,
        )
        .unwrap_err();
        assert_matches!(err.error, VcJwtError::NotYetValid(_, 1000));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = issuer_signer();
        let compact = dummy_claims(None).sign(&signer).unwrap();

        // swap the payload for a different (validly encoded) one
        let parts: Vec<&str> = compact.split('.').collect();
        let mut claims = dummy_claims(None);
        claims.vc.credential_subject.insert("given-name".to_owned(), "Eve".into());
        let forged_payload =
            bh_jose::base64_url_encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let err =
            VcJwtClaims::verify(&forged, None, None, None, 1500, 0, get_verifier).unwrap_err();
        assert_eq!(err.error, VcJwtError::InvalidSignature);
    }
}
