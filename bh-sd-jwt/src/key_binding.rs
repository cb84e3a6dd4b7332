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

//! The Key Binding JWT (`KB-JWT`) tying an SD-JWT presentation to the holder's key.

use bh_jose::{jwt, JwkPublic, JwtSigner, JwtVerifier as _, SignatureVerifier, SigningAlgorithm};
use bherror::{
    traits::{ForeignBoxed, ForeignError},
    Error,
};
use serde::{Deserialize, Serialize};

use crate::{
    holder::{HolderError, Result as HolderResult},
    sd_jwt::{SdJwt, SdJwtKB},
    utils, Hasher, SecondsSinceEpoch,
};

/// Error type related to Key Binding JWT operations.
#[derive(strum_macros::Display, PartialEq, Debug, Clone)]
pub enum KBError {
    /// The Key Binding JWT syntax is invalid.
    #[strum(to_string = "Invalid KBJwt syntax: {0}")]
    InvalidKBJwtSyntax(String),

    /// The Key Binding JWT signature is invalid.
    #[strum(to_string = "Invalid KBJwt signature")]
    InvalidKBJwtSignature,

    /// The Key Binding JWT `typ` header is not the expected value.
    #[strum(to_string = "Invalid KBJwt type {0}")]
    InvalidKBJwtType(String),

    /// The Key Binding JWT was issued too far in the past.
    #[strum(to_string = "KBJwt expired: iat is {0}, expiration offset {1} and current time {2}")]
    KBJwtExpired(u64, u64, u64),

    /// The Key Binding JWT nonce does not match the challenge.
    #[strum(to_string = "Invalid KBJwt nonce. Provided nonce was {0}")]
    InvalidKBJwtNonce(String),

    /// The Key Binding JWT `aud` does not match the challenge.
    #[strum(to_string = "Invalid KBJwt aud. Provided aud was `{0}`; expected `{1}`")]
    InvalidKBJwtAud(String, String),

    /// The Key Binding JWT `sd_hash` does not match the presentation.
    #[strum(to_string = "Invalid KBJwt hash. Claims hash was {0}, provided was {1}")]
    InvalidKBJwtSdHash(String, String),

    /// No signature verifier implementation for the signing algorithm.
    #[strum(to_string = "Missing signature verifier: {0}")]
    MissingSignatureVerifier(SigningAlgorithm),
}

impl bherror::BhError for KBError {}

/// The required value of the Key Binding JWT header `typ` element, as specified [here][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-07#section-5.3-3.1.2.1
pub(crate) const KB_JWT_HEADER_TYP: &str = "kb+jwt";

/// The maximum accepted age of a Key Binding JWT, in seconds.
///
/// The current default is set to 5 minutes.
pub(crate) const KB_JWT_EXPIRATION_OFFSET: SecondsSinceEpoch = 5 * 60;

/// Header of the Key Binding JWT.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct KBJwtHeader {
    /// Always [`KB_JWT_HEADER_TYP`].
    pub(crate) typ: String,
    /// Signature algorithm of the holder's key.
    pub(crate) alg: SigningAlgorithm,
}

impl jwt::JoseHeader for KBJwtHeader {
    fn algorithm_type(&self) -> jwt::AlgorithmType {
        self.alg.into()
    }
}

/// Claims of the Key Binding JWT, as specified [here][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-07#section-5.3-3.2.1
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct KBJwtClaims {
    /// The time at which the Key Binding JWT was issued.
    pub(crate) iat: SecondsSinceEpoch,
    /// The intended receiver, i.e. the verifier identifier.
    pub(crate) aud: String,
    /// Freshness challenge from the verifier.
    pub(crate) nonce: String,
    /// The `base64url`-encoded hash digest over the issuer-signed JWT and the presented
    /// disclosures.
    pub(crate) sd_hash: String,
}

/// The challenge the verifier sends to the holder, ensuring the freshness of the key binding
/// signature as well as the proper audience.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindingChallenge {
    /// The verifier identifier the presentation is intended for.
    pub aud: String,
    /// A single-use value ensuring freshness.
    pub nonce: String,
}

impl SdJwt {
    /// Constructs, signs and adds the Key Binding JWT to this `SD-JWT`, resulting in an
    /// `SD-JWT+KB`.
    ///
    /// The `sd_hash` claim is computed over exactly this presentation prefix, so the provided
    /// `hasher` **MUST** use the same algorithm that was used to conceal the claims.
    pub(crate) fn add_key_binding_jwt(
        self,
        hasher: &impl Hasher,
        challenge: KeyBindingChallenge,
        current_time: SecondsSinceEpoch,
        signer: &impl JwtSigner,
    ) -> HolderResult<SdJwtKB> {
        let claims = KBJwtClaims {
            iat: current_time,
            aud: challenge.aud,
            nonce: challenge.nonce,
            sd_hash: sd_hash(&self, hasher),
        };
        let header = KBJwtHeader {
            typ: KB_JWT_HEADER_TYP.to_owned(),
            alg: signer.algorithm(),
        };

        let token_unsigned = jwt::Token::new(header, claims);
        let token_signed: jwt::Token<_, _, jwt::token::Signed> = signer
            .sign_jwt(token_unsigned)
            .foreign_boxed_err(|| HolderError::KBJwtSigningFailed)?;

        Ok(SdJwtKB {
            sd_jwt: self,
            key_binding_jwt: token_signed.as_str().to_owned(),
        })
    }
}

impl SdJwtKB {
    /// Verifies the Key Binding JWT of this presentation against the holder public key taken
    /// from the issuer-signed `cnf` claim and the verifier's [`KeyBindingChallenge`].
    ///
    /// The provided `hasher` **MUST** use the same algorithm that was used to conceal the
    /// claims of the `SD-JWT`.
    pub(crate) fn verify_key_binding_jwt<'a>(
        &self,
        hasher: &impl Hasher,
        holder_public_key: &JwkPublic,
        challenge: &KeyBindingChallenge,
        current_time: SecondsSinceEpoch,
        get_signature_verifier: impl FnOnce(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> crate::Result<(), KBError> {
        let kb_jwt = &self.key_binding_jwt;

        // !!! Direct access to a not-yet-integrity-verified field, solely to look up the
        // verifier implementation.  Sound because every representable algorithm is an approved
        // asymmetric one (no `alg: none`); at worst a tampered `alg` fails verification below.
        let token_unverified: jwt::Token<KBJwtHeader, KBJwtClaims, _> =
            jwt::Token::parse_unverified(kb_jwt)
                .foreign_err(|| KBError::InvalidKBJwtSyntax(kb_jwt.to_string()))?;

        let signing_algorithm = token_unverified.header().alg;
        let verifier = get_signature_verifier(signing_algorithm)
            .ok_or_else(|| Error::root(KBError::MissingSignatureVerifier(signing_algorithm)))?;

        let token_verified: jwt::Token<KBJwtHeader, KBJwtClaims, jwt::token::Verified> = verifier
            .verify_jwt_signature(token_unverified, holder_public_key)
            .foreign_boxed_err(|| KBError::InvalidKBJwtSignature)?;

        let header = token_verified.header();
        if header.typ != KB_JWT_HEADER_TYP {
            return Err(Error::root(KBError::InvalidKBJwtType(header.typ.clone())));
        }

        let claims = token_verified.claims();

        // `iat` must be within the acceptance window
        if claims.iat + KB_JWT_EXPIRATION_OFFSET < current_time {
            return Err(Error::root(KBError::KBJwtExpired(
                claims.iat,
                KB_JWT_EXPIRATION_OFFSET,
                current_time,
            )));
        }

        if claims.nonce != challenge.nonce {
            return Err(Error::root(KBError::InvalidKBJwtNonce(
                claims.nonce.clone(),
            )));
        }

        if claims.aud != challenge.aud {
            return Err(Error::root(KBError::InvalidKBJwtAud(
                claims.aud.clone(),
                challenge.aud.clone(),
            )));
        }

        let expected_sd_hash = sd_hash(&self.sd_jwt, hasher);
        if claims.sd_hash != expected_sd_hash {
            return Err(Error::root(KBError::InvalidKBJwtSdHash(
                expected_sd_hash,
                claims.sd_hash.clone(),
            )));
        }

        Ok(())
    }
}

/// Computes the `sd_hash` value: the `base64url`-encoded digest over the issuer-signed JWT
/// followed by a `~` and each presented disclosure followed by a `~`, in presentation order.
fn sd_hash(sd_jwt: &SdJwt, hasher: &impl Hasher) -> String {
    utils::base64_url_digest(sd_jwt.to_string().as_bytes(), hasher)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::{Es256Signer, Es256Verifier};

    use super::*;
    use crate::Sha256;

    fn challenge() -> KeyBindingChallenge {
        KeyBindingChallenge {
            aud: "https://verifier.example/rp1".to_owned(),
            nonce: "n2".to_owned(),
        }
    }

    fn dummy_sd_jwt() -> SdJwt {
        SdJwt::new(
            "eyJhbGciOiJFUzI1NiJ9.e30.c2ln".to_owned(),
            vec!["WyJzYWx0IiwgIm5hbWUiLCAidmFsdWUiXQ".to_owned()],
        )
    }

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    #[test]
    fn key_binding_roundtrip() {
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let holder_jwk = holder.public_jwk().unwrap();

        let sd_jwt_kb = dummy_sd_jwt()
            .add_key_binding_jwt(&Sha256, challenge(), 1000, &holder)
            .unwrap();

        sd_jwt_kb
            .verify_key_binding_jwt(&Sha256, &holder_jwk, &challenge(), 1000, get_verifier)
            .unwrap();
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let holder_jwk = holder.public_jwk().unwrap();

        let sd_jwt_kb = dummy_sd_jwt()
            .add_key_binding_jwt(&Sha256, challenge(), 1000, &holder)
            .unwrap();

        let mut wrong = challenge();
        wrong.nonce = wrong.nonce.chars().rev().collect();

        let err = sd_jwt_kb
            .verify_key_binding_jwt(&Sha256, &holder_jwk, &wrong, 1000, get_verifier)
            .unwrap_err();
        assert_matches!(err.error, KBError::InvalidKBJwtNonce(_));
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let holder_jwk = holder.public_jwk().unwrap();

        let sd_jwt_kb = dummy_sd_jwt()
            .add_key_binding_jwt(&Sha256, challenge(), 1000, &holder)
            .unwrap();

        let mut wrong = challenge();
        wrong.aud = "https://attacker.example".to_owned();

        let err = sd_jwt_kb
            .verify_key_binding_jwt(&Sha256, &holder_jwk, &wrong, 1000, get_verifier)
            .unwrap_err();
        assert_matches!(err.error, KBError::InvalidKBJwtAud(_, _));
    }

    #[test]
    fn expired_kb_jwt_is_rejected() {
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let holder_jwk = holder.public_jwk().unwrap();

        let sd_jwt_kb = dummy_sd_jwt()
            .add_key_binding_jwt(&Sha256, challenge(), 1000, &holder)
            .unwrap();

        // exactly at the boundary is still accepted
        sd_jwt_kb
            .verify_key_binding_jwt(
                &Sha256,
                &holder_jwk,
                &challenge(),
                1000 + KB_JWT_EXPIRATION_OFFSET,
                get_verifier,
            )
            .unwrap();

        // one second past the boundary is not
        let err = sd_jwt_kb
            .verify_key_binding_jwt(
                &Sha256,
                &holder_jwk,
                &challenge(),
                1000 + KB_JWT_EXPIRATION_OFFSET + 1,
                get_verifier,
            )
            .unwrap_err();
        assert_matches!(err.error, KBError::KBJwtExpired(_, _, _));
    }

    #[test]
    fn sd_hash_is_order_sensitive() {
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let holder_jwk = holder.public_jwk().unwrap();

        let sd_jwt_kb = dummy_sd_jwt()
            .add_key_binding_jwt(&Sha256, challenge(), 1000, &holder)
            .unwrap();

        // dropping the disclosure from the presentation changes the sd_hash
        let mut tampered = sd_jwt_kb.clone();
        tampered.sd_jwt.disclosures.clear();

        let err = tampered
            .verify_key_binding_jwt(&Sha256, &holder_jwk, &challenge(), 1000, get_verifier)
            .unwrap_err();
        assert_matches!(err.error, KBError::InvalidKBJwtSdHash(_, _));
    }

    #[test]
    fn foreign_key_is_rejected() {
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let other = Es256Signer::generate("other".to_owned()).unwrap();

        let sd_jwt_kb = dummy_sd_jwt()
            .add_key_binding_jwt(&Sha256, challenge(), 1000, &holder)
            .unwrap();

        let err = sd_jwt_kb
            .verify_key_binding_jwt(
                &Sha256,
                &other.public_jwk().unwrap(),
                &challenge(),
                1000,
                get_verifier,
            )
            .unwrap_err();
        assert_matches!(err.error, KBError::InvalidKBJwtSignature);
    }

    #[test]
    fn missing_verifier_is_reported() {
        let holder = Es256Signer::generate("holder".to_owned()).unwrap();
        let holder_jwk = holder.public_jwk().unwrap();

        let sd_jwt_kb = dummy_sd_jwt()
            .add_key_binding_jwt(&Sha256, challenge(), 1000, &holder)
            .unwrap();

        let err = sd_jwt_kb
            .verify_key_binding_jwt(&Sha256, &holder_jwk, &challenge(), 1000, |_| None)
            .unwrap_err();
        assert_matches!(
            err.error,
            KBError::MissingSignatureVerifier(SigningAlgorithm::Es256)
        );
    }
}
