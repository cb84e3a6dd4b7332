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

//! This module provides the [`Verifier`] type for verifying SD-JWT+KB presentations.

use bh_jose::{
    base64_url_encode, jwt, JwkPublic, JwtVerifier as _, SignatureVerifier, SigningAlgorithm,
};
use bherror::traits::{ForeignBoxed as _, ForeignError as _, PropagateError as _};
use rand_core::CryptoRngCore;

use crate::{
    decoder::decode_disclosed_claims,
    error::{FormatError, SignatureError},
    key_binding::{KBError, KeyBindingChallenge},
    lookup::IssuerPublicKeyLookup,
    sd_jwt::{SdJwt, SdJwtKB},
    DecodingError, Disclosure, Hasher, HashingAlgorithm, IssuerJwt, IssuerJwtHeader, JsonObject,
    SecondsSinceEpoch,
};

/// Verifier of SD-JWT+KB verifiable presentations.
///
/// This verifier requires Key Binding.  Note that the decision whether to require Key Binding
/// for a particular use case **MUST NOT** be based on whether a Key Binding JWT is provided by
/// the Holder or not, according to the [draft][1].
///
/// # Lifecycle
///
/// A fresh instance must be constructed for every presentation exchange session; it holds the
/// nonce used for ensuring freshness of the presentation, which must be communicated to the
/// holder and later used in verification.  Does **NOT** implement [`Clone`] to prevent nonce
/// reuse.
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-13#section-7.3-4.1
pub struct Verifier {
    challenge: KeyBindingChallenge,
}

/// Error type for errors related to the SD-JWT verifier.
#[derive(strum_macros::Display, Debug, PartialEq)]
pub enum VerifierError {
    /// Error indicating that the nonce generation failed.
    #[strum(to_string = "Nonce generation failed")]
    NonceGenerationFailed,

    /// Error with the Key Binding JWT.
    #[strum(to_string = "{0}")]
    KeyBinding(KBError),

    /// Error indicating that the provided SD-JWT format is invalid.
    #[strum(to_string = "Format error: {0}")]
    Format(FormatError),

    /// Error indicating that the signature verification failed.
    #[strum(to_string = "Signature error: {0}")]
    Signature(SignatureError),

    /// Error indicating that the decoding of the SD-JWT failed.
    #[strum(to_string = "Decoding error: {0}")]
    Decoding(DecodingError),

    /// The JWT's `nbf` (not before) claim is set to a future time.
    #[strum(to_string = "Jwt not yet valid: current time is {0}, nbf is {1}")]
    JwtNotYetValid(u64, u64),

    /// The JWT's `exp` (expiration) claim is set to a time in the past.
    #[strum(to_string = "Jwt expired, current time is {0}, expiration is {1}")]
    JwtExpired(u64, u64),
}

impl bherror::BhError for VerifierError {}

/// Result type used by the [`verifier`][crate::verifier] module.
pub type Result<T> = bherror::Result<T, VerifierError>;

/// The outcome of a successful presentation verification.
#[derive(Debug)]
#[non_exhaustive]
pub struct VerifiedPresentation {
    /// The issuer JWT claims, with the custom claims replaced by the reconstructed cleartext of
    /// the *disclosed* subset.
    pub claims: IssuerJwt,

    /// The disclosures that were presented, in presentation order.
    pub disclosures: Vec<Disclosure>,

    /// The algorithm the issuer JWT was signed with.
    pub signing_algorithm: SigningAlgorithm,

    /// The resolved public key of the issuer.
    pub issuer_public_key: JwkPublic,
}

impl Verifier {
    /// Construct a verifier for a new presentation exchange session.
    ///
    /// The challenge parameters include the `aud` parameter identifying the verifier entity for
    /// the purpose of proving key binding, and the freshness nonce sampled from `nonce_rng`.
    pub fn new<R: CryptoRngCore + ?Sized>(aud: String, nonce_rng: &mut R) -> Result<Self> {
        let nonce = generate_nonce(nonce_rng)?;

        Ok(Self::from_challenge(KeyBindingChallenge { aud, nonce }))
    }

    /// Constructs a [`Verifier`] for an existing presentation exchange session.
    ///
    /// The caller must ensure that the `nonce` value within the provided
    /// [`KeyBindingChallenge`] will not be reused.
    pub fn from_challenge(challenge: KeyBindingChallenge) -> Self {
        Self { challenge }
    }

    /// Return the challenge to be sent to the holder.
    pub fn key_binding_challenge(&self) -> &KeyBindingChallenge {
        &self.challenge
    }

    /// Verify the provided SD-JWT+KB presentation.
    ///
    /// The verification covers, in order: the issuer JWT signature (with the key resolved via
    /// `issuer_public_key_lookup`), the integrity of every presented disclosure, the Key
    /// Binding JWT against the `cnf` key and the session challenge, and the time-validity
    /// claims.
    ///
    /// This method takes ownership of the [`Verifier`] to destroy the session nonce, in order
    /// to prevent accidental reuse.
    pub async fn verify<'a>(
        self,
        sd_jwt_kb: SdJwtKB,
        issuer_public_key_lookup: &impl IssuerPublicKeyLookup,
        current_time: SecondsSinceEpoch,
        get_hasher: impl Fn(HashingAlgorithm) -> Option<Box<dyn Hasher>>,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<VerifiedPresentation> {
        let (_, mut claims, signing_algorithm, issuer_public_key) =
            verify_issuer_jwt(&sd_jwt_kb.sd_jwt, issuer_public_key_lookup, &get_signature_verifier)
                .await
                .match_err(|crate_error| crate_error.to_verifier_error())?;

        let (hasher, disclosures, decoded) =
            decode_presented_claims(&sd_jwt_kb.sd_jwt, &claims, get_hasher)
                .match_err(|crate_error| crate_error.to_verifier_error())?;

        sd_jwt_kb
            .verify_key_binding_jwt(
                &hasher,
                &claims.cnf.jwk,
                &self.challenge,
                current_time,
                get_signature_verifier,
            )
            .match_err(|kb_error| VerifierError::KeyBinding(kb_error.clone()))?;

        claims.validate_claims_verifier(current_time)?;

        claims.claims = decoded;
        claims.sd_alg = None;

        Ok(VerifiedPresentation {
            claims,
            disclosures,
            signing_algorithm,
            issuer_public_key,
        })
    }
}

/// Parse & signature-verify the issuer JWT of an `SD-JWT`, resolving the issuer key via the
/// provided lookup.
pub(crate) async fn verify_issuer_jwt<'a>(
    sd_jwt: &SdJwt,
    lookup: &impl IssuerPublicKeyLookup,
    get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
) -> crate::Result<(IssuerJwtHeader, IssuerJwt, SigningAlgorithm, JwkPublic), crate::Error> {
    // !!! Direct access to not-yet-integrity-verified fields, needed to resolve the issuer key
    // and the verifier implementation.  Sound for the same reason as in the KB-JWT validation:
    // every representable `alg` is an approved asymmetric algorithm.
    let token_unverified: jwt::Token<IssuerJwtHeader, IssuerJwt, _> =
        jwt::Token::parse_unverified(&sd_jwt.jwt)
            .foreign_err(|| crate::Error::Format(FormatError::NonParseableJwt))?;

    let signing_algorithm = token_unverified.header().alg;

    let issuer_public_key = lookup
        .lookup(&token_unverified.claims().iss, token_unverified.header())
        .await
        .match_err(|lookup_error| crate::Error::Signature(lookup_error.clone()))?;

    let verifier = get_signature_verifier(signing_algorithm).ok_or_else(|| {
        bherror::Error::root(crate::Error::Signature(
            SignatureError::MissingSignatureVerifier(signing_algorithm),
        ))
    })?;

    let token_verified: jwt::Token<IssuerJwtHeader, IssuerJwt, jwt::token::Verified> = verifier
        .verify_jwt_signature(token_unverified, &issuer_public_key)
        .foreign_boxed_err(|| crate::Error::Signature(SignatureError::InvalidJwtSignature))?;

    let (header, claims) = token_verified.into();

    Ok((header, claims, signing_algorithm, issuer_public_key))
}

/// Parse the presented disclosures, resolve the hasher from `_sd_alg`, and reconstruct the
/// disclosed cleartext.
pub(crate) fn decode_presented_claims(
    sd_jwt: &SdJwt,
    claims: &IssuerJwt,
    get_hasher: impl Fn(HashingAlgorithm) -> Option<Box<dyn Hasher>>,
) -> crate::Result<(Box<dyn Hasher>, Vec<Disclosure>, JsonObject), crate::Error> {
    // https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-07#section-5.1.1-3
    let sd_alg = claims.sd_alg.unwrap_or(HashingAlgorithm::Sha256);

    let hasher = get_hasher(sd_alg).ok_or_else(|| {
        bherror::Error::root(crate::Error::Decoding(
            DecodingError::UnsupportedHashingAlgorithm(sd_alg.to_string()),
        ))
    })?;

    let disclosures = sd_jwt
        .disclosures
        .iter()
        .map(|serialized| Disclosure::try_from(serialized.clone()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .match_err(|format_error| crate::Error::Format(format_error.clone()))?;

    let decoded = decode_disclosed_claims(&claims.claims, &disclosures, &hasher)
        .match_err(|decoding_error| crate::Error::Decoding(decoding_error.clone()))?;

    Ok((hasher, disclosures, decoded))
}

/// Generates a `nonce` value: a random, `base64url`-encoded string with 256 bits of entropy.
pub fn generate_nonce<R: CryptoRngCore + ?Sized>(nonce_rng: &mut R) -> Result<String> {
    let mut nonce_bytes = [0u8; 32];
    nonce_rng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|err| bherror::Error::root(VerifierError::NonceGenerationFailed).ctx(err))?;
    Ok(base64_url_encode(nonce_bytes))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::{Es256Signer, Es256Verifier, Signer as _};
    use rand::thread_rng;

    use super::*;
    use crate::{
        default_hasher,
        holder::Holder,
        issuer::tests::{dummy_claims, dummy_signer, test_issuer_jwt, TEST_DISCLOSURE_PATHS},
        lookup::X5ChainLookup,
        Issuer, Sha256,
    };

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    struct Setup {
        holder: Holder,
        holder_key: Es256Signer,
    }

    async fn setup() -> Setup {
        let holder_key = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let issued = Issuer::new(Sha256)
            .issue(
                test_issuer_jwt(holder_key.public_jwk().unwrap()),
                TEST_DISCLOSURE_PATHS,
                &dummy_signer(),
                &mut thread_rng(),
            )
            .unwrap();

        let holder = Holder::import(
            &issued.into_string_compact(),
            &X5ChainLookup::unauthenticated(),
            1000,
            default_hasher,
            get_verifier,
        )
        .await
        .unwrap();

        Setup { holder, holder_key }
    }

    #[tokio::test]
    async fn selective_presentation_verifies() {
        let Setup { holder, holder_key } = setup().await;

        let verifier =
            Verifier::new("https://verifier.example/rp1".to_owned(), &mut thread_rng()).unwrap();

        let presentation = holder
            .present(
                &["age_over_18"],
                verifier.key_binding_challenge().clone(),
                1000,
                &holder_key,
                default_hasher,
            )
            .unwrap();

        let verified = verifier
            .verify(
                presentation,
                &X5ChainLookup::unauthenticated(),
                1000,
                default_hasher,
                get_verifier,
            )
            .await
            .unwrap();

        // only the selected claim is reconstructed
        assert_eq!(verified.claims.claims.get("age_over_18"), Some(&true.into()));
        assert!(!verified.claims.claims.contains_key("given_name"));
        assert!(!verified.claims.claims.contains_key("family_name"));
        assert_eq!(verified.disclosures.len(), 1);
        assert_eq!(verified.signing_algorithm, SigningAlgorithm::Es256);
    }

    #[tokio::test]
    async fn full_presentation_reconstructs_cleartext() {
        let Setup { holder, holder_key } = setup().await;

        let verifier =
            Verifier::new("https://verifier.example/rp1".to_owned(), &mut thread_rng()).unwrap();

        let presentation = holder
            .present(
                &["given_name", "family_name", "age_over_18"],
                verifier.key_binding_challenge().clone(),
                1000,
                &holder_key,
                default_hasher,
            )
            .unwrap();

        let verified = verifier
            .verify(
                presentation,
                &X5ChainLookup::unauthenticated(),
                1000,
                default_hasher,
                get_verifier,
            )
            .await
            .unwrap();

        // `nationalities[0]` was not selected; everything else matches the cleartext
        let mut expected = dummy_claims();
        expected["nationalities"] = serde_json::json!(["FR"]);
        assert_eq!(verified.claims.claims, expected);
    }

    #[tokio::test]
    async fn wrong_nonce_fails_key_binding() {
        let Setup { holder, holder_key } = setup().await;

        let verifier =
            Verifier::new("https://verifier.example/rp1".to_owned(), &mut thread_rng()).unwrap();

        let mut tampered_challenge = verifier.key_binding_challenge().clone();
        tampered_challenge.nonce = tampered_challenge.nonce.chars().rev().collect();

        let presentation = holder
            .present(
                &["age_over_18"],
                tampered_challenge,
                1000,
                &holder_key,
                default_hasher,
            )
            .unwrap();

        let err = verifier
            .verify(
                presentation,
                &X5ChainLookup::unauthenticated(),
                1000,
                default_hasher,
                get_verifier,
            )
            .await
            .unwrap_err();

        assert_matches!(err.error, VerifierError::KeyBinding(KBError::InvalidKBJwtNonce(_)));
    }

    #[tokio::test]
    async fn expired_credential_is_rejected() {
        let holder_key = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let mut jwt = test_issuer_jwt(holder_key.public_jwk().unwrap());
        jwt.exp = Some(2000);

        let issued = Issuer::new(Sha256)
            .issue(jwt, &[], &dummy_signer(), &mut thread_rng())
            .unwrap();

        let holder = Holder::import(
            &issued.into_string_compact(),
            &X5ChainLookup::unauthenticated(),
            1000,
            default_hasher,
            get_verifier,
        )
        .await
        .unwrap();

        let verifier =
            Verifier::new("https://verifier.example/rp1".to_owned(), &mut thread_rng()).unwrap();

        let presentation = holder
            .present(
                &[],
                verifier.key_binding_challenge().clone(),
                2000,
                &holder_key,
                default_hasher,
            )
            .unwrap();

        let err = verifier
            .verify(
                presentation,
                &X5ChainLookup::unauthenticated(),
                2000,
                default_hasher,
                get_verifier,
            )
            .await
            .unwrap_err();

        assert_matches!(err.error, VerifierError::JwtExpired(2000, 2000));
    }
}
