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

//! Provides the [`Holder`] type for importing and presenting SD-JWT credentials.

use std::collections::HashSet;

use bh_jose::{JwtSigner, SignatureVerifier, SigningAlgorithm};
use bherror::{traits::PropagateError as _, Error};

use crate::{
    error::{FormatError, SignatureError},
    key_binding::KeyBindingChallenge,
    lookup::IssuerPublicKeyLookup,
    sd_jwt::{SdJwt, SdJwtKB},
    utils,
    verifier::{decode_presented_claims, verify_issuer_jwt},
    DecodingError, Disclosure, Hasher, HashingAlgorithm, IssuerJwt, JsonObject, SecondsSinceEpoch,
};

/// Error type related to the Holder operations.
#[derive(strum_macros::Display, Debug, PartialEq)]
pub enum HolderError {
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

    /// Error indicating that the signing of the Key Binding JWT failed.
    #[strum(to_string = "Key Binding JWT signing failed")]
    KBJwtSigningFailed,

    /// No held disclosure conceals a claim of the requested name.
    #[strum(to_string = "No disclosure for claim {0}")]
    UnknownClaim(String),

    /// The hashing algorithm of the credential is not supported by the caller.
    #[strum(to_string = "Unsupported hashing algorithm {0}")]
    UnsupportedHashingAlgorithm(String),
}

impl bherror::BhError for HolderError {}

/// Result type used by the [`holder`][crate::holder] module.
pub type Result<T> = bherror::Result<T, HolderError>;

/// Holder of an SD-JWT credential.
///
/// A [`Holder`] is constructed by [importing][Holder::import] the SD-JWT issued to it, which
/// verifies the issuer signature and reconstructs the cleartext.  Presentations with any subset
/// of the held disclosures are then built with [`Holder::present`].
#[derive(Debug)]
pub struct Holder {
    jwt: String,
    payload: IssuerJwt,
    disclosures: Vec<Disclosure>,
    cleartext: JsonObject,
    sd_alg: HashingAlgorithm,
}

impl Holder {
    /// Import a credential from its compact SD-JWT serialization (`<JWT>~<D1>~…~`).
    ///
    /// The issuer signature is verified with the key resolved via `issuer_public_key_lookup`,
    /// all disclosures are checked for consistency against the JWT, and the credential must not
    /// be expired.  Unlike the verifier, the holder accepts not-yet-valid credentials.
    pub async fn import<'a>(
        compact: &str,
        issuer_public_key_lookup: &impl IssuerPublicKeyLookup,
        current_time: SecondsSinceEpoch,
        get_hasher: impl Fn(HashingAlgorithm) -> Option<Box<dyn Hasher>>,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<Self> {
        let sd_jwt: SdJwt = compact
            .parse::<SdJwt>()
            .match_err(|format_error| HolderError::Format(format_error.clone()))?;

        let (_, claims, _, _) =
            verify_issuer_jwt(&sd_jwt, issuer_public_key_lookup, get_signature_verifier)
                .await
                .match_err(|crate_error| crate_error.to_holder_error())?;

        let (_, disclosures, cleartext) = decode_presented_claims(&sd_jwt, &claims, get_hasher)
            .match_err(|crate_error| crate_error.to_holder_error())?;

        claims
            .validate_claims_holder(current_time)
            .match_err(|crate_error| crate_error.to_holder_error())?;

        let sd_alg = claims.sd_alg.unwrap_or(HashingAlgorithm::Sha256);

        Ok(Self {
            jwt: sd_jwt.jwt,
            payload: claims,
            disclosures,
            cleartext,
            sd_alg,
        })
    }

    /// The full reconstructed cleartext of the held credential.
    pub fn claims(&self) -> &JsonObject {
        &self.cleartext
    }

    /// The issuer JWT payload of the held credential (custom claims still concealed).
    pub fn payload(&self) -> &IssuerJwt {
        &self.payload
    }

    /// Build an `SD-JWT+KB` presentation disclosing exactly the claims named in `claim_names`.
    ///
    /// Disclosures whose concealed claims are nested inside other concealed claims pull in
    /// their covering (parent) disclosures automatically.  Array-element disclosures cannot be
    /// selected by name; present their enclosing claim instead.
    ///
    /// An empty selection produces a valid presentation with all claims withheld.
    pub fn present(
        &self,
        claim_names: &[&str],
        challenge: KeyBindingChallenge,
        current_time: SecondsSinceEpoch,
        signer: &impl JwtSigner,
        get_hasher: impl Fn(HashingAlgorithm) -> Option<Box<dyn Hasher>>,
    ) -> Result<SdJwtKB> {
        let hasher = get_hasher(self.sd_alg).ok_or_else(|| {
            Error::root(HolderError::UnsupportedHashingAlgorithm(
                self.sd_alg.to_string(),
            ))
        })?;

        let selected = self.covering_disclosure_set(claim_names, &hasher)?;

        // keep the original disclosure order in the presentation
        let disclosures = self
            .disclosures
            .iter()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, d)| d.as_str().to_owned())
            .collect();

        SdJwt::new(self.jwt.clone(), disclosures).add_key_binding_jwt(
            &hasher,
            challenge,
            current_time,
            signer,
        )
    }

    /// Compute the indices of the disclosures needed to reveal the named claims: the selected
    /// disclosures themselves plus, transitively, every disclosure concealing an ancestor node.
    ///
    /// A disclosure is reachable from the JWT either directly (its digest appears in the JWT
    /// payload) or through the value of another disclosure; in the latter case that parent must
    /// be presented too.
    fn covering_disclosure_set(
        &self,
        claim_names: &[&str],
        hasher: &impl Hasher,
    ) -> Result<HashSet<usize>> {
        let digests: Vec<String> = self
            .disclosures
            .iter()
            .map(|d| utils::base64_url_digest(d.as_str().as_bytes(), hasher))
            .collect();

        // where each digest is referenced from: the JWT payload or a parent disclosure
        let payload_text = serde_json::to_string(&self.payload.claims)
            .expect("Implementation error: cannot serialize as JSON");

        let mut selected = HashSet::new();
        for name in claim_names {
            let index = self
                .disclosures
                .iter()
                .position(|d| d.claim_name() == Some(name))
                .ok_or_else(|| Error::root(HolderError::UnknownClaim((*name).to_string())))?;
            selected.insert(index);
        }

        // close the set over covering disclosures
        let mut frontier: Vec<usize> = selected.iter().copied().collect();
        while let Some(index) = frontier.pop() {
            if payload_text.contains(&digests[index]) {
                continue;
            }

            let parent = self
                .disclosures
                .iter()
                .position(|d| d.value().to_string().contains(&digests[index]))
                .ok_or_else(|| {
                    Error::root(HolderError::Decoding(DecodingError::UnreferencedDisclosure(
                        self.disclosures[index].as_str().to_owned(),
                    )))
                })?;

            if selected.insert(parent) {
                frontier.push(parent);
            }
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::{json_object, Es256Signer, Es256Verifier, Signer as _};
    use rand::thread_rng;

    use super::*;
    use crate::{
        default_hasher,
        issuer::tests::{dummy_https_iss, dummy_signer},
        lookup::X5ChainLookup,
        Issuer, JsonNodePathSegment::*, Sha256,
    };

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    fn challenge() -> KeyBindingChallenge {
        KeyBindingChallenge {
            aud: "https://verifier.example/rp1".to_owned(),
            nonce: "n1".to_owned(),
        }
    }

    async fn import_nested() -> (Holder, Es256Signer) {
        let holder_key = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let jwt = IssuerJwt::new(
            "TestCredential".into(),
            dummy_https_iss(),
            holder_key.public_jwk().unwrap(),
            json_object!({
                "address": {
                    "street": "Heidestraße 17",
                    "locality": "Köln",
                },
                "age_over_18": true,
            }),
        )
        .unwrap();

        let issued = Issuer::new(Sha256)
            .issue(
                jwt,
                &[
                    &[Key("address")],
                    &[Key("address"), Key("street")],
                    &[Key("age_over_18")],
                ],
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

        (holder, holder_key)
    }

    #[tokio::test]
    async fn import_reconstructs_cleartext() {
        let (holder, _) = import_nested().await;

        assert_eq!(holder.claims()["age_over_18"], true);
        assert_eq!(holder.claims()["address"]["street"], "Heidestraße 17");
    }

    #[tokio::test]
    async fn presenting_nested_claim_pulls_in_parent_disclosure() {
        let (holder, holder_key) = import_nested().await;

        let presentation = holder
            .present(&["street"], challenge(), 1000, &holder_key, default_hasher)
            .unwrap();

        // both the `street` and the covering `address` disclosures travel
        assert_eq!(presentation.sd_jwt.disclosures.len(), 2);
    }

    #[tokio::test]
    async fn empty_selection_is_valid() {
        let (holder, holder_key) = import_nested().await;

        let presentation = holder
            .present(&[], challenge(), 1000, &holder_key, default_hasher)
            .unwrap();

        assert!(presentation.sd_jwt.disclosures.is_empty());
        // the serialization still carries the KB-JWT
        assert!(!presentation.key_binding_jwt.is_empty());
    }

    #[tokio::test]
    async fn unknown_claim_is_reported() {
        let (holder, holder_key) = import_nested().await;

        let err = holder
            .present(
                &["does_not_exist"],
                challenge(),
                1000,
                &holder_key,
                default_hasher,
            )
            .unwrap_err();

        assert_eq!(
            err.error,
            HolderError::UnknownClaim("does_not_exist".to_owned())
        );
    }

    #[tokio::test]
    async fn expired_credential_is_rejected_at_import() {
        let holder_key = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let mut jwt = IssuerJwt::new(
            "TestCredential".into(),
            dummy_https_iss(),
            holder_key.public_jwk().unwrap(),
            json_object!({ "foo": "bar" }),
        )
        .unwrap();
        jwt.exp = Some(500);

        let issued = Issuer::new(Sha256)
            .issue(jwt, &[], &dummy_signer(), &mut thread_rng())
            .unwrap();

        let err = Holder::import(
            &issued.into_string_compact(),
            &X5ChainLookup::unauthenticated(),
            1000,
            default_hasher,
            get_verifier,
        )
        .await
        .unwrap_err();

        assert_matches!(err.error, HolderError::JwtExpired(1000, 500));
    }

    #[tokio::test]
    async fn not_yet_valid_credential_is_accepted_by_holder() {
        let holder_key = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let mut jwt = IssuerJwt::new(
            "TestCredential".into(),
            dummy_https_iss(),
            holder_key.public_jwk().unwrap(),
            json_object!({ "foo": "bar" }),
        )
        .unwrap();
        jwt.nbf = Some(2000);

        let issued = Issuer::new(Sha256)
            .issue(jwt, &[], &dummy_signer(), &mut thread_rng())
            .unwrap();

        // the holder may hold a credential that is not yet valid
        Holder::import(
            &issued.into_string_compact(),
            &X5ChainLookup::unauthenticated(),
            1000,
            default_hasher,
            get_verifier,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn tampered_jwt_is_rejected_at_import() {
        let holder_key = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let jwt = IssuerJwt::new(
            "TestCredential".into(),
            dummy_https_iss(),
            holder_key.public_jwk().unwrap(),
            json_object!({ "foo": "bar" }),
        )
        .unwrap();

        let issued = Issuer::new(Sha256)
            .issue(jwt, &[], &dummy_signer(), &mut thread_rng())
            .unwrap();

        let mut compact = issued.into_string_compact();
        // flip a character inside the signature part
        let flip_at = compact.rfind('.').unwrap() + 3;
        let flipped = if compact.as_bytes()[flip_at] == b'A' { "B" } else { "A" };
        compact.replace_range(flip_at..flip_at + 1, flipped);

        let err = Holder::import(
            &compact,
            &X5ChainLookup::unauthenticated(),
            1000,
            default_hasher,
            get_verifier,
        )
        .await
        .unwrap_err();

        assert_matches!(err.error, HolderError::Signature(_) | HolderError::Format(_));
    }
}
