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

//! Provides the [`Issuer`] type for issuing SD-JWT verifiable credentials.

use std::collections::HashSet;

use bh_jose::{jwt, HasX5Chain, JwkPublic, JwtSigner, SigningAlgorithm};
use bh_status_list::StatusClaim;
use bh_x509::JwtX5Chain;
use bherror::{
    traits::{ErrorContext as _, ForeignBoxed as _, PropagateError as _},
    Error,
};
use iref::UriBuf;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    encoder, error::FormatError, sd_jwt::SdJwt, verifier::VerifierError, CnfClaim, Disclosure,
    Hasher, HashingAlgorithm, JsonNodePath, JsonNodePathSegment, JsonObject, SecondsSinceEpoch,
    RESERVED_CLAIM_NAMES,
};

/// Issuer of JWT Verifiable Credentials (VC) with selectively disclosable claims, i.e. SD-JWT
/// VCs.
pub struct Issuer<H: Hasher> {
    hasher: H,
}

/// Error type related to the Issuer operations.
#[derive(strum_macros::Display, Debug, PartialEq, Eq)]
pub enum IssuerError {
    /// A claim name is reserved or registered and must not be used in the selectively
    /// disclosable claims.
    #[strum(to_string = "Use of reserved or registered claim name {0}")]
    ReservedOrRegisteredClaimName(&'static str),

    /// The provided disclosure path is invalid.
    #[strum(to_string = "Invalid path {0}")]
    InvalidPath(String),

    /// The provided disclosure path does not exist.
    #[strum(to_string = "Non existent path {0}")]
    NonExistentPath(String),

    /// The signing of the JWT failed.
    #[strum(to_string = "Signing failed")]
    SigningFailed,

    /// The provided disclosure paths contain a duplicate.
    #[strum(to_string = "Duplicate path {0}")]
    DuplicatePath(String),
}

impl bherror::BhError for IssuerError {}

/// Result type used by the [`issuer`][crate::issuer] module.
pub type Result<T> = bherror::Result<T, IssuerError>;

/// Value to set for the [`typ`][IssuerJwtHeader::typ] header parameter when issuing an SD-JWT
/// verifiable credential.
///
/// <https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc-01#section-3.2.1-2>
pub const TYP_VC_SD_JWT: &str = "vc+sd-jwt";

/// JWT header of an issued SD-JWT VC.
///
/// Header field values will be used to look up the public key of the Issuer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuerJwtHeader {
    /// Type of the payload; its value *must* be [`TYP_VC_SD_JWT`].
    pub typ: String,

    /// Algorithm used to sign the payload.
    pub alg: SigningAlgorithm,

    /// Optional identifier of the key used for signing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Optional certificate chain corresponding to the key used to sign the JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<JwtX5Chain>,
}

impl jwt::JoseHeader for IssuerJwtHeader {
    fn algorithm_type(&self) -> jwt::AlgorithmType {
        self.alg.into()
    }
}

/// Template for the JWT the issuer signs.  See the [SD-JWT VC draft][1] for the set of mandatory
/// and optional registered claims.
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc-01#name-jwt-claims-set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct IssuerJwt {
    /// Issuer of the verifiable credential.
    pub iss: String,

    /// The time before which the credential MUST NOT be accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<SecondsSinceEpoch>,

    /// The expiry time of the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<SecondsSinceEpoch>,

    /// Holder's public JWK for key binding purposes.
    pub cnf: CnfClaim,

    /// Verifiable credential type.
    pub vct: String,

    /// Pointer to the status of the credential within a status list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusClaim>,

    /// The hash algorithm used to conceal the claims.
    #[serde(rename = "_sd_alg", skip_serializing_if = "Option::is_none")]
    pub(crate) sd_alg: Option<HashingAlgorithm>,

    /// Remaining custom issuer defined claims.
    #[serde(flatten)]
    pub claims: JsonObject,
}

lazy_static::lazy_static! {
    /// Claim names registered for use with SD-JWT VCs, with defined semantics.
    /// These are **NOT** selectively disclosable!
    ///
    /// See the [SD-JWT VC draft](https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc-01#section-3.2.2.2).
    pub(crate) static ref REGISTERED_CLAIM_NAMES: HashSet<&'static str> = {
        ["iss", "nbf", "exp", "cnf", "vct", "status"].into_iter().collect()
    };
}

impl IssuerJwt {
    /// Create a new JWT with the registered claims marked required by the SD-JWT VC draft.
    ///
    /// Note: `claims` must not contain any registered claim name (`iss`, `nbf`, `exp`, `cnf`,
    /// `vct`, `status`), nor a reserved name (`_sd`, `...`, `_sd_alg`) at any nesting level.
    pub fn new(
        vct: String,
        iss: UriBuf,
        holder_binding_public_jwk: JwkPublic,
        claims: JsonObject,
    ) -> Result<Self> {
        for key in claims.keys() {
            if let Some(name) = REGISTERED_CLAIM_NAMES.get(key.as_str()) {
                return Err(Error::root(IssuerError::ReservedOrRegisteredClaimName(
                    name,
                )));
            }
        }
        if let Some(name) = find_reserved_name(&claims) {
            return Err(Error::root(IssuerError::ReservedOrRegisteredClaimName(
                name,
            )));
        }

        Ok(Self {
            iss: iss.to_string(),
            nbf: None,
            exp: None,
            cnf: CnfClaim {
                jwk: holder_binding_public_jwk,
            },
            vct,
            status: None,
            sd_alg: None,
            claims,
        })
    }

    /// Adds the `sub` claim, overwriting any existing value.
    pub fn add_sub_claim(&mut self, sub: String) {
        self.claims.insert("sub".to_owned(), sub.into());
    }

    /// Returns the `sub` claim, if present and a string.
    pub fn sub(&self) -> Option<&str> {
        self.claims.get("sub").and_then(serde_json::Value::as_str)
    }

    /// Adds the `iat` claim, overwriting any existing value.
    pub fn add_iat_claim(&mut self, iat: SecondsSinceEpoch) {
        self.claims.insert("iat".to_owned(), iat.into());
    }

    /// Serializes the Issuer's JWT into a `JSON` object.
    pub fn to_object(&self) -> JsonObject {
        crate::into_object(
            serde_json::to_value(self).expect("Implementation error: cannot serialize as JSON"),
        )
    }

    /// Validates the claims of the issued JWT, as needed by the Holder: the JWT must not be
    /// expired.
    pub(crate) fn validate_claims_holder(
        &self,
        current_time: SecondsSinceEpoch,
    ) -> crate::Result<(), crate::Error> {
        // https://www.rfc-editor.org/rfc/rfc7519.html#section-4.1.4
        if let Some(exp) = self.exp {
            // RFC: "on or after"
            if current_time >= exp {
                return Err(Error::root(crate::Error::JwtExpired(current_time, exp)));
            };
        };

        Ok(())
    }

    /// Validates the claims of the issued JWT, as needed by the Verifier: in addition to the
    /// Holder checks, the `nbf` claim must be in the past.
    pub(crate) fn validate_claims_verifier(
        &self,
        current_time: SecondsSinceEpoch,
    ) -> crate::Result<(), VerifierError> {
        self.validate_claims_holder(current_time)
            .match_err(|crate_error| crate_error.to_verifier_error())?;

        if let Some(nbf) = self.nbf {
            if current_time < nbf {
                return Err(Error::root(VerifierError::JwtNotYetValid(
                    current_time,
                    nbf,
                )));
            };
        };

        Ok(())
    }
}

/// Recursively scan a claims object for reserved structural names.
fn find_reserved_name(object: &JsonObject) -> Option<&'static str> {
    for (key, value) in object {
        if let Some(name) = RESERVED_CLAIM_NAMES.get(key.as_str()) {
            return Some(name);
        }
        if let Some(name) = find_reserved_name_value(value) {
            return Some(name);
        }
    }
    None
}

fn find_reserved_name_value(value: &serde_json::Value) -> Option<&'static str> {
    match value {
        serde_json::Value::Object(object) => find_reserved_name(object),
        serde_json::Value::Array(array) => array.iter().find_map(find_reserved_name_value),
        _ => None,
    }
}

/// An issued SD-JWT: the signed issuer JWT together with all its disclosures.
#[derive(Debug)]
pub struct IssuedSdJwt {
    pub(crate) jwt: String,
    pub(crate) header: IssuerJwtHeader,
    pub(crate) payload: IssuerJwt,
    pub(crate) disclosures: Vec<Disclosure>,
}

impl IssuedSdJwt {
    /// The signed issuer JWT payload, with the concealed claims replaced by digests.
    pub fn payload(&self) -> &IssuerJwt {
        &self.payload
    }

    /// The header of the signed issuer JWT.
    pub fn header(&self) -> &IssuerJwtHeader {
        &self.header
    }

    /// All disclosures created at issuance.
    pub fn disclosures(&self) -> &[Disclosure] {
        &self.disclosures
    }

    /// Serialize in the JWS compact serialization format (`<JWT>~<D1>~…~<DN>~`).
    pub fn into_string_compact(self) -> String {
        SdJwt::new(
            self.jwt,
            self.disclosures
                .into_iter()
                .map(Disclosure::into_string)
                .collect(),
        )
        .to_string()
    }
}

impl<H: Hasher> Issuer<H> {
    /// Construct a new [`Issuer`] with the given [`Hasher`].
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// Create a new SD-JWT with disclosures for the JSON nodes at the provided paths, if they
    /// all exist.
    ///
    /// Paths which are extensions of other paths will cause creation of recursive disclosures,
    /// i.e. disclosures which themselves contain hash pointers to other disclosures, as
    /// described in the [draft].
    ///
    /// [draft]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt#name-example-sd-jwt-with-recursi
    pub fn issue<S: JwtSigner + HasX5Chain, R: CryptoRngCore + ?Sized>(
        &self,
        mut jwt_payload: IssuerJwt,
        disclosure_paths: &[&JsonNodePath],
        signer: &S,
        rng: &mut R,
    ) -> Result<IssuedSdJwt> {
        // https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc-03#name-registered-jwt-claims
        check_registered_path_in_paths(disclosure_paths)?;

        jwt_payload.sd_alg = Some(self.hasher.algorithm());

        // Only the custom claims take part in selective disclosure; the registered claims of
        // `IssuerJwt` stay in cleartext.
        let disclosures =
            encoder::encode_claims(&mut jwt_payload.claims, disclosure_paths, &self.hasher, rng)?;

        let x5c = signer
            .x5chain()
            .try_into()
            .with_err(|| IssuerError::SigningFailed)
            .ctx(|| "invalid Issuer X.509 certificate chain")?;

        let header = IssuerJwtHeader {
            typ: TYP_VC_SD_JWT.into(),
            alg: signer.algorithm(),
            kid: None,
            x5c: Some(x5c),
        };

        let unsigned_token = jwt::Token::new(header.clone(), jwt_payload.clone());
        let signed_token: jwt::Token<_, _, jwt::token::Signed> = signer
            .sign_jwt(unsigned_token)
            .foreign_boxed_err(|| IssuerError::SigningFailed)?;

        Ok(IssuedSdJwt {
            jwt: signed_token.as_str().to_owned(),
            header,
            payload: jwt_payload,
            disclosures,
        })
    }
}

/// Check if some `path` in the provided array of `paths` leads to a registered claim which must
/// not be disclosable.
fn check_registered_path_in_paths(paths: &[&JsonNodePath]) -> Result<()> {
    for path in paths {
        if let [JsonNodePathSegment::Key(key)] = path {
            if let Some(name) = REGISTERED_CLAIM_NAMES.get(key) {
                return Err(Error::root(IssuerError::ReservedOrRegisteredClaimName(
                    *name,
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use bh_jose::{json_object, Es256Signer, SignerWithChain};
    use iref::IriBuf;

    use super::*;
    use crate::{decoder::decode_disclosed_claims, Sha256};

    pub(crate) fn dummy_https_iss() -> UriBuf {
        IriBuf::new("https://issuer.example/.well-known/jwt-issuer".into())
            .unwrap()
            .try_into_uri()
            .unwrap()
    }

    pub(crate) fn dummy_signer() -> SignerWithChain<Es256Signer> {
        SignerWithChain::generate("issuer-kid".to_owned(), "issuer", None).unwrap()
    }

    pub(crate) fn dummy_claims() -> JsonObject {
        json_object!({
            "given_name": "Erika",
            "family_name": "Mustermann",
            "age_over_18": true,
            "nationalities": ["DE", "FR"],
        })
    }

    pub(crate) fn test_issuer_jwt(holder_jwk: JwkPublic) -> IssuerJwt {
        IssuerJwt::new(
            "TestCredential".into(),
            dummy_https_iss(),
            holder_jwk,
            dummy_claims(),
        )
        .unwrap()
    }

    use JsonNodePathSegment::*;

    pub(crate) const TEST_DISCLOSURE_PATHS: &[&JsonNodePath] = &[
        &[Key("given_name")],
        &[Key("family_name")],
        &[Key("age_over_18")],
        &[Key("nationalities"), Index(0)],
    ];

    #[test]
    fn happy_path() {
        let issuer = Issuer::new(Sha256);
        let holder = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let issued = issuer
            .issue(
                test_issuer_jwt(holder.public_jwk().unwrap()),
                TEST_DISCLOSURE_PATHS,
                &dummy_signer(),
                &mut rand::thread_rng(),
            )
            .unwrap();

        assert_eq!(issued.disclosures.len(), TEST_DISCLOSURE_PATHS.len());
        assert_eq!(issued.payload.sd_alg, Some(HashingAlgorithm::Sha256));
        assert_eq!(issued.header.typ, TYP_VC_SD_JWT);
        assert!(issued.header.x5c.is_some());

        // all concealed claims reconstruct to the original cleartext
        let decoded =
            decode_disclosed_claims(&issued.payload.claims, &issued.disclosures, &Sha256).unwrap();
        assert_eq!(decoded, dummy_claims());

        // the compact form parses back
        let compact = issued.into_string_compact();
        let parsed: crate::sd_jwt::SdJwt = compact.parse().unwrap();
        assert_eq!(parsed.disclosures.len(), TEST_DISCLOSURE_PATHS.len());
    }

    #[test]
    fn registered_claims_are_not_disclosable() {
        let issuer = Issuer::new(Sha256);
        let holder = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        for claim in REGISTERED_CLAIM_NAMES.iter() {
            let path: &JsonNodePath = &[Key(claim)];
            let error = issuer.issue(
                test_issuer_jwt(holder.public_jwk().unwrap()),
                &[path],
                &dummy_signer(),
                &mut rand::thread_rng(),
            );
            assert_eq!(
                error.unwrap_err().error,
                IssuerError::ReservedOrRegisteredClaimName(claim)
            );
        }
    }

    #[test]
    fn registered_claims_are_rejected_in_custom_claims() {
        let holder = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        for claim in ["iss", "vct", "cnf", "status", "nbf", "exp"] {
            let mut claims = JsonObject::new();
            claims.insert(claim.to_owned(), "anything".into());

            let result = IssuerJwt::new(
                "TestCredential".into(),
                dummy_https_iss(),
                holder.public_jwk().unwrap(),
                claims,
            );

            assert_eq!(
                result.unwrap_err().error,
                IssuerError::ReservedOrRegisteredClaimName(claim)
            );
        }
    }

    #[test]
    fn reserved_names_are_rejected_at_any_depth() {
        let holder = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let claims = json_object!({
            "parent": { "_sd": ["smuggled"] },
        });

        let result = IssuerJwt::new(
            "TestCredential".into(),
            dummy_https_iss(),
            holder.public_jwk().unwrap(),
            claims,
        );

        assert_eq!(
            result.unwrap_err().error,
            IssuerError::ReservedOrRegisteredClaimName("_sd")
        );
    }

    #[test]
    fn sub_claim_is_disclosable() {
        // https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc-01#section-3.2.2.2-5.1.1
        let holder = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let mut jwt = test_issuer_jwt(holder.public_jwk().unwrap());
        jwt.add_sub_claim("subject identifier".to_owned());

        let issued = Issuer::new(Sha256)
            .issue(
                jwt,
                &[&[Key("sub")]],
                &dummy_signer(),
                &mut rand::thread_rng(),
            )
            .unwrap();

        assert_eq!(issued.disclosures[0].claim_name(), Some("sub"));
        assert_eq!(issued.disclosures[0].value(), "subject identifier");
    }

    #[test]
    fn sd_alg_field_serializes_correctly() {
        let holder = Es256Signer::generate("holder-kid".to_owned()).unwrap();

        let mut jwt = test_issuer_jwt(holder.public_jwk().unwrap());
        jwt.sd_alg = Some(HashingAlgorithm::Sha256);

        let serialized = serde_json::to_value(&jwt).unwrap();
        assert_eq!(serialized["_sd_alg"], "sha-256");

        let deserialized: IssuerJwt = serde_json::from_value(serialized).unwrap();
        assert_eq!(deserialized.sd_alg, jwt.sd_alg);
    }
}
