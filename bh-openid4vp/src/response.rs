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

//! The authorization response: its parameters, the SIOPv2 ID token, and the structured
//! validation outcomes of the verifier.

use bh_jose::{base64_url_encode, jwk_sha256_thumbprint_bytes, JwkPublic};
use bh_status_list::CredentialStatus;
use bh_vc_jwt::VcJwtClaims;
use bherror::traits::ForeignError as _;
use serde::{Deserialize, Serialize};

use crate::{
    error::OpenId4VpError, pex::PresentationSubmission, JsonObject, Result, SecondsSinceEpoch,
};

/// The parameters of an authorization response, before validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthenticationResponseParameters {
    /// The presentation(s): a single string or an array of strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp_token: Option<serde_json::Value>,

    /// How the presentations map onto the requested descriptors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,

    /// The SIOPv2 self-issued ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// The verifier state echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthenticationResponseParameters {
    /// Serialize for a URL fragment/query or a form body.
    pub fn to_url_params(&self) -> Result<Vec<(String, String)>> {
        let value = serde_json::to_value(self)
            .foreign_err(|| OpenId4VpError::ParseError("unserializable response".to_owned()))?;

        let serde_json::Value::Object(object) = value else {
            unreachable!("response parameters serialize as an object");
        };

        Ok(object
            .into_iter()
            .map(|(key, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, rendered)
            })
            .collect())
    }

    /// Parse from URL fragment/query or form-body pairs.
    pub fn from_url_params(params: &[(String, String)]) -> Result<Self> {
        let mut object = JsonObject::new();

        for (key, value) in params {
            let parsed = match key.as_str() {
                "presentation_submission" => serde_json::from_str(value).foreign_err(|| {
                    OpenId4VpError::ParseError("`presentation_submission` is not valid JSON".to_owned())
                })?,
                // a `vp_token` is either a bare credential string or a JSON array
                "vp_token" => serde_json::from_str(value)
                    .unwrap_or_else(|_| serde_json::Value::String(value.clone())),
                _ => serde_json::Value::String(value.clone()),
            };
            object.insert(key.clone(), parsed);
        }

        serde_json::from_value(serde_json::Value::Object(object))
            .foreign_err(|| OpenId4VpError::ParseError("not an authorization response".to_owned()))
    }
}

/// The claims of a SIOPv2 self-issued ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// The issuer; for a self-issued token, equal to `sub`.
    pub iss: String,

    /// The subject: the base64url SHA-256 thumbprint of `sub_jwk`.
    pub sub: String,

    /// The intended audience: the verifier's client id.
    pub aud: String,

    /// The verifier-chosen nonce.
    pub nonce: String,

    /// Issued-at time.
    pub iat: SecondsSinceEpoch,

    /// Expiration time.
    pub exp: SecondsSinceEpoch,

    /// The wallet's public key the token is signed with.
    pub sub_jwk: JwkPublic,
}

impl IdTokenClaims {
    /// Assemble a self-issued ID token payload for the wallet key `sub_jwk`.
    pub fn new_self_issued(
        sub_jwk: JwkPublic,
        aud: String,
        nonce: String,
        iat: SecondsSinceEpoch,
    ) -> Result<Self> {
        let thumbprint = jwk_sha256_thumbprint_bytes(sub_jwk.clone())
            .foreign_err(|| OpenId4VpError::CryptoFailed)?;
        let sub = base64_url_encode(thumbprint);

        Ok(Self {
            iss: sub.clone(),
            sub,
            aud,
            nonce,
            iat,
            exp: iat + 300,
            sub_jwk,
        })
    }
}

/// A single claim revealed by an SD-JWT presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealedClaim {
    /// The claim name.
    pub claim_name: String,
    /// The claim value.
    pub claim_value: serde_json::Value,
}

/// The verification outcome of one presented descriptor.
///
/// A failed descriptor does not short-circuit the others; it is recorded as the
/// [`ValidationError`][PresentationResult::ValidationError] variant in the aggregate.
#[derive(Debug)]
pub enum PresentationResult {
    /// A verified W3C VC-JWT presentation.
    VcJwt {
        /// The answered descriptor.
        descriptor_id: String,
        /// The verified credential payload.
        vc: Box<VcJwtClaims>,
        /// The credential's revocation pointer, if it carries one.
        credential_status: Option<CredentialStatus>,
        /// The revocation verdict; [`None`] until evaluated against a revocation list.
        /// Revocation is orthogonal to cryptographic validity.
        is_revoked: Option<bool>,
    },

    /// A verified SD-JWT presentation.
    SdJwt {
        /// The answered descriptor.
        descriptor_id: String,
        /// The reconstructed cleartext of the disclosed subset.
        claims: JsonObject,
        /// The individually revealed claims, in presentation order.
        disclosures: Vec<RevealedClaim>,
    },

    /// A verified ISO mdoc presentation.
    Iso {
        /// The answered descriptor.
        descriptor_id: String,
        /// The verified documents of the `DeviceResponse`.
        documents: Vec<bh_mdoc::verifier::VerifiedClaims>,
    },

    /// The descriptor failed format or shape validation.
    ValidationError {
        /// The failed descriptor.
        descriptor_id: String,
        /// A human-readable reason.
        reason: String,
    },
}

impl PresentationResult {
    /// Whether this descriptor verified successfully.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::ValidationError { .. })
    }
}

/// The structured outcome of authorization-response validation.
///
/// No error escapes [`validate_authn_response`][crate::Openid4VpVerifier::validate_authn_response]
/// as a Rust error; every failure path lands in one of these variants.
#[derive(Debug)]
pub enum AuthnResponseOutcome {
    /// The `vp_token` branch: per-descriptor results, aggregated without short-circuiting.
    Success {
        /// The verifier state of the corresponding request.
        state: Option<String>,
        /// One result per descriptor of the presentation submission.
        presentations: Vec<PresentationResult>,
    },

    /// The `id_token` branch of SIOPv2.
    SuccessIdToken {
        /// The verifier state of the corresponding request.
        state: Option<String>,
        /// The verified ID-token claims.
        claims: Box<IdTokenClaims>,
    },

    /// A named field of the response failed validation.
    ValidationError {
        /// The offending field.
        field: &'static str,
        /// The verifier state, when it could be determined.
        state: Option<String>,
    },

    /// The response could not be processed at all.
    Error {
        /// A human-readable reason.
        reason: String,
        /// The verifier state, when it could be determined.
        state: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_url_params_roundtrip() {
        let params = AuthenticationResponseParameters {
            vp_token: Some(serde_json::Value::String("eyJhbGciOi...~d1~".to_owned())),
            presentation_submission: Some(PresentationSubmission {
                id: "sub-1".to_owned(),
                definition_id: "def-1".to_owned(),
                descriptor_map: vec![],
            }),
            id_token: None,
            state: Some("s1".to_owned()),
        };

        let pairs = params.to_url_params().unwrap();
        let parsed = AuthenticationResponseParameters::from_url_params(&pairs).unwrap();

        assert_eq!(parsed, params);
    }

    #[test]
    fn array_vp_token_roundtrips() {
        let params = AuthenticationResponseParameters {
            vp_token: Some(serde_json::json!(["token-a", "token-b"])),
            presentation_submission: None,
            id_token: None,
            state: None,
        };

        let pairs = params.to_url_params().unwrap();
        let parsed = AuthenticationResponseParameters::from_url_params(&pairs).unwrap();

        assert_eq!(parsed, params);
    }

    #[test]
    fn self_issued_id_token_is_consistent() {
        let signer = bh_jose::Es256Signer::generate("wallet".to_owned()).unwrap();
        let jwk = signer.public_jwk().unwrap();

        let claims = IdTokenClaims::new_self_issued(
            jwk,
            "https://verifier.example/rp1".to_owned(),
            "n1".to_owned(),
            1000,
        )
        .unwrap();

        assert_eq!(claims.iss, claims.sub);
        assert_eq!(claims.exp, 1300);

        // the subject is the thumbprint of the embedded key
        let thumbprint =
            jwk_sha256_thumbprint_bytes(claims.sub_jwk.clone()).unwrap();
        assert_eq!(claims.sub, base64_url_encode(thumbprint));
    }
}
