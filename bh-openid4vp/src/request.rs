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

//! The authorization request: its parameters, client-identifier schemes, construction modes
//! and the signed request object (JAR, [RFC 9101][1]).
//!
//! [1]: <https://datatracker.ietf.org/doc/html/rfc9101>

use bh_jose::{ContentEncryptionAlgorithm, JwkSet, JwsHeader, JwsSigned, SignatureVerifier, SigningAlgorithm};
use bh_x509::{X509Trust, X5Chain};
use bherror::{
    traits::{ErrorContext as _, ForeignError as _, PropagateError as _},
    Error,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::OpenId4VpError, pex::PresentationDefinition, JsonObject, Result, SecondsSinceEpoch,
};

/// The `typ` header of a signed request object (JAR).
pub const TYP_OAUTH_AUTHZ_REQUEST: &str = "oauth-authz-req+jwt";

/// The response mode: how the wallet delivers the authorization response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    /// Parameters in the fragment component of the redirect URI.
    #[serde(rename = "fragment")]
    Fragment,
    /// Parameters in the query component of the redirect URI.
    #[serde(rename = "query")]
    Query,
    /// Parameters as an `application/x-www-form-urlencoded` POST body to the `response_uri`.
    #[serde(rename = "direct_post")]
    DirectPost,
    /// Like `direct_post`, with the parameters wrapped in a signed or encrypted JWT carried in
    /// the `response` form member.
    #[serde(rename = "direct_post.jwt")]
    DirectPostJwt,
}

impl ResponseMode {
    /// Whether this mode posts to a `response_uri` (as opposed to redirecting).
    pub fn uses_response_uri(&self) -> bool {
        matches!(self, Self::DirectPost | Self::DirectPostJwt)
    }
}

/// The requested response type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    /// A verifiable-presentation token.
    #[serde(rename = "vp_token")]
    VpToken,
    /// A SIOPv2 self-issued ID token.
    #[serde(rename = "id_token")]
    IdToken,
    /// Both a presentation token and an ID token.
    #[serde(rename = "vp_token id_token")]
    VpTokenIdToken,
}

/// The client-identifier scheme of the verifier, fixed at construction.
///
/// The scheme decides how the wallet authenticates the request: `x509_san_dns` and
/// `verifier_attestation` mandate signed request objects, `redirect_uri` forbids them.
#[derive(Debug, Clone)]
pub enum ClientIdScheme {
    /// The wallet knows the verifier by prior registration.
    PreRegistered {
        /// The registered client identifier.
        client_id: String,
    },

    /// The client identifier *is* the redirect URI; requests cannot be signed.
    RedirectUri {
        /// The redirect URI doubling as the client identifier.
        redirect_uri: String,
    },

    /// The client identifier is a DNS name certified by the SAN dNSName of the leaf
    /// certificate the signed request carries; `redirect_uri` is not permitted.
    CertificateSanDns {
        /// The DNS name, e.g. `verifier.example`.
        dns_name: String,
    },

    /// The verifier presents an attestation JWT in the request JWS header; the client
    /// identifier equals the `sub` of the attestation.
    VerifierAttestation {
        /// The Verifier Attestation JWT.
        attestation_jwt: String,
    },
}

impl ClientIdScheme {
    /// The scheme identifier as registered by OpenID4VP.
    pub fn scheme_name(&self) -> &'static str {
        match self {
            Self::PreRegistered { .. } => "pre-registered",
            Self::RedirectUri { .. } => "redirect_uri",
            Self::CertificateSanDns { .. } => "x509_san_dns",
            Self::VerifierAttestation { .. } => "verifier_attestation",
        }
    }

    /// The bare client identifier, without a scheme prefix.
    pub fn client_id(&self) -> Result<String> {
        Ok(match self {
            Self::PreRegistered { client_id } => client_id.clone(),
            Self::RedirectUri { redirect_uri } => redirect_uri.clone(),
            Self::CertificateSanDns { dns_name } => dns_name.clone(),
            Self::VerifierAttestation { attestation_jwt } => {
                attestation_subject(attestation_jwt)?
            }
        })
    }

    /// The client identifier in the newer prefixed form (`<scheme>:<id>`); pre-registered
    /// identifiers stay bare.
    pub fn prefixed_client_id(&self) -> Result<String> {
        Ok(match self {
            Self::PreRegistered { client_id } => client_id.clone(),
            _ => format!("{}:{}", self.scheme_name(), self.client_id()?),
        })
    }

    /// Whether this scheme mandates a signed request object.
    pub fn requires_signed_request(&self) -> bool {
        matches!(
            self,
            Self::CertificateSanDns { .. } | Self::VerifierAttestation { .. }
        )
    }
}

/// Extract the `sub` claim of a Verifier Attestation JWT (without verifying it; the wallet
/// verifies against its own trust in the attestation issuer).
fn attestation_subject(attestation_jwt: &str) -> Result<String> {
    let jws = JwsSigned::parse(attestation_jwt)
        .with_err(|| OpenId4VpError::ParseError("unparseable attestation JWT".to_owned()))?;

    let claims: JsonObject = serde_json::from_slice(&jws.payload)
        .foreign_err(|| OpenId4VpError::ParseError("attestation payload not JSON".to_owned()))?;

    claims
        .get("sub")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::root(OpenId4VpError::InvalidStructure(
                "attestation JWT without `sub`".to_owned(),
            ))
        })
}

/// How the request reaches the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMode {
    /// All parameters unsigned on the authorization URL.
    Query,
    /// The URL carries `client_id` and `request_uri`; the URI serves the plain parameters.
    ByReference {
        /// Where the verifier will serve the request parameters.
        request_uri: String,
    },
    /// The URL carries the signed request object by value (`request=...`).
    SignedByValue,
    /// The URL carries `client_id` and `request_uri`; the URI serves the signed JAR
    /// (`application/oauth-authz-req+jwt`).
    SignedByReference {
        /// Where the verifier will serve the JAR.
        request_uri: String,
    },
}

/// The metadata of the verifier, conveyed inline as `client_metadata` or served at a
/// `client_metadata_uri`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelyingPartyMetadata {
    /// Keys of the verifier, including the response-encryption key (`use: "enc"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// The formats the verifier accepts, keyed by format identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp_formats: Option<JsonObject>,

    /// The JWE `alg` for encrypted responses; only `ECDH-ES` is supported.
    ///
    /// Some deployments serialize this member under the historical name
    /// `authorization_encrypted_response_alg_string`; both are accepted on parse.
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "authorization_encrypted_response_alg_string"
    )]
    pub authorization_encrypted_response_alg: Option<String>,

    /// The JWE `enc` for encrypted responses.
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "authorization_encrypted_response_enc_string"
    )]
    pub authorization_encrypted_response_enc: Option<ContentEncryptionAlgorithm>,
}

/// The parameters of an OpenID4VP authorization request.
///
/// The two `client_id_scheme` conventions coexist in the wild: older drafts carry a top-level
/// `client_id_scheme` parameter, newer ones prefix the `client_id` itself.  Both are accepted
/// on parse ([`Self::resolved_client_id_scheme`]); emitted requests use the newer form only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationRequestParameters {
    /// The requested response type.
    pub response_type: ResponseType,

    /// The client identifier, possibly scheme-prefixed.
    pub client_id: String,

    /// The legacy top-level scheme parameter; never emitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_scheme: Option<String>,

    /// The freshness nonce, echoed inside the presentations.
    pub nonce: String,

    /// Opaque verifier state, echoed in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// How the response travels back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,

    /// Where to redirect the wallet (fragment/query modes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Where to POST the response (`direct_post` modes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_uri: Option<String>,

    /// What to present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<PresentationDefinition>,

    /// Verifier metadata, inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<RelyingPartyMetadata>,

    /// Verifier metadata, by reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_metadata_uri: Option<String>,
}

impl AuthenticationRequestParameters {
    /// The `(scheme, bare client id)` pair, resolving both the legacy top-level parameter and
    /// the newer prefixed `client_id`; an absent scheme means pre-registered.
    pub fn resolved_client_id_scheme(&self) -> (String, String) {
        if let Some(scheme) = &self.client_id_scheme {
            return (scheme.clone(), self.client_id.clone());
        }

        // the newer form embeds the scheme before the first `:`, e.g.
        // `x509_san_dns:verifier.example`; anything else (including URL-shaped
        // identifiers) means pre-registered
        const KNOWN_SCHEMES: [&str; 5] = [
            "pre-registered",
            "redirect_uri",
            "x509_san_dns",
            "x509_hash",
            "verifier_attestation",
        ];

        match self.client_id.split_once(':') {
            Some((scheme, id)) if KNOWN_SCHEMES.contains(&scheme) => {
                (scheme.to_owned(), id.to_owned())
            }
            _ => ("pre-registered".to_owned(), self.client_id.clone()),
        }
    }

    /// Serialize for a URL query or a form body.
    ///
    /// Structured members (`presentation_definition`, `client_metadata`) are carried as JSON
    /// strings, per the OAuth parameter encoding rules.
    pub fn to_url_params(&self) -> Result<Vec<(String, String)>> {
        let value = serde_json::to_value(self)
            .foreign_err(|| OpenId4VpError::ParseError("unserializable request".to_owned()))?;

        let serde_json::Value::Object(object) = value else {
            unreachable!("request parameters serialize as an object");
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

    /// Parse from URL query / form-body pairs, decoding JSON-valued members.
    pub fn from_url_params(params: &[(String, String)]) -> Result<Self> {
        let mut object = JsonObject::new();

        for (key, value) in params {
            let parsed = match key.as_str() {
                "presentation_definition" | "client_metadata" => {
                    serde_json::from_str(value).foreign_err(|| {
                        OpenId4VpError::ParseError(format!("`{key}` is not valid JSON"))
                    })?
                }
                _ => serde_json::Value::String(value.clone()),
            };
            object.insert(key.clone(), parsed);
        }

        serde_json::from_value(serde_json::Value::Object(object))
            .foreign_err(|| OpenId4VpError::ParseError("not an authorization request".to_owned()))
    }
}

/// The product of request construction: the authorization URL for the wallet, plus whatever
/// the verifier must serve at the `request_uri` (for the by-reference modes).
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedRequest {
    /// The authorization request URL to present to the wallet.
    pub url: String,

    /// The body to serve at the `request_uri`: the signed JAR
    /// (`application/oauth-authz-req+jwt`) or the plain JSON parameters, depending on the
    /// request mode.
    pub request_object: Option<String>,
}

/// Sign the request parameters into a JAR.
///
/// For the `x509_san_dns` scheme the JWS header carries the verifier's certificate chain; for
/// `verifier_attestation` it carries the attestation JWT in the `jwt` header parameter.
pub(crate) fn sign_request_object(
    params: &AuthenticationRequestParameters,
    scheme: &ClientIdScheme,
    signer: &(impl bh_jose::Signer + bh_jose::HasX5Chain),
) -> Result<String> {
    let mut header = match scheme {
        ClientIdScheme::CertificateSanDns { .. } => {
            JwsHeader::with_x5chain(signer, Some(TYP_OAUTH_AUTHZ_REQUEST))
                .with_err(|| OpenId4VpError::CryptoFailed)?
        }
        _ => JwsHeader::with_jwk(signer, Some(TYP_OAUTH_AUTHZ_REQUEST))
            .with_err(|| OpenId4VpError::CryptoFailed)?,
    };

    if let ClientIdScheme::VerifierAttestation { attestation_jwt } = scheme {
        header.jwt = Some(attestation_jwt.clone());
    }

    let payload = serde_json::to_vec(params).foreign_err(|| OpenId4VpError::CryptoFailed)?;

    let jws = JwsSigned::sign(header, &payload, signer)
        .with_err(|| OpenId4VpError::CryptoFailed)
        .ctx(|| "JAR signing failed")?;

    Ok(jws.serialize_compact())
}

/// Parse & authenticate a signed request object, wallet side.
///
/// The verification enforces the scheme rules of OpenID4VP: for `x509_san_dns` the signing
/// chain's leaf must carry a SAN dNSName equal to the bare client id, and the chain must
/// verify against `trust` when provided.
pub fn verify_request_object<'a>(
    jar: &str,
    trust: Option<&X509Trust>,
    get_signature_verifier: impl FnOnce(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    _current_time: SecondsSinceEpoch,
) -> Result<AuthenticationRequestParameters> {
    let jws = JwsSigned::parse(jar)
        .with_err(|| OpenId4VpError::ParseError("unparseable request object".to_owned()))?;

    if jws.header.typ.as_deref() != Some(TYP_OAUTH_AUTHZ_REQUEST) {
        return Err(Error::root(OpenId4VpError::InvalidStructure(format!(
            "unexpected request object typ {:?}",
            jws.header.typ
        ))));
    }

    jws.verify(None, trust, get_signature_verifier)
        .match_err(|e| match e {
            bh_jose::SignatureError::UnknownKey => OpenId4VpError::UnknownKey,
            _ => OpenId4VpError::InvalidSignature,
        })?;

    let params: AuthenticationRequestParameters = serde_json::from_slice(&jws.payload)
        .foreign_err(|| OpenId4VpError::ParseError("JAR payload not a request".to_owned()))?;

    let (scheme, bare_client_id) = params.resolved_client_id_scheme();
    if scheme == "x509_san_dns" {
        let x5c = jws.header.x5c.clone().ok_or_else(|| {
            Error::root(OpenId4VpError::InvalidStructure(
                "x509_san_dns request without `x5c`".to_owned(),
            ))
        })?;
        let chain: X5Chain = x5c
            .try_into()
            .with_err(|| OpenId4VpError::UnknownKey)?;

        let san_names = chain
            .leaf_san_dns_names()
            .with_err(|| OpenId4VpError::InvalidStructure("leaf without SAN dNSName".to_owned()))?;

        if !san_names.iter().any(|name| name == &bare_client_id) {
            return Err(Error::root(OpenId4VpError::InvalidStructure(
                "SAN dNSName does not match client_id".to_owned(),
            )));
        }

        if params.redirect_uri.is_some() {
            return Err(Error::root(OpenId4VpError::InvalidStructure(
                "redirect_uri not permitted for x509_san_dns".to_owned(),
            )));
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose::{Es256Signer, Es256Verifier, SignerWithChain};

    use super::*;
    use crate::pex::{InputDescriptor, FORMAT_VC_SD_JWT};

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    fn dummy_params(client_id: &str) -> AuthenticationRequestParameters {
        AuthenticationRequestParameters {
            response_type: ResponseType::VpToken,
            client_id: client_id.to_owned(),
            client_id_scheme: None,
            nonce: "n1".to_owned(),
            state: Some("s1".to_owned()),
            response_mode: Some(ResponseMode::Fragment),
            redirect_uri: None,
            response_uri: None,
            presentation_definition: Some(PresentationDefinition::new(vec![
                InputDescriptor::new("d1".to_owned(), FORMAT_VC_SD_JWT, &["$.age_over_18"]),
            ])),
            client_metadata: None,
            client_metadata_uri: None,
        }
    }

    #[test]
    fn url_params_roundtrip() {
        let params = dummy_params("https://verifier.example/rp1");

        let pairs = params.to_url_params().unwrap();
        let parsed = AuthenticationRequestParameters::from_url_params(&pairs).unwrap();

        assert_eq!(parsed, params);
    }

    #[test]
    fn both_client_id_scheme_conventions_resolve() {
        // newer prefixed form
        let params = dummy_params("x509_san_dns:verifier.example");
        assert_eq!(
            params.resolved_client_id_scheme(),
            ("x509_san_dns".to_owned(), "verifier.example".to_owned())
        );

        // legacy top-level parameter
        let mut params = dummy_params("verifier.example");
        params.client_id_scheme = Some("x509_san_dns".to_owned());
        assert_eq!(
            params.resolved_client_id_scheme(),
            ("x509_san_dns".to_owned(), "verifier.example".to_owned())
        );

        // a URL-shaped client id is not a scheme prefix
        let params = dummy_params("https://verifier.example/rp1");
        assert_eq!(
            params.resolved_client_id_scheme(),
            (
                "pre-registered".to_owned(),
                "https://verifier.example/rp1".to_owned()
            )
        );
    }

    #[test]
    fn scheme_properties() {
        let san = ClientIdScheme::CertificateSanDns {
            dns_name: "verifier.example".to_owned(),
        };
        assert!(san.requires_signed_request());
        assert_eq!(san.prefixed_client_id().unwrap(), "x509_san_dns:verifier.example");

        let pre = ClientIdScheme::PreRegistered {
            client_id: "rp-42".to_owned(),
        };
        assert!(!pre.requires_signed_request());
        assert_eq!(pre.prefixed_client_id().unwrap(), "rp-42");
    }

    #[test]
    fn jar_roundtrip_with_san_check() {
        let signer =
            SignerWithChain::generate("rp-kid".to_owned(), "verifier", Some("verifier.example"))
                .unwrap();
        let scheme = ClientIdScheme::CertificateSanDns {
            dns_name: "verifier.example".to_owned(),
        };

        let params = dummy_params("x509_san_dns:verifier.example");
        let jar = sign_request_object(&params, &scheme, &signer).unwrap();

        let parsed = verify_request_object(&jar, None, get_verifier, 1000).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn jar_with_san_mismatch_is_rejected() {
        // certificate for a different DNS name than the client id claims
        let signer =
            SignerWithChain::generate("rp-kid".to_owned(), "verifier", Some("attacker.example"))
                .unwrap();
        let scheme = ClientIdScheme::CertificateSanDns {
            dns_name: "attacker.example".to_owned(),
        };

        let params = dummy_params("x509_san_dns:verifier.example");
        let jar = sign_request_object(&params, &scheme, &signer).unwrap();

        let err = verify_request_object(&jar, None, get_verifier, 1000).unwrap_err();
        assert_matches!(err.error, OpenId4VpError::InvalidStructure(m) if m.contains("SAN"));
    }

    #[test]
    fn san_scheme_forbids_redirect_uri() {
        let signer =
            SignerWithChain::generate("rp-kid".to_owned(), "verifier", Some("verifier.example"))
                .unwrap();
        let scheme = ClientIdScheme::CertificateSanDns {
            dns_name: "verifier.example".to_owned(),
        };

        let mut params = dummy_params("x509_san_dns:verifier.example");
        params.redirect_uri = Some("https://verifier.example/redirect".to_owned());

        let jar = sign_request_object(&params, &scheme, &signer).unwrap();

        let err = verify_request_object(&jar, None, get_verifier, 1000).unwrap_err();
        assert_matches!(err.error, OpenId4VpError::InvalidStructure(m) if m.contains("redirect_uri"));
    }

    #[test]
    fn attestation_subject_is_the_client_id() {
        let attestation_signer = Es256Signer::generate("attester".to_owned()).unwrap();
        let header = JwsHeader::with_jwk(&attestation_signer, Some("verifier-attestation+jwt"))
            .unwrap();
        let payload = serde_json::json!({
            "iss": "https://attester.example",
            "sub": "https://verifier.example/rp1",
        });
        let attestation = JwsSigned::sign(
            header,
            payload.to_string().as_bytes(),
            &attestation_signer,
        )
        .unwrap()
        .serialize_compact();

        let scheme = ClientIdScheme::VerifierAttestation {
            attestation_jwt: attestation,
        };

        assert_eq!(scheme.client_id().unwrap(), "https://verifier.example/rp1");
        assert_eq!(
            scheme.prefixed_client_id().unwrap(),
            "verifier_attestation:https://verifier.example/rp1"
        );
    }

    #[test]
    fn tampered_jar_is_rejected() {
        let signer =
            SignerWithChain::generate("rp-kid".to_owned(), "verifier", Some("verifier.example"))
                .unwrap();
        let scheme = ClientIdScheme::CertificateSanDns {
            dns_name: "verifier.example".to_owned(),
        };

        let params = dummy_params("x509_san_dns:verifier.example");
        let jar = sign_request_object(&params, &scheme, &signer).unwrap();

        // truncate the signature
        let tampered = &jar[..jar.len() - 4];

        let err = verify_request_object(tampered, None, get_verifier, 1000).unwrap_err();
        assert_matches!(err.error, OpenId4VpError::InvalidSignature);
    }
}
