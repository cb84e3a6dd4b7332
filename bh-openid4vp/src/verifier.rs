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

//! The OpenID4VP Verifier (Relying Party): request construction, state tracking, and the
//! response-validation state machine.

use bh_jose::{
    jwk_sha256_thumbprint_bytes, ContentEncryptionAlgorithm, Es256Signer, Es256Verifier,
    JweEncrypted, JwkSet, JwsSigned, SignatureVerifier, SignerWithChain, SigningAlgorithm,
};
use bh_mdoc::models::DeviceResponse;
use bh_sd_jwt::{
    default_hasher, lookup::X5ChainLookup, KeyBindingChallenge, SdJwtKB,
};
use bh_status_list::RevocationList;
use bh_vc_jwt::VcJwtClaims;
use bh_x509::X509Trust;
use bherror::{traits::ForeignError as _, Error};
use serde_json::Value;

use crate::{
    error::OpenId4VpError,
    pex::{
        evaluate_json_path, PresentationDefinition, PresentationSubmissionDescriptor,
        FORMAT_JWT_SD, FORMAT_JWT_VC, FORMAT_MSO_MDOC, FORMAT_VC_SD_JWT,
    },
    request::{
        sign_request_object, AuthenticationRequestParameters, ClientIdScheme, CreatedRequest,
        RelyingPartyMetadata, RequestMode, ResponseMode, ResponseType,
    },
    response::{
        AuthenticationResponseParameters, AuthnResponseOutcome, IdTokenClaims,
        PresentationResult, RevealedClaim,
    },
    store::{MapStore, NonceService},
    Result, SecondsSinceEpoch,
};

/// The default authorization endpoint of wallets, per the OpenID4VP custom URL scheme.
const WALLET_AUTHORIZE_URL: &str = "openid4vp://authorize";

/// The default time leeway, in seconds, for credential time predicates.
const DEFAULT_LEEWAY: SecondsSinceEpoch = 300;

/// An authorization response as received on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthnResponse {
    /// The redirect URL the wallet navigated to (`fragment` / `query` response modes).
    Redirect(String),

    /// An `application/x-www-form-urlencoded` POST body (`direct_post` modes, including the
    /// `response=<JWS-or-JWE>` member of `direct_post.jwt`).
    FormPost(String),
}

/// The OpenID4VP Verifier.
///
/// Owns the verifier key material, the `state` → request map and the single-use nonce
/// service; safe to share across concurrent protocol runs.
pub struct Openid4VpVerifier {
    scheme: ClientIdScheme,
    signer: SignerWithChain<Es256Signer>,
    wallet_authorize_url: String,
    state_to_request: MapStore<String, AuthenticationRequestParameters>,
    nonces: NonceService,
    issuer_trust: Option<X509Trust>,
    leeway: SecondsSinceEpoch,
}

fn default_signature_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
    (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
}

impl Openid4VpVerifier {
    /// Construct a verifier with the given client-identifier scheme and key material.
    ///
    /// For the `x509_san_dns` scheme the signer's certificate chain must carry a SAN dNSName
    /// equal to the configured DNS name; violating that is a usage error caught here rather
    /// than by every wallet later.
    pub fn new(scheme: ClientIdScheme, signer: SignerWithChain<Es256Signer>) -> Result<Self> {
        if let ClientIdScheme::CertificateSanDns { dns_name } = &scheme {
            use bh_jose::HasX5Chain as _;
            let san_names = signer
                .x5chain()
                .leaf_san_dns_names()
                .map_err(|_| {
                    Error::root(OpenId4VpError::UsageError(
                        "x509_san_dns requires a leaf certificate with SAN dNSName".to_owned(),
                    ))
                })?;

            if !san_names.iter().any(|name| name == dns_name) {
                return Err(Error::root(OpenId4VpError::UsageError(
                    "leaf certificate SAN dNSName does not match the configured client id"
                        .to_owned(),
                )));
            }
        }

        Ok(Self {
            scheme,
            signer,
            wallet_authorize_url: WALLET_AUTHORIZE_URL.to_owned(),
            state_to_request: MapStore::new(),
            nonces: NonceService::new(),
            issuer_trust: None,
            leeway: DEFAULT_LEEWAY,
        })
    }

    /// Restrict accepted credential issuers to the given trust anchors.
    pub fn with_issuer_trust(mut self, trust: X509Trust) -> Self {
        self.issuer_trust = Some(trust);
        self
    }

    /// The client identifier, in the newer scheme-prefixed form.
    pub fn client_id(&self) -> Result<String> {
        self.scheme.prefixed_client_id()
    }

    /// Construct an authorization request.
    ///
    /// The returned [`CreatedRequest`] carries the URL for the wallet and, for the
    /// by-reference modes, the body to serve at the `request_uri`.  A fresh `nonce` is
    /// recorded with the [`NonceService`], and the full parameters under the fresh `state` in
    /// the `state_to_request` map; both are consumed by response validation.
    pub fn create_authentication_request(
        &self,
        mode: RequestMode,
        response_type: ResponseType,
        presentation_definition: Option<PresentationDefinition>,
        response_mode: ResponseMode,
        destination_uri: &str,
    ) -> Result<CreatedRequest> {
        // the schemes mandating signed requests forbid the unsigned modes
        let signed_mode = matches!(
            mode,
            RequestMode::SignedByValue | RequestMode::SignedByReference { .. }
        );
        if self.scheme.requires_signed_request() && !signed_mode {
            return Err(Error::root(OpenId4VpError::UsageError(format!(
                "the {} scheme requires a signed request",
                self.scheme.scheme_name()
            ))));
        }
        if matches!(self.scheme, ClientIdScheme::CertificateSanDns { .. })
            && !response_mode.uses_response_uri()
        {
            return Err(Error::root(OpenId4VpError::UsageError(
                "x509_san_dns does not permit redirect-based response modes".to_owned(),
            )));
        }

        let nonce = self.nonces.create();
        let state = uuid::Uuid::new_v4().to_string();

        let (redirect_uri, response_uri) = if response_mode.uses_response_uri() {
            (None, Some(destination_uri.to_owned()))
        } else {
            (Some(destination_uri.to_owned()), None)
        };

        let client_metadata = (response_mode == ResponseMode::DirectPostJwt)
            .then(|| self.encryption_metadata())
            .transpose()?;

        let params = AuthenticationRequestParameters {
            response_type,
            client_id: self.scheme.prefixed_client_id()?,
            client_id_scheme: None,
            nonce,
            state: Some(state.clone()),
            response_mode: Some(response_mode),
            redirect_uri,
            response_uri,
            presentation_definition,
            client_metadata,
            client_metadata_uri: None,
        };

        self.state_to_request
            .put(state, params.clone())
            .map_err(|_| {
                Error::root(OpenId4VpError::UsageError(
                    "too many requests in flight".to_owned(),
                ))
            })?;

        self.render_request(mode, params)
    }

    /// Render the created parameters into the wire form of the chosen request mode.
    fn render_request(
        &self,
        mode: RequestMode,
        params: AuthenticationRequestParameters,
    ) -> Result<CreatedRequest> {
        let url_with = |query_pairs: &[(String, String)]| -> Result<String> {
            let query = serde_urlencoded::to_string(query_pairs)
                .foreign_err(|| OpenId4VpError::ParseError("query serialization".to_owned()))?;
            Ok(format!("{}?{}", self.wallet_authorize_url, query))
        };

        Ok(match mode {
            RequestMode::Query => CreatedRequest {
                url: url_with(&params.to_url_params()?)?,
                request_object: None,
            },
            RequestMode::ByReference { request_uri } => {
                let request_object = serde_json::to_string(&params)
                    .foreign_err(|| OpenId4VpError::ParseError("request serialization".to_owned()))?;
                CreatedRequest {
                    url: url_with(&[
                        ("client_id".to_owned(), params.client_id.clone()),
                        ("request_uri".to_owned(), request_uri),
                    ])?,
                    request_object: Some(request_object),
                }
            }
            RequestMode::SignedByValue => {
                let jar = sign_request_object(&params, &self.scheme, &self.signer)?;
                CreatedRequest {
                    url: url_with(&[
                        ("client_id".to_owned(), params.client_id.clone()),
                        ("request".to_owned(), jar),
                    ])?,
                    request_object: None,
                }
            }
            RequestMode::SignedByReference { request_uri } => {
                let jar = sign_request_object(&params, &self.scheme, &self.signer)?;
                CreatedRequest {
                    url: url_with(&[
                        ("client_id".to_owned(), params.client_id.clone()),
                        ("request_uri".to_owned(), request_uri),
                    ])?,
                    request_object: Some(jar),
                }
            }
        })
    }

    /// The metadata advertising this verifier's response-encryption key.
    fn encryption_metadata(&self) -> Result<RelyingPartyMetadata> {
        let mut jwk = self
            .signer
            .signer()
            .public_jwk()
            .map_err(|_| Error::root(OpenId4VpError::CryptoFailed))?;
        jwk.insert("use".to_owned(), "enc".into());
        jwk.insert("alg".to_owned(), "ECDH-ES".into());

        Ok(RelyingPartyMetadata {
            jwks: Some(JwkSet { keys: vec![jwk] }),
            vp_formats: None,
            authorization_encrypted_response_alg: Some("ECDH-ES".to_owned()),
            authorization_encrypted_response_enc: Some(ContentEncryptionAlgorithm::A256Gcm),
        })
    }

    /// Validate an authorization response.
    ///
    /// All failures are structured outcomes; no error escapes as a Rust error.  The state
    /// machine: parse → state lookup (consuming the stored request) → nonce consumption →
    /// branch on `id_token`/`vp_token` → per-descriptor verification → aggregation.
    pub async fn validate_authn_response(
        &self,
        response: AuthnResponse,
        current_time: SecondsSinceEpoch,
    ) -> AuthnResponseOutcome {
        // [RECV]
        let (params, mdoc_generated_nonce) = match self.parse_response(response) {
            Ok(parsed) => parsed,
            Err(err) => {
                return AuthnResponseOutcome::Error {
                    reason: err.to_string(),
                    state: None,
                }
            }
        };
        let state = params.state.clone();

        // [STATE-LOOKUP]: the stored request is consumed, fulfilling single-use semantics
        let Some(request) = state
            .as_ref()
            .and_then(|state| self.state_to_request.remove(state))
        else {
            return AuthnResponseOutcome::ValidationError {
                field: "state",
                state,
            };
        };

        // the request nonce is single-use as well
        if !self.nonces.verify_and_remove(&request.nonce) {
            return AuthnResponseOutcome::ValidationError {
                field: "nonce",
                state,
            };
        }

        // [RESP-TYPE-BRANCH]
        match request.response_type {
            ResponseType::IdToken => self.validate_id_token(&request, &params, state, current_time),
            ResponseType::VpToken | ResponseType::VpTokenIdToken => {
                self.validate_vp_token(&request, &params, state, mdoc_generated_nonce, current_time)
                    .await
            }
        }
    }

    /// Parse the wire response into parameters, unwrapping `direct_post.jwt` envelopes.
    ///
    /// Returns the parameters together with the `apu` of an encrypted response, i.e. the
    /// wallet-generated mdoc nonce.
    fn parse_response(
        &self,
        response: AuthnResponse,
    ) -> Result<(AuthenticationResponseParameters, Option<String>)> {
        let pairs: Vec<(String, String)> = match &response {
            AuthnResponse::Redirect(url) => {
                let url = url::Url::parse(url)
                    .foreign_err(|| OpenId4VpError::ParseError("invalid redirect URL".to_owned()))?;

                // fragment first, query second
                let encoded = url
                    .fragment()
                    .map(str::to_owned)
                    .or_else(|| url.query().map(str::to_owned))
                    .ok_or_else(|| {
                        Error::root(OpenId4VpError::ParseError(
                            "redirect URL carries no parameters".to_owned(),
                        ))
                    })?;

                serde_urlencoded::from_str(&encoded)
                    .foreign_err(|| OpenId4VpError::ParseError("invalid URL parameters".to_owned()))?
            }
            AuthnResponse::FormPost(body) => serde_urlencoded::from_str(body)
                .foreign_err(|| OpenId4VpError::ParseError("invalid form body".to_owned()))?,
        };

        // `direct_post.jwt` wraps the parameters into the `response` member
        if let Some((_, token)) = pairs.iter().find(|(key, _)| key == "response") {
            return self.unwrap_response_jwt(token);
        }

        Ok((
            AuthenticationResponseParameters::from_url_params(&pairs)?,
            None,
        ))
    }

    /// Unwrap a `direct_post.jwt` response: an ECDH-ES JWE encrypted to our key, or a plain
    /// signed JWT.
    fn unwrap_response_jwt(
        &self,
        token: &str,
    ) -> Result<(AuthenticationResponseParameters, Option<String>)> {
        if let Ok(jwe) = JweEncrypted::parse(token) {
            let apu = jwe
                .apu()
                .map_err(|_| {
                    Error::root(OpenId4VpError::ParseError("undecodable `apu`".to_owned()))
                })?
                .map(|apu| String::from_utf8_lossy(&apu).into_owned());

            let payload = jwe
                .decrypt(self.signer.signer().ec_key())
                .map_err(|_| Error::root(OpenId4VpError::CryptoFailed))?;

            let params = serde_json::from_slice(&payload).foreign_err(|| {
                OpenId4VpError::ParseError("decrypted response is not JSON".to_owned())
            })?;

            return Ok((params, apu));
        }

        // a signed (JWS) response: the payload carries the parameters directly
        let jws = JwsSigned::parse(token)
            .map_err(|_| Error::root(OpenId4VpError::ParseError("`response` is neither JWE nor JWS".to_owned())))?;

        let params = serde_json::from_slice(&jws.payload).foreign_err(|| {
            OpenId4VpError::ParseError("JWS response payload is not JSON".to_owned())
        })?;

        Ok((params, None))
    }

    /// The SIOPv2 `id_token` branch.
    fn validate_id_token(
        &self,
        request: &AuthenticationRequestParameters,
        params: &AuthenticationResponseParameters,
        state: Option<String>,
        current_time: SecondsSinceEpoch,
    ) -> AuthnResponseOutcome {
        let Some(id_token) = &params.id_token else {
            return AuthnResponseOutcome::ValidationError {
                field: "idToken",
                state,
            };
        };

        match self.verify_id_token(request, id_token, current_time) {
            Ok(claims) => AuthnResponseOutcome::SuccessIdToken {
                state,
                claims: Box::new(claims),
            },
            Err(_) => AuthnResponseOutcome::ValidationError {
                field: "idToken",
                state,
            },
        }
    }

    fn verify_id_token(
        &self,
        request: &AuthenticationRequestParameters,
        id_token: &str,
        current_time: SecondsSinceEpoch,
    ) -> Result<IdTokenClaims> {
        let invalid =
            |what: &str| Error::root(OpenId4VpError::InvalidStructure(what.to_owned()));

        // the key is self-contained: read the claims first, then verify with `sub_jwk`
        let jws = JwsSigned::parse(id_token)
            .map_err(|_| Error::root(OpenId4VpError::ParseError("unparseable id_token".to_owned())))?;
        let claims: IdTokenClaims = serde_json::from_slice(&jws.payload)
            .foreign_err(|| OpenId4VpError::ParseError("id_token payload".to_owned()))?;

        jws.verify_signature(&claims.sub_jwk, default_signature_verifier)
            .map_err(|_| Error::root(OpenId4VpError::InvalidSignature))?;

        if claims.iss != claims.sub {
            return Err(invalid("iss != sub"));
        }
        if claims.aud != request.client_id {
            return Err(invalid("aud"));
        }
        if claims.nonce != request.nonce {
            return Err(invalid("nonce"));
        }
        if claims.iat > current_time + self.leeway || current_time > claims.exp + self.leeway {
            return Err(Error::root(OpenId4VpError::ExpiredOrNotYetValid(
                current_time,
            )));
        }

        let thumbprint = jwk_sha256_thumbprint_bytes(claims.sub_jwk.clone())
            .map_err(|_| invalid("sub_jwk"))?;
        if claims.sub != bh_jose::base64_url_encode(thumbprint) {
            return Err(invalid("sub != thumbprint(sub_jwk)"));
        }

        Ok(claims)
    }

    /// The `vp_token` branch: per-descriptor dispatch & aggregation.
    async fn validate_vp_token(
        &self,
        request: &AuthenticationRequestParameters,
        params: &AuthenticationResponseParameters,
        state: Option<String>,
        mdoc_generated_nonce: Option<String>,
        current_time: SecondsSinceEpoch,
    ) -> AuthnResponseOutcome {
        let Some(vp_token) = &params.vp_token else {
            return AuthnResponseOutcome::ValidationError {
                field: "vpToken",
                state,
            };
        };
        let Some(submission) = &params.presentation_submission else {
            return AuthnResponseOutcome::ValidationError {
                field: "presentation_submission",
                state,
            };
        };
        if submission.descriptor_map.is_empty() {
            return AuthnResponseOutcome::ValidationError {
                field: "presentation_submission",
                state,
            };
        }

        // [FOR-EACH DESCRIPTOR]: failures stay per-descriptor, no short-circuiting
        let mut presentations = Vec::with_capacity(submission.descriptor_map.len());
        for descriptor in &submission.descriptor_map {
            let result = self
                .validate_descriptor(
                    request,
                    vp_token,
                    descriptor,
                    mdoc_generated_nonce.as_deref(),
                    current_time,
                )
                .await
                .unwrap_or_else(|err| PresentationResult::ValidationError {
                    descriptor_id: descriptor.id.clone(),
                    reason: err.to_string(),
                });
            presentations.push(result);
        }

        // [AGGREGATE]: a single failed descriptor *is* the result; among several, a failure
        // stays confined to its descriptor
        if presentations.len() == 1 && !presentations[0].is_success() {
            return AuthnResponseOutcome::ValidationError {
                field: "vpToken",
                state,
            };
        }

        AuthnResponseOutcome::Success {
            state,
            presentations,
        }
    }

    /// [VERIFY-FORMAT] for one descriptor of the submission.
    async fn validate_descriptor(
        &self,
        request: &AuthenticationRequestParameters,
        vp_token: &Value,
        descriptor: &PresentationSubmissionDescriptor,
        mdoc_generated_nonce: Option<&str>,
        current_time: SecondsSinceEpoch,
    ) -> Result<PresentationResult> {
        let token = evaluate_json_path(vp_token, &descriptor.cumulative_path())
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::root(OpenId4VpError::InvalidStructure(format!(
                    "no presentation at {}",
                    descriptor.cumulative_path()
                )))
            })?;

        match descriptor.effective_format() {
            FORMAT_JWT_VC | "jwt_vp" => self.verify_vc_jwt(descriptor, token, current_time),
            FORMAT_VC_SD_JWT | FORMAT_JWT_SD => {
                self.verify_sd_jwt(request, descriptor, token, current_time)
                    .await
            }
            FORMAT_MSO_MDOC => {
                self.verify_mdoc(request, descriptor, token, mdoc_generated_nonce, current_time)
            }
            other => Err(Error::root(OpenId4VpError::InvalidStructure(format!(
                "unsupported format {other}"
            )))),
        }
    }

    fn verify_vc_jwt(
        &self,
        descriptor: &PresentationSubmissionDescriptor,
        token: &str,
        current_time: SecondsSinceEpoch,
    ) -> Result<PresentationResult> {
        let vc = VcJwtClaims::verify(
            token,
            None,
            self.issuer_trust.as_ref(),
            None,
            current_time,
            self.leeway,
            default_signature_verifier,
        )
        .map_err(|err| Error::root(OpenId4VpError::InvalidStructure(err.to_string())))?;

        Ok(PresentationResult::VcJwt {
            descriptor_id: descriptor.id.clone(),
            credential_status: vc.vc.credential_status.clone(),
            vc: Box::new(vc),
            is_revoked: None,
        })
    }

    async fn verify_sd_jwt(
        &self,
        request: &AuthenticationRequestParameters,
        descriptor: &PresentationSubmissionDescriptor,
        token: &str,
        current_time: SecondsSinceEpoch,
    ) -> Result<PresentationResult> {
        let sd_jwt_kb: SdJwtKB = token
            .parse()
            .map_err(|_| Error::root(OpenId4VpError::ParseError("invalid SD-JWT+KB".to_owned())))?;

        let lookup = match &self.issuer_trust {
            Some(trust) => X5ChainLookup::new(trust.clone()),
            None => X5ChainLookup::unauthenticated(),
        };

        let verifier = bh_sd_jwt::verifier::Verifier::from_challenge(KeyBindingChallenge {
            aud: request.client_id.clone(),
            nonce: request.nonce.clone(),
        });

        let verified = verifier
            .verify(
                sd_jwt_kb,
                &lookup,
                current_time,
                default_hasher,
                default_signature_verifier,
            )
            .await
            .map_err(|err| Error::root(OpenId4VpError::InvalidStructure(err.to_string())))?;

        let disclosures = verified
            .disclosures
            .iter()
            .filter_map(|disclosure| {
                disclosure.claim_name().map(|name| RevealedClaim {
                    claim_name: name.to_owned(),
                    claim_value: disclosure.value().clone(),
                })
            })
            .collect();

        Ok(PresentationResult::SdJwt {
            descriptor_id: descriptor.id.clone(),
            claims: verified.claims.claims,
            disclosures,
        })
    }

    fn verify_mdoc(
        &self,
        request: &AuthenticationRequestParameters,
        descriptor: &PresentationSubmissionDescriptor,
        token: &str,
        mdoc_generated_nonce: Option<&str>,
        current_time: SecondsSinceEpoch,
    ) -> Result<PresentationResult> {
        let device_response = DeviceResponse::from_base64_cbor(token)
            .map_err(|err| Error::root(OpenId4VpError::ParseError(err.to_string())))?;

        // the handover transcript needs the response_uri; without one (redirect modes) the
        // legacy bare-challenge binding applies
        let response_uri = request.response_uri.clone().unwrap_or_default();

        let verifier = bh_mdoc::Verifier::from_parts(
            request.client_id.clone(),
            response_uri,
            request.nonce.clone(),
        );

        let documents = verifier
            .verify(
                device_response,
                current_time,
                mdoc_generated_nonce,
                self.issuer_trust.as_ref(),
                default_signature_verifier,
            )
            .map_err(|err| Error::root(OpenId4VpError::InvalidStructure(err.to_string())))?;

        Ok(PresentationResult::Iso {
            descriptor_id: descriptor.id.clone(),
            documents,
        })
    }

    /// Evaluate the revocation bits of every verified VC-JWT presentation of `outcome`
    /// against the provided (already fetched & verified) revocation list.
    ///
    /// Revocation is orthogonal to cryptographic validity: a revoked presentation stays a
    /// success with `is_revoked == Some(true)`.
    pub fn evaluate_revocation(outcome: &mut AuthnResponseOutcome, list: &RevocationList) {
        let AuthnResponseOutcome::Success { presentations, .. } = outcome else {
            return;
        };

        for presentation in presentations {
            if let PresentationResult::VcJwt {
                credential_status: Some(status),
                is_revoked,
                ..
            } = presentation
            {
                *is_revoked = Some(bh_vc_jwt::revocation::is_revoked(list, status));
            }
        }
    }
}
