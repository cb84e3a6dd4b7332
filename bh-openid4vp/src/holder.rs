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

//! The Holder (Wallet): credential storage, request parsing & authentication, and response
//! construction for every supported response mode.

use std::{collections::HashMap, future::Future};

use bh_jose::{
    Es256Signer, Es256Verifier, JweEncrypted, JwkSet, JwsHeader, JwsSigned, SignatureVerifier,
    Signer as _, SigningAlgorithm,
};
use bh_mdoc::models::{data_retrieval::common::RequestedElements, DocType, IssuerSigned};
use bh_sd_jwt::{default_hasher, holder::Holder as SdJwtHolder, KeyBindingChallenge};
use bh_x509::X509Trust;
use bherror::{traits::ForeignError as _, Error};
use rand::Rng;

use crate::{
    error::OpenId4VpError,
    pex::{
        InputDescriptor, PresentationSubmission, PresentationSubmissionDescriptor, FORMAT_JWT_SD,
        FORMAT_JWT_VC, FORMAT_MSO_MDOC, FORMAT_VC_SD_JWT,
    },
    request::{
        verify_request_object, AuthenticationRequestParameters, ResponseMode, ResponseType,
    },
    response::{AuthenticationResponseParameters, IdTokenClaims},
    verifier::AuthnResponse,
    Result, SecondsSinceEpoch,
};

/// Resolves `request_uri` references for the wallet.
///
/// Fetching is a suspension point of the protocol run; production implementations wrap an
/// HTTP client, tests serve canned objects (see [`StaticRequestUriClient`]).
pub trait RequestUriClient {
    /// Fetch the body served at `uri` (`application/oauth-authz-req+jwt` or plain JSON).
    fn get(&self, uri: &str) -> impl Future<Output = Result<String>>;
}

/// A [`RequestUriClient`] serving from a fixed in-memory table.
#[derive(Debug, Default)]
pub struct StaticRequestUriClient(pub HashMap<String, String>);

impl RequestUriClient for StaticRequestUriClient {
    async fn get(&self, uri: &str) -> Result<String> {
        self.0.get(uri).cloned().ok_or_else(|| {
            Error::root(OpenId4VpError::FetchError(format!("no content at {uri}")))
        })
    }
}

/// A credential held by the wallet, in one of the three supported representations.
pub enum HeldCredential {
    /// A W3C VC-JWT in its compact serialization.
    VcJwt {
        /// The compact VC-JWT.
        compact: String,
    },

    /// An imported SD-JWT credential, able to derive selective presentations.
    SdJwt(Box<SdJwtHolder>),

    /// An ISO mdoc: the issuer-signed part plus its document type.
    Mdoc {
        /// The issuer-signed structure.
        issuer_signed: IssuerSigned,
        /// The document type, e.g. `org.iso.18013.5.1.mDL`.
        doc_type: DocType,
    },
}

/// What the wallet produced for a request: the response and where to deliver it.
#[derive(Debug)]
pub struct WalletResponse {
    /// The `redirect_uri` to navigate to, or the `response_uri` to POST to.
    pub destination: String,

    /// The wire response.
    pub response: AuthnResponse,
}

/// The Holder agent.
pub struct Wallet {
    key: Es256Signer,
    credentials: Vec<HeldCredential>,
    request_trust: Option<X509Trust>,
}

fn default_signature_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
    (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
}

impl Wallet {
    /// A wallet owning the given holder key and no credentials.
    pub fn new(key: Es256Signer) -> Self {
        Self {
            key,
            credentials: Vec::new(),
            request_trust: None,
        }
    }

    /// Require signed request objects to chain up to the given trust anchors.
    pub fn with_request_trust(mut self, trust: X509Trust) -> Self {
        self.request_trust = Some(trust);
        self
    }

    /// The holder's public key.
    pub fn public_jwk(&self) -> Result<bh_jose::JwkPublic> {
        self.key
            .public_jwk()
            .map_err(|_| Error::root(OpenId4VpError::CryptoFailed))
    }

    /// The holder's signing key, for issuance flows binding credentials to this wallet.
    pub fn key(&self) -> &Es256Signer {
        &self.key
    }

    /// Store a credential.
    pub fn store(&mut self, credential: HeldCredential) {
        self.credentials.push(credential);
    }

    /// Parse an authorization request URL, resolving and authenticating `request`/`request_uri`
    /// objects.
    ///
    /// Signed request objects are verified including the scheme rules (SAN dNSName equality
    /// for `x509_san_dns`) and, when configured, the request trust anchors.
    pub async fn parse_authorization_request<C: RequestUriClient>(
        &self,
        url: &str,
        client: &C,
        current_time: SecondsSinceEpoch,
    ) -> Result<AuthenticationRequestParameters> {
        let url = url::Url::parse(url)
            .foreign_err(|| OpenId4VpError::ParseError("invalid authorization URL".to_owned()))?;

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let find = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        // signed request by value
        if let Some(jar) = find("request") {
            return verify_request_object(
                &jar,
                self.request_trust.as_ref(),
                default_signature_verifier,
                current_time,
            );
        }

        // request by reference: fetch, then decide signed vs. plain by shape
        if let Some(request_uri) = find("request_uri") {
            let body = client.get(&request_uri).await?;

            if body.trim_start().starts_with('{') {
                return serde_json::from_str(&body).foreign_err(|| {
                    OpenId4VpError::ParseError("request object is not a request".to_owned())
                });
            }

            return verify_request_object(
                &body,
                self.request_trust.as_ref(),
                default_signature_verifier,
                current_time,
            );
        }

        // plain query parameters
        AuthenticationRequestParameters::from_url_params(&pairs)
    }

    /// Build the authorization response for a parsed request.
    ///
    /// One presentation is built per input descriptor, chosen by format; the response is
    /// rendered for the request's response mode, encrypting with the verifier's key for
    /// `direct_post.jwt` (and carrying the wallet-generated mdoc nonce in the JWE `apu`).
    pub fn create_authentication_response<R: Rng + ?Sized>(
        &self,
        request: &AuthenticationRequestParameters,
        current_time: SecondsSinceEpoch,
        rng: &mut R,
    ) -> Result<WalletResponse> {
        let response_mode = request.response_mode.unwrap_or(ResponseMode::Fragment);

        // `direct_post.jwt` responses are encrypted; the handover binding then applies
        let mdoc_generated_nonce = (response_mode == ResponseMode::DirectPostJwt)
            .then(|| bh_mdoc::generate_nonce(rng));

        let mut params = AuthenticationResponseParameters {
            state: request.state.clone(),
            ..Default::default()
        };

        if matches!(
            request.response_type,
            ResponseType::IdToken | ResponseType::VpTokenIdToken
        ) {
            params.id_token = Some(self.build_id_token(request, current_time)?);
        }

        if matches!(
            request.response_type,
            ResponseType::VpToken | ResponseType::VpTokenIdToken
        ) {
            let definition = request.presentation_definition.as_ref().ok_or_else(|| {
                Error::root(OpenId4VpError::InvalidStructure(
                    "vp_token requested without a presentation_definition".to_owned(),
                ))
            })?;
            if definition.input_descriptors.is_empty() {
                return Err(Error::root(OpenId4VpError::InvalidStructure(
                    "presentation_definition without input descriptors".to_owned(),
                )));
            }

            let mut tokens = Vec::new();
            let mut descriptor_map = Vec::new();
            let multiple = definition.input_descriptors.len() > 1;

            for (index, descriptor) in definition.input_descriptors.iter().enumerate() {
                let (format, token) = self.present_for_descriptor(
                    request,
                    descriptor,
                    mdoc_generated_nonce.as_deref(),
                    current_time,
                )?;

                descriptor_map.push(PresentationSubmissionDescriptor {
                    id: descriptor.id.clone(),
                    format: format.to_owned(),
                    path: if multiple {
                        format!("$[{index}]")
                    } else {
                        "$".to_owned()
                    },
                    path_nested: None,
                });
                tokens.push(serde_json::Value::String(token));
            }

            params.vp_token = Some(if multiple {
                serde_json::Value::Array(tokens)
            } else {
                tokens.remove(0)
            });
            params.presentation_submission = Some(PresentationSubmission {
                id: uuid::Uuid::new_v4().to_string(),
                definition_id: definition.id.clone(),
                descriptor_map,
            });
        }

        self.render_response(request, params, response_mode, mdoc_generated_nonce)
    }

    /// Choose a held credential for the descriptor and build its presentation.
    fn present_for_descriptor(
        &self,
        request: &AuthenticationRequestParameters,
        descriptor: &InputDescriptor,
        mdoc_generated_nonce: Option<&str>,
        current_time: SecondsSinceEpoch,
    ) -> Result<(&'static str, String)> {
        let formats = descriptor.formats();

        let no_match =
            || Error::root(OpenId4VpError::NoMatchingCredential(descriptor.id.clone()));

        for credential in &self.credentials {
            match credential {
                HeldCredential::VcJwt { compact } if formats.contains(&FORMAT_JWT_VC) => {
                    return Ok((FORMAT_JWT_VC, compact.clone()));
                }

                HeldCredential::SdJwt(holder)
                    if formats.contains(&FORMAT_VC_SD_JWT) || formats.contains(&FORMAT_JWT_SD) =>
                {
                    let claim_names = descriptor_claim_names(descriptor);
                    let claim_names: Vec<&str> =
                        claim_names.iter().map(String::as_str).collect();

                    let presentation = holder
                        .present(
                            &claim_names,
                            KeyBindingChallenge {
                                aud: request.client_id.clone(),
                                nonce: request.nonce.clone(),
                            },
                            current_time,
                            &self.key,
                            default_hasher,
                        )
                        .map_err(|err| {
                            Error::root(OpenId4VpError::InvalidStructure(err.to_string()))
                        })?;

                    return Ok((FORMAT_VC_SD_JWT, presentation.to_string()));
                }

                HeldCredential::Mdoc {
                    issuer_signed,
                    doc_type,
                } if formats.contains(&FORMAT_MSO_MDOC) => {
                    let token = self.present_mdoc(
                        request,
                        descriptor,
                        issuer_signed,
                        doc_type,
                        mdoc_generated_nonce,
                        current_time,
                    )?;
                    return Ok((FORMAT_MSO_MDOC, token));
                }

                _ => continue,
            }
        }

        Err(no_match())
    }

    fn present_mdoc(
        &self,
        request: &AuthenticationRequestParameters,
        descriptor: &InputDescriptor,
        issuer_signed: &IssuerSigned,
        doc_type: &DocType,
        mdoc_generated_nonce: Option<&str>,
        current_time: SecondsSinceEpoch,
    ) -> Result<String> {
        // the constraint paths follow the `$['namespace']['element']` convention
        let mut requested = RequestedElements::default();
        if let Some(fields) = descriptor
            .constraints
            .as_ref()
            .and_then(|constraints| constraints.fields.as_ref())
        {
            for field in fields {
                if let Some(segments) = field.claim_path_segments() {
                    if let [name_space, element] = segments.as_slice() {
                        requested.add(name_space.clone(), element.clone());
                    }
                }
            }
        }

        let session = match mdoc_generated_nonce {
            Some(mdoc_generated_nonce) => {
                let response_uri = request.response_uri.as_deref().ok_or_else(|| {
                    Error::root(OpenId4VpError::InvalidStructure(
                        "encrypted mdoc presentation without a response_uri".to_owned(),
                    ))
                })?;

                bh_mdoc::models::SessionBinding::Oid4vpHandover {
                    client_id: &request.client_id,
                    response_uri,
                    nonce: &request.nonce,
                    mdoc_generated_nonce,
                }
            }
            None => bh_mdoc::models::SessionBinding::BareNonce {
                nonce: &request.nonce,
            },
        };

        let device_response = bh_mdoc::Device
            .present(
                issuer_signed.clone(),
                doc_type.clone(),
                &requested,
                &session,
                &self.key,
                current_time,
            )
            .map_err(|err| Error::root(OpenId4VpError::InvalidStructure(err.to_string())))?;

        device_response
            .to_base64_cbor()
            .map_err(|_| Error::root(OpenId4VpError::CryptoFailed))
    }

    fn build_id_token(
        &self,
        request: &AuthenticationRequestParameters,
        current_time: SecondsSinceEpoch,
    ) -> Result<String> {
        let claims = IdTokenClaims::new_self_issued(
            self.public_jwk()?,
            request.client_id.clone(),
            request.nonce.clone(),
            current_time,
        )?;

        let header = JwsHeader {
            alg: self.key.algorithm(),
            typ: Some("JWT".to_owned()),
            jwk: None,
            kid: None,
            x5c: None,
            jku: None,
            jwt: None,
        };

        let payload =
            serde_json::to_vec(&claims).foreign_err(|| OpenId4VpError::CryptoFailed)?;

        Ok(JwsSigned::sign(header, &payload, &self.key)
            .map_err(|_| Error::root(OpenId4VpError::CryptoFailed))?
            .serialize_compact())
    }

    /// Render the parameters for the request's response mode.
    fn render_response(
        &self,
        request: &AuthenticationRequestParameters,
        params: AuthenticationResponseParameters,
        response_mode: ResponseMode,
        mdoc_generated_nonce: Option<String>,
    ) -> Result<WalletResponse> {
        let destination = if response_mode.uses_response_uri() {
            request.response_uri.clone()
        } else {
            request.redirect_uri.clone()
        }
        .ok_or_else(|| {
            Error::root(OpenId4VpError::InvalidStructure(
                "request carries no destination URI".to_owned(),
            ))
        })?;

        let encoded_params = serde_urlencoded::to_string(params.to_url_params()?)
            .foreign_err(|| OpenId4VpError::ParseError("response serialization".to_owned()))?;

        let response = match response_mode {
            ResponseMode::Fragment => {
                AuthnResponse::Redirect(format!("{destination}#{encoded_params}"))
            }
            ResponseMode::Query => {
                AuthnResponse::Redirect(format!("{destination}?{encoded_params}"))
            }
            ResponseMode::DirectPost => AuthnResponse::FormPost(encoded_params),
            ResponseMode::DirectPostJwt => {
                let jwe = self.encrypt_response(request, &params, mdoc_generated_nonce)?;
                AuthnResponse::FormPost(
                    serde_urlencoded::to_string([("response", jwe)])
                        .foreign_err(|| OpenId4VpError::ParseError("response serialization".to_owned()))?,
                )
            }
        };

        Ok(WalletResponse {
            destination,
            response,
        })
    }

    /// Encrypt the response parameters to the verifier's advertised key; the wallet-generated
    /// mdoc nonce travels in the `apu` header, the request nonce in `apv`.
    fn encrypt_response(
        &self,
        request: &AuthenticationRequestParameters,
        params: &AuthenticationResponseParameters,
        mdoc_generated_nonce: Option<String>,
    ) -> Result<String> {
        let metadata = request.client_metadata.as_ref().ok_or_else(|| {
            Error::root(OpenId4VpError::InvalidStructure(
                "direct_post.jwt without client_metadata".to_owned(),
            ))
        })?;

        let recipient_jwk = metadata
            .jwks
            .as_ref()
            .and_then(JwkSet::encryption_key)
            .ok_or_else(|| {
                Error::root(OpenId4VpError::InvalidStructure(
                    "client_metadata without an encryption key".to_owned(),
                ))
            })?;

        let enc = metadata
            .authorization_encrypted_response_enc
            .unwrap_or(bh_jose::ContentEncryptionAlgorithm::A256Gcm);

        let payload =
            serde_json::to_vec(params).foreign_err(|| OpenId4VpError::CryptoFailed)?;

        let jwe = JweEncrypted::encrypt(
            &payload,
            recipient_jwk,
            enc,
            mdoc_generated_nonce.as_deref().map(str::as_bytes),
            Some(request.nonce.as_bytes()),
        )
        .map_err(|_| Error::root(OpenId4VpError::CryptoFailed))?;

        Ok(jwe.serialize_compact())
    }
}

/// The claim names a descriptor's constraint fields select, for SD-JWT presentations: the
/// last segment of each field path.
fn descriptor_claim_names(descriptor: &InputDescriptor) -> Vec<String> {
    descriptor
        .constraints
        .as_ref()
        .and_then(|constraints| constraints.fields.as_ref())
        .map(|fields| {
            fields
                .iter()
                .filter_map(|field| field.claim_path_segments()?.last().cloned())
                .collect()
        })
        .unwrap_or_default()
}
