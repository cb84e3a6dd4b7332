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

//! Compact JWS ([RFC 7515][1]) construction, parsing & verification.
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc7515

use bh_x509::{JwtX5Chain, X509Trust, X5Chain};
use bherror::{
    traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _, PropagateError as _},
    Error,
};
use serde::{Deserialize, Serialize};

use crate::{
    base64_url_decode, base64_url_encode, construct_jws_payload, error::FormatError,
    public_jwk_from_x5chain_leaf, HasJwkKid, HasX5Chain, JwkPublic, SignatureError,
    SignatureVerifier, Signer, SigningAlgorithm,
};

/// The JOSE header of a [`JwsSigned`].
///
/// At most one of the `{jwk, kid, x5c}` key references SHOULD be present; verifiers resolve the
/// signer key in that priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Algorithm used to sign the payload.
    pub alg: SigningAlgorithm,

    /// Media type of the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// The public JWK of the signer, embedded directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<JwkPublic>,

    /// Identifier of the signing key, to be resolved by the recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Certificate chain whose leaf certifies the signing key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<JwtX5Chain>,

    /// URI of a JWK Set containing the signing key.  Never emitted by us; accepted on parse for
    /// interoperability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jku: Option<String>,

    /// A Verifier Attestation JWT, as used by the `verifier_attestation` client identifier
    /// scheme of OpenID4VP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
}

impl JwsHeader {
    fn bare(alg: SigningAlgorithm, typ: Option<&str>) -> Self {
        Self {
            alg,
            typ: typ.map(str::to_owned),
            jwk: None,
            kid: None,
            x5c: None,
            jku: None,
            jwt: None,
        }
    }

    /// Header with the signer's public JWK embedded.
    pub fn with_jwk(signer: &impl Signer, typ: Option<&str>) -> bherror::Result<Self, SignatureError> {
        let jwk = signer
            .public_jwk()
            .foreign_boxed_err(|| SignatureError::SigningFailed)
            .ctx(|| "signer cannot produce its public JWK")?;

        let mut header = Self::bare(signer.algorithm(), typ);
        header.jwk = Some(jwk);
        Ok(header)
    }

    /// Header referencing the signing key by its `kid`.
    pub fn with_kid(signer: &(impl Signer + HasJwkKid), typ: Option<&str>) -> Self {
        let mut header = Self::bare(signer.algorithm(), typ);
        header.kid = Some(signer.jwk_kid().to_owned());
        header
    }

    /// Header carrying the signer's certificate chain.
    pub fn with_x5chain(
        signer: &(impl Signer + HasX5Chain),
        typ: Option<&str>,
    ) -> bherror::Result<Self, SignatureError> {
        let x5c = signer
            .x5chain()
            .try_into()
            .with_err(|| SignatureError::SigningFailed)
            .ctx(|| "invalid signer X.509 certificate chain")?;

        let mut header = Self::bare(signer.algorithm(), typ);
        header.x5c = Some(x5c);
        Ok(header)
    }
}

/// A signed compact JWS.
///
/// Invariant: the preserved signing input equals
/// `base64url(header_json) || "." || base64url(payload)`, byte for byte, also when parsed from a
/// third-party serialization whose header JSON we would not reproduce ourselves.
#[derive(Debug, Clone, PartialEq)]
pub struct JwsSigned {
    /// The parsed protected header.
    pub header: JwsHeader,
    /// The raw payload bytes.
    pub payload: Vec<u8>,
    /// The raw signature bytes.
    pub signature: Vec<u8>,
    /// `b64u(header).b64u(payload)`, preserved for verification.
    signing_input: String,
}

/// An injected resolver of `kid` key references.
pub trait PublicKeyLookup {
    /// Return the public JWK for the given `kid`, if known.
    fn lookup(&self, kid: &str) -> Option<JwkPublic>;
}

impl JwsSigned {
    /// Sign `payload` under the provided `header` and return the assembled JWS.
    pub fn sign(
        header: JwsHeader,
        payload: &[u8],
        signer: &impl Signer,
    ) -> bherror::Result<Self, SignatureError> {
        debug_assert_eq!(header.alg, signer.algorithm());

        let header_json = serde_json::to_string(&header)
            .foreign_err(|| SignatureError::SigningFailed)
            .ctx(|| "header serialization failed")?;

        let signing_input =
            construct_jws_payload(&base64_url_encode(header_json), &base64_url_encode(payload));

        let signature = signer
            .sign(signing_input.as_bytes())
            .foreign_boxed_err(|| SignatureError::SigningFailed)?;

        Ok(Self {
            header,
            payload: payload.to_vec(),
            signature,
            signing_input,
        })
    }

    /// Parse a compact JWS serialization.
    ///
    /// No verification whatsoever is performed; the signature remains to be checked via
    /// [`JwsSigned::verify_signature`].
    pub fn parse(compact: &str) -> bherror::Result<Self, FormatError> {
        let mut parts = compact.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::root(FormatError::InvalidCompactJws));
        };

        let header_json = base64_url_decode(header_b64)
            .foreign_err(|| FormatError::InvalidCompactJws)
            .ctx(|| "header is not base64url")?;
        let header: JwsHeader = serde_json::from_slice(&header_json)
            .foreign_err(|| FormatError::InvalidHeader("not a valid JWS header".to_owned()))?;

        let payload = base64_url_decode(payload_b64)
            .foreign_err(|| FormatError::InvalidCompactJws)
            .ctx(|| "payload is not base64url")?;
        let signature = base64_url_decode(signature_b64)
            .foreign_err(|| FormatError::InvalidCompactJws)
            .ctx(|| "signature is not base64url")?;

        Ok(Self {
            header,
            payload,
            signature,
            signing_input: construct_jws_payload(header_b64, payload_b64),
        })
    }

    /// Serialize into the compact form `b64u(header).b64u(payload).b64u(signature)`.
    pub fn serialize_compact(&self) -> String {
        format!("{}.{}", self.signing_input, base64_url_encode(&self.signature))
    }

    /// The exact bytes the signature was computed over.
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }

    /// Resolve the signer's public key from the header key references, in the `jwk` → `x5c` →
    /// `kid` priority order.
    ///
    /// When the key arrives via `x5c` and a [`X509Trust`] is provided, the chain is verified
    /// against the trust anchors first; without a trust set the leaf key is accepted as-is.
    pub fn resolve_signer_key(
        &self,
        kid_lookup: Option<&dyn PublicKeyLookup>,
        trust: Option<&X509Trust>,
    ) -> bherror::Result<JwkPublic, SignatureError> {
        if let Some(jwk) = &self.header.jwk {
            return Ok(jwk.clone());
        }

        if let Some(x5c) = &self.header.x5c {
            let chain: X5Chain = x5c
                .clone()
                .try_into()
                .with_err(|| SignatureError::UnknownKey)
                .ctx(|| "unparseable `x5c` chain")?;

            if let Some(trust) = trust {
                trust
                    .verify(&chain)
                    .with_err(|| SignatureError::UnknownKey)
                    .ctx(|| "`x5c` chain not trusted")?;
            }

            return public_jwk_from_x5chain_leaf(&chain, &self.header.alg, None)
                .with_err(|| SignatureError::UnknownKey)
                .ctx(|| "no usable key in `x5c` leaf");
        }

        if let (Some(kid), Some(lookup)) = (&self.header.kid, kid_lookup) {
            if let Some(jwk) = lookup.lookup(kid) {
                return Ok(jwk);
            }
        }

        Err(Error::root(SignatureError::UnknownKey))
    }

    /// Verify the signature against the provided public key.
    pub fn verify_signature<'a>(
        &self,
        public_key: &JwkPublic,
        get_signature_verifier: impl FnOnce(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> bherror::Result<(), SignatureError> {
        let alg = self.header.alg;
        let verifier = get_signature_verifier(alg)
            .ok_or_else(|| Error::root(SignatureError::MissingSignatureVerifier(alg)))?;

        let valid = verifier
            .verify(self.signing_input(), &self.signature, public_key)
            .foreign_boxed_err(|| SignatureError::InvalidJwsSignature)
            .ctx(|| "error while verifying signature")?;

        if !valid {
            return Err(Error::root(SignatureError::InvalidJwsSignature));
        }

        Ok(())
    }

    /// Resolve the signer key and verify the signature with it, returning the resolved key.
    pub fn verify<'a>(
        &self,
        kid_lookup: Option<&dyn PublicKeyLookup>,
        trust: Option<&X509Trust>,
        get_signature_verifier: impl FnOnce(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> bherror::Result<JwkPublic, SignatureError> {
        let public_key = self.resolve_signer_key(kid_lookup, trust)?;
        self.verify_signature(&public_key, get_signature_verifier)?;
        Ok(public_key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{Es256Signer, Es256Verifier, SignerWithChain};

    struct MapLookup(HashMap<String, JwkPublic>);

    impl PublicKeyLookup for MapLookup {
        fn lookup(&self, kid: &str) -> Option<JwkPublic> {
            self.0.get(kid).cloned()
        }
    }

    fn get_verifier(alg: SigningAlgorithm) -> Option<&'static dyn SignatureVerifier> {
        (alg == SigningAlgorithm::Es256).then_some(&Es256Verifier)
    }

    #[test]
    fn sign_parse_verify_with_embedded_jwk() {
        let signer = Es256Signer::generate("kid-1".to_owned()).unwrap();
        let header = JwsHeader::with_jwk(&signer, Some("JWT")).unwrap();

        let jws = JwsSigned::sign(header, b"{\"hello\":\"world\"}", &signer).unwrap();
        let compact = jws.serialize_compact();

        let parsed = JwsSigned::parse(&compact).unwrap();
        assert_eq!(parsed, jws);

        let key = parsed.verify(None, None, get_verifier).unwrap();
        assert_eq!(key, signer.public_jwk().unwrap());
    }

    #[test]
    fn verify_with_kid_lookup() {
        let signer = Es256Signer::generate("kid-2".to_owned()).unwrap();
        let header = JwsHeader::with_kid(&signer, None);

        let jws = JwsSigned::sign(header, b"payload", &signer).unwrap();

        let lookup = MapLookup(
            [("kid-2".to_owned(), signer.public_jwk().unwrap())]
                .into_iter()
                .collect(),
        );

        jws.verify(Some(&lookup), None, get_verifier).unwrap();

        // an empty lookup leaves the key unresolved
        let empty = MapLookup(HashMap::new());
        let err = jws.verify(Some(&empty), None, get_verifier).unwrap_err();
        assert_eq!(err.error, SignatureError::UnknownKey);
    }

    #[test]
    fn verify_with_x5chain_and_trust() {
        let signer = SignerWithChain::generate("kid-3".to_owned(), "unit-test", None).unwrap();
        let header = JwsHeader::with_x5chain(&signer, None).unwrap();

        let jws = JwsSigned::sign(header, b"payload", &signer).unwrap();

        // trusting the (self-signed) leaf passes
        let trust = X509Trust::new(vec![signer.x5chain().leaf_certificate().clone()]);
        jws.verify(None, Some(&trust), get_verifier).unwrap();

        // an empty trust set fails with UnknownKey
        let no_trust = X509Trust::new(vec![]);
        let err = jws.verify(None, Some(&no_trust), get_verifier).unwrap_err();
        assert_eq!(err.error, SignatureError::UnknownKey);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = Es256Signer::generate("kid-4".to_owned()).unwrap();
        let header = JwsHeader::with_jwk(&signer, None).unwrap();
        let jws = JwsSigned::sign(header, b"payload", &signer).unwrap();

        let compact = jws.serialize_compact();
        let mut parts: Vec<&str> = compact.split('.').collect();
        let forged_payload = base64_url_encode(b"payload!");
        parts[1] = &forged_payload;
        let forged = parts.join(".");

        let parsed = JwsSigned::parse(&forged).unwrap();
        let err = parsed.verify(None, None, get_verifier).unwrap_err();
        assert_eq!(err.error, SignatureError::InvalidJwsSignature);
    }

    #[test]
    fn missing_verifier_is_reported() {
        let signer = Es256Signer::generate("kid-5".to_owned()).unwrap();
        let header = JwsHeader::with_jwk(&signer, None).unwrap();
        let jws = JwsSigned::sign(header, b"payload", &signer).unwrap();

        let err = jws.verify(None, None, |_| None).unwrap_err();
        assert_eq!(
            err.error,
            SignatureError::MissingSignatureVerifier(SigningAlgorithm::Es256)
        );
    }

    #[test]
    fn garbage_is_not_a_jws() {
        assert!(JwsSigned::parse("garbage").is_err());
        assert!(JwsSigned::parse("a.b").is_err());
        assert!(JwsSigned::parse("a.b.c.d").is_err());
    }
}
