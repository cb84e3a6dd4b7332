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

use std::str::FromStr;

use bh_x509::X5Chain;
use bherror::Error;
use serde::{Deserialize, Serialize};

use crate::{error::SignatureError, utils::BoxError, JwkPublic};

/// Signature algorithms approved for use with verifiable credentials.
///
/// Only JOSE asymmetric signature algorithms approved by SOG-IS ACM v1.2 are listed, with any
/// parameters (e.g. RSA modulus size) meeting therein imposed requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SigningAlgorithm {
    /// ECDSA over P-256 with SHA-256
    Es256,
    /// ECDSA over P-384 with SHA-384
    Es384,
    /// ECDSA over P-521 with SHA-512
    Es512,
    /// RSASSA-PSS with SHA-256 and MGF1 with SHA-256
    Ps256,
    /// RSASSA-PSS with SHA-384 and MGF1 with SHA-384
    Ps384,
    /// RSASSA-PSS with SHA-512 and MGF1 with SHA-512
    Ps512,
}

/// JWS `"alg"` header parameter value for **ECDSA using P-256 and SHA-256**, per [RFC 7518].
///
/// [RFC 7518]: https://datatracker.ietf.org/doc/html/rfc7518#section-3.1
pub const SIGNING_ALG_ES256: &str = "ES256";
/// JWS `"alg"` header parameter value for **ECDSA using P-384 and SHA-384**, per [RFC 7518].
///
/// [RFC 7518]: https://datatracker.ietf.org/doc/html/rfc7518#section-3.1
pub const SIGNING_ALG_ES384: &str = "ES384";
/// JWS `"alg"` header parameter value for **ECDSA using P-521 and SHA-512**, per [RFC 7518].
///
/// [RFC 7518]: https://datatracker.ietf.org/doc/html/rfc7518#section-3.1
pub const SIGNING_ALG_ES512: &str = "ES512";
/// JWS `"alg"` header parameter value for **RSASSA-PSS using SHA-256**, per [RFC 7518].
///
/// [RFC 7518]: https://datatracker.ietf.org/doc/html/rfc7518#section-3.1
pub const SIGNING_ALG_PS256: &str = "PS256";
/// JWS `"alg"` header parameter value for **RSASSA-PSS using SHA-384**, per [RFC 7518].
///
/// [RFC 7518]: https://datatracker.ietf.org/doc/html/rfc7518#section-3.1
pub const SIGNING_ALG_PS384: &str = "PS384";
/// JWS `"alg"` header parameter value for **RSASSA-PSS using SHA-512**, per [RFC 7518].
///
/// [RFC 7518]: https://datatracker.ietf.org/doc/html/rfc7518#section-3.1
pub const SIGNING_ALG_PS512: &str = "PS512";

impl FromStr for SigningAlgorithm {
    type Err = Error<SignatureError>;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            SIGNING_ALG_ES256 => Ok(SigningAlgorithm::Es256),
            SIGNING_ALG_ES384 => Ok(SigningAlgorithm::Es384),
            SIGNING_ALG_ES512 => Ok(SigningAlgorithm::Es512),
            SIGNING_ALG_PS256 => Ok(SigningAlgorithm::Ps256),
            SIGNING_ALG_PS384 => Ok(SigningAlgorithm::Ps384),
            SIGNING_ALG_PS512 => Ok(SigningAlgorithm::Ps512),
            _ => Err(Error::root(SignatureError::InvalidSigningAlgorithm(
                value.to_string(),
            ))),
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let message = match self {
            Self::Es256 => SIGNING_ALG_ES256,
            Self::Es384 => SIGNING_ALG_ES384,
            Self::Es512 => SIGNING_ALG_ES512,
            Self::Ps256 => SIGNING_ALG_PS256,
            Self::Ps384 => SIGNING_ALG_PS384,
            Self::Ps512 => SIGNING_ALG_PS512,
        };
        write!(f, "{}", message)
    }
}

impl From<SigningAlgorithm> for jwt::AlgorithmType {
    fn from(value: SigningAlgorithm) -> Self {
        match value {
            SigningAlgorithm::Es256 => Self::Es256,
            SigningAlgorithm::Es384 => Self::Es384,
            SigningAlgorithm::Es512 => Self::Es512,
            SigningAlgorithm::Ps256 => Self::Ps256,
            SigningAlgorithm::Ps384 => Self::Ps384,
            SigningAlgorithm::Ps512 => Self::Ps512,
        }
    }
}

/// An external signing backend, to be used for computing a JWS or COSE signature.
///
/// The output of the signer, regardless of the algorithm, must be a valid **JWS signature**,
/// i.e. raw `r||s` for the EC algorithms; see step 5 in [section 5.1 of RFC 7515][1].
///
/// [1]: https://www.rfc-editor.org/rfc/rfc7515.html#section-5.1
pub trait Signer {
    /// The algorithm this signer uses.  Must be a constant function.
    fn algorithm(&self) -> SigningAlgorithm;

    /// Produce a JWS signature as a byte array, not yet base64url-encoded.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, BoxError>;

    /// Return the public counterpart of the signing key as a JWK.
    fn public_jwk(&self) -> Result<JwkPublic, BoxError>;
}

/// Subtrait for [`Signer`]-s which have an associated JWK `kid` (Key ID) parameter.
///
/// See [section 4.5 of RFC 7517](https://datatracker.ietf.org/doc/html/rfc7517#section-4.5).
pub trait HasJwkKid: Signer {
    /// Return the `kid` parameter of the associated JWK.
    fn jwk_kid(&self) -> &str;
}

/// Subtrait for [`Signer`]-s which have an associated X.509 certificate chain.
pub trait HasX5Chain: Signer {
    /// Return the certificate chain whose leaf certifies the signing key.
    fn x5chain(&self) -> X5Chain;
}

/// An external backend for signature verification.
pub trait SignatureVerifier: Sync {
    /// The algorithm used for the signature verification.
    fn algorithm(&self) -> SigningAlgorithm;

    /// Verifies the signature of the message, against the provided public key.
    ///
    /// # Return
    /// `Ok(true)` if the signature is valid for the given message, `Ok(false)` if it isn't (but
    /// there was no issue with the verifier itself), and `Err(_)` when the verifier itself
    /// encounters an error for any other reason.
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &JwkPublic,
    ) -> Result<bool, BoxError>;
}

/// An external backend capable of signing JWTs.
///
/// This is an extension trait over [`Signer`]; prefer depending on this trait when writing code
/// which handles JWTs.  It is however not object safe; depend on [`Signer`] directly if you need
/// that.
pub trait JwtSigner: Signer {
    /// Utility function that delegates to [`jwt::SignWithKey`] while allowing proper propagation
    /// of errors from both the foreign trait and the [`Signer`].
    fn sign_jwt<UnsignedJwt, SignedJwt>(
        &self,
        unsigned_jwt: UnsignedJwt,
    ) -> Result<SignedJwt, BoxError>
    where
        UnsignedJwt: jwt::SignWithKey<SignedJwt>;
}

impl<S: Signer + ?Sized> JwtSigner for S {
    fn sign_jwt<UnsignedJwt, SignedJwt>(
        &self,
        unsigned_jwt: UnsignedJwt,
    ) -> Result<SignedJwt, BoxError>
    where
        UnsignedJwt: jwt::SignWithKey<SignedJwt>,
    {
        crate::utils::sign_jwt(unsigned_jwt, self)
    }
}

/// An external backend capable of verifying the signatures of JWTs.
///
/// This is an extension trait over [`SignatureVerifier`]; prefer depending on this trait when
/// writing code which handles JWTs.  It is however not object safe; depend on
/// [`SignatureVerifier`] directly if you need that.
pub trait JwtVerifier: SignatureVerifier {
    /// Utility function that delegates to [`jwt::VerifyWithKey`] while allowing proper
    /// propagation of errors from both the foreign trait and the [`SignatureVerifier`].
    fn verify_jwt_signature<UnverifiedJwt, VerifiedJwt>(
        &self,
        unverified_jwt: UnverifiedJwt,
        public_key: &JwkPublic,
    ) -> Result<VerifiedJwt, BoxError>
    where
        UnverifiedJwt: jwt::VerifyWithKey<VerifiedJwt>;
}

impl<V: SignatureVerifier + ?Sized> JwtVerifier for V {
    fn verify_jwt_signature<UnverifiedJwt, VerifiedJwt>(
        &self,
        unverified_jwt: UnverifiedJwt,
        public_key: &JwkPublic,
    ) -> Result<VerifiedJwt, BoxError>
    where
        UnverifiedJwt: jwt::VerifyWithKey<VerifiedJwt>,
    {
        crate::utils::verify_jwt_signature(unverified_jwt, self, public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_algorithms_serialize_correctly() {
        let cases = [
            (SigningAlgorithm::Es256, SIGNING_ALG_ES256),
            (SigningAlgorithm::Es384, SIGNING_ALG_ES384),
            (SigningAlgorithm::Es512, SIGNING_ALG_ES512),
            (SigningAlgorithm::Ps256, SIGNING_ALG_PS256),
            (SigningAlgorithm::Ps384, SIGNING_ALG_PS384),
            (SigningAlgorithm::Ps512, SIGNING_ALG_PS512),
        ];

        for (alg, alg_str) in cases {
            let serialized = serde_json::to_string(&alg).unwrap();
            assert_eq!(serialized, format!("\"{}\"", alg_str));

            let deserialized: SigningAlgorithm = serde_json::from_str(&serialized).unwrap();
            assert_eq!(alg, deserialized);

            assert_eq!(alg, SigningAlgorithm::from_str(alg_str).unwrap());
            assert_eq!(alg.to_string(), alg_str);
        }
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let err = SigningAlgorithm::from_str("none").unwrap_err();
        assert_eq!(
            err.error,
            SignatureError::InvalidSigningAlgorithm("none".to_string())
        );
    }
}
