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

use crate::SigningAlgorithm;

/// Error type for failures of the underlying cryptographic backend.
#[derive(strum_macros::Display, Debug, PartialEq, Eq, Clone)]
pub enum CryptoError {
    /// Error from the cryptographic backend that does not fit any other variant.
    #[strum(to_string = "Crypto backend failure")]
    CryptoBackend,

    /// Error indicating that the key generation failed.
    #[strum(to_string = "Key generation failed")]
    KeyGenerationFailed,

    /// Error indicating that the provided X.509 certificate chain is invalid.
    #[strum(to_string = "Invalid X.509 certificate chain")]
    InvalidX5Chain,

    /// Error indicating that the requested algorithm or key type is not supported.
    #[strum(to_string = "Unsupported: {0}")]
    Unsupported(String),

    /// Error indicating that the content encryption failed.
    #[strum(to_string = "Encryption failed")]
    EncryptionFailed,

    /// Error indicating that the content decryption failed.
    ///
    /// This includes an authentication-tag mismatch; the two cases are deliberately not
    /// distinguished.
    #[strum(to_string = "Decryption failed")]
    DecryptionFailed,
}

impl bherror::BhError for CryptoError {}

/// Error type for malformed JOSE structures.
#[derive(strum_macros::Display, Debug, PartialEq, Eq, Clone)]
pub enum FormatError {
    /// Error indicating that a JWK could not be parsed.
    #[strum(to_string = "JWK parsing failed: {0}")]
    JwkParsingFailed(String),

    /// Error indicating that a compact JWS serialization is malformed.
    #[strum(to_string = "Invalid compact JWS")]
    InvalidCompactJws,

    /// Error indicating that a compact JWE serialization is malformed.
    #[strum(to_string = "Invalid compact JWE: {0}")]
    InvalidCompactJwe(String),

    /// Error indicating that a JOSE header is malformed.
    #[strum(to_string = "Invalid JOSE header: {0}")]
    InvalidHeader(String),
}

impl bherror::BhError for FormatError {}

/// Error type for signature-related failures.
#[derive(strum_macros::Display, Debug, PartialEq, Eq, Clone)]
pub enum SignatureError {
    /// Error indicating that the `alg` value is unknown or not approved for use.
    #[strum(to_string = "Invalid signing algorithm {0}")]
    InvalidSigningAlgorithm(String),

    /// Error indicating that a JWS signature did not verify.
    #[strum(to_string = "Invalid JWS signature")]
    InvalidJwsSignature,

    /// Error indicating that the signing operation failed.
    #[strum(to_string = "Signing failed")]
    SigningFailed,

    /// Error indicating that no key reference in the header resolved to a verification key.
    #[strum(to_string = "Unknown signer key")]
    UnknownKey,

    /// Error indicating that no verifier implementation is available for the algorithm.
    #[strum(to_string = "Missing signature verifier for algorithm {0}")]
    MissingSignatureVerifier(SigningAlgorithm),
}

impl bherror::BhError for SignatureError {}
