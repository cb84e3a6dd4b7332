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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides functions and types for working with [JSON Web Signatures (JWS)][1] and
//! [JSON Web Encryption (JWE)][2].
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc7515
//! [2]: https://datatracker.ietf.org/doc/html/rfc7516
//!
//! # Details
//!
//! Signing and verification go through the [`Signer`] and [`SignatureVerifier`] traits, so the
//! cryptographic backend stays replaceable.  The default [`openssl`] backed implementation is
//! available as [`Es256Signer`] / [`Es256Verifier`].
//!
//! On top of the traits, the crate offers:
//!
//! * [`JwsSigned`] -- a parsed compact JWS with signing-input preservation and signer-key
//!   resolution in the `jwk` → `x5c` → `kid` priority order;
//! * [`JweEncrypted`] -- ECDH-ES JWE with Concat-KDF key agreement ([RFC 7518, section
//!   4.6][3]), supporting the `A…GCM` and `A…CBC-HS…` content-encryption families;
//! * the [`JwtSigner`] / [`JwtVerifier`] extension traits adapting the [`jwt`] crate's
//!   `Token` machinery to our [`Signer`] / [`SignatureVerifier`] backends.
//!
//! [3]: https://datatracker.ietf.org/doc/html/rfc7518#section-4.6

mod openssl_impl;

mod error;
mod jwe;
mod jwk;
mod jws;
mod traits;
mod utils;

pub use error::*;
pub use jwe::*;
pub use jwk::*;
pub use jws::*;
// Re-export the `jwt` crate
pub use jwt;
pub use openssl_impl::*;
pub use traits::*;
pub use utils::*;

/// Helper macro with the same syntax as [`serde_json::json`] specialized for constructing JSON
/// objects.
///
/// It will construct a more specific type ([`serde_json::Map<String,Value>`]) than just
/// [`serde_json::Value`] when constructing an object, and panic if the syntax is valid JSON but
/// not an object.
#[macro_export]
macro_rules! json_object {
    ($stuff:tt) => {
        match ::serde_json::json!($stuff) {
            ::serde_json::Value::Object(o) => o,
            _ => unreachable!("JSON literal wasn't an object"),
        }
    };
}
