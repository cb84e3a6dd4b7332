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

//! This crate implements Selective Disclosure JSON Web Tokens.
//!
//! It provides functionality to create, sign, and verify JWTs that support selective disclosure
//! of claims, in accordance with the IETF drafts: [Selective Disclosure for JWTs (SD-JWT)][1] &
//! [SD-JWT-based Verifiable Credentials (SD-JWT VC)][2].
//!
//! [1]: <https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt>
//! [2]: <https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc>
//!
//! # Details
//!
//! The main components of this crate are the following.
//!
//! * [`issuer`] -- Constructs and signs JWTs with selectively disclosable claims.
//! * [`holder`] -- Imports and presents SD-JWT credentials with a Key Binding JWT.
//! * [`verifier`] -- Validates JWT signatures, disclosure integrity, and key binding.
//! * [`lookup`] -- Resolution of the issuer's public key.

// Re-export the `bh-jose` crate
pub use bh_jose;
pub use error::{DecodingError, Error, FormatError, Result, SignatureError};

mod decoder;
mod encoder;
mod error;
mod key_binding;
mod models;
mod sd_jwt;
mod traits;
mod utils;

pub mod holder;
pub mod issuer;
pub mod lookup;
pub mod verifier;

pub use encoder::{DisplayWrapper, JsonNodePath, JsonNodePathSegment};
pub use iref;
pub use issuer::{IssuedSdJwt, Issuer, IssuerJwt, IssuerJwtHeader};
pub use key_binding::{KBError, KeyBindingChallenge};
pub use models::*;
pub use sd_jwt::SdJwtKB;
pub use traits::*;

/// Number of seconds since the UNIX epoch.
pub type SecondsSinceEpoch = u64;

/// A JSON object.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Shorthand re-export for JSON values.
pub use serde_json::Value;

/// Convert a JSON [`Value`] known to be an object into a [`JsonObject`].
///
/// # Panics
/// Panics if the value is not an object; only call on values produced by serializing a struct.
pub fn into_object(value: Value) -> JsonObject {
    match value {
        Value::Object(object) => object,
        _ => unreachable!("JSON value wasn't an object"),
    }
}
