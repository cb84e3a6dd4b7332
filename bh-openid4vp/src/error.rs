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

//! Error values of the `bh-openid4vp` crate.

/// Error type of the `bh-openid4vp` crate.
///
/// Response-validation failures of the verifier do **not** surface here; they are structured
/// outcomes ([`AuthnResponseOutcome`][crate::AuthnResponseOutcome]) of the public API.
#[derive(strum_macros::Display, Debug, PartialEq)]
pub enum OpenId4VpError {
    /// Caller misuse of the API, e.g. an unsigned request mode with a client identifier
    /// scheme that mandates signing.
    #[strum(to_string = "Usage error: {0}")]
    UsageError(String),

    /// A wire payload could not be parsed.
    #[strum(to_string = "Parse error: {0}")]
    ParseError(String),

    /// The shape is valid but fields contradict each other or the protocol rules.
    #[strum(to_string = "Invalid structure: {0}")]
    InvalidStructure(String),

    /// A cryptographic signature did not verify.
    #[strum(to_string = "Invalid signature")]
    InvalidSignature,

    /// No trust anchor matches the presented key material.
    #[strum(to_string = "Unknown key")]
    UnknownKey,

    /// A time predicate failed under the allowed leeway.
    #[strum(to_string = "Expired or not yet valid: now {0}")]
    ExpiredOrNotYetValid(u64),

    /// An external resource could not be fetched.
    #[strum(to_string = "Fetch error: {0}")]
    FetchError(String),

    /// Signing or encrypting an outgoing artifact failed.
    #[strum(to_string = "Crypto operation failed")]
    CryptoFailed,

    /// The wallet holds no credential satisfying an input descriptor.
    #[strum(to_string = "No matching credential for descriptor {0}")]
    NoMatchingCredential(String),
}

impl bherror::BhError for OpenId4VpError {}

/// Result type of the `bh-openid4vp` crate.
pub type Result<T> = bherror::Result<T, OpenId4VpError>;
