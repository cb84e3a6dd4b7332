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

use crate::{StatusBits, UriBuf};

/// Error type of the `bh-status-list` crate.
#[derive(strum_macros::Display, Debug, PartialEq)]
pub enum Error {
    /// The declared size of a status list does not match its byte array.
    #[strum(to_string = "Inconsistent Status List size")]
    InconsistentSize,

    /// A status value does not fit into the configured amount of bits.
    #[strum(to_string = "Status {1} does not fit into {0} bit(s)")]
    StatusTooLarge(StatusBits, u8),

    /// An index is out of bounds for a list of the given size.
    #[strum(to_string = "Index {1} out of bounds for size {0}")]
    IndexOutOfBounds(usize, usize),

    /// The compressed & encoded list payload could not be decoded.
    #[strum(to_string = "Unable to decode the encoded list")]
    DecodeFailed,

    /// Signing of the Status List Token failed.
    #[strum(to_string = "Status List Token signing failed")]
    SigningFailed,

    /// The Status List Token is not parsable or its signature is invalid.
    #[strum(to_string = "Invalid Status List Token")]
    InvalidToken,

    /// The `typ` header of the Status List Token has an unexpected value.
    #[strum(to_string = "Invalid Status List Token header typ {0}")]
    InvalidTokenHeaderTyp(String),

    /// The `iss` claim does not match the issuer of the referenced credential.
    #[strum(to_string = "Status List Token issuer mismatch: {0}")]
    InvalidIssuer(String),

    /// The `sub` claim does not match the URI the token was fetched from.
    #[strum(to_string = "Status List Token subject mismatch: {0}")]
    InvalidSubject(String),

    /// The `iat` claim lies in the future.
    #[strum(to_string = "Status List Token issued in the future: iat {0}, now {1}")]
    TokenIssuedInTheFuture(u64, u64),

    /// The token is older than its `exp`/`ttl` freshness bounds allow.
    #[strum(to_string = "Status List Token no longer fresh at {0}")]
    TokenStale(u64),

    /// Fetching the status list from the given URI failed.
    #[strum(to_string = "Unable to fetch the Status List from {0}")]
    UnsuccessfulStatusFetch(UriBuf),
}

impl bherror::BhError for Error {}

/// Result type of the `bh-status-list` crate.
pub type Result<T> = bherror::Result<T, Error>;
