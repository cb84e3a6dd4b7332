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

/// Error type of the `bh-vc-jwt` crate.
#[derive(strum_macros::Display, Debug, PartialEq)]
pub enum VcJwtError {
    /// The compact serialization could not be parsed.
    #[strum(to_string = "Non-parsable VC-JWT")]
    NonParseable,

    /// The credential shape is valid but its fields contradict each other,
    /// e.g. `jti != vc.id`.
    #[strum(to_string = "Invalid VC structure: {0}")]
    InvalidStructure(String),

    /// The signature verification failed or the signer key could not be resolved.
    #[strum(to_string = "Invalid VC signature")]
    InvalidSignature,

    /// The credential is not yet valid under the allowed leeway.
    #[strum(to_string = "Credential not yet valid: current time is {0}, nbf is {1}")]
    NotYetValid(u64, u64),

    /// The credential is expired under the allowed leeway.
    #[strum(to_string = "Credential expired: current time is {0}, exp is {1}")]
    Expired(u64, u64),

    /// The signing of the credential failed.
    #[strum(to_string = "Signing failed")]
    SigningFailed,
}

impl bherror::BhError for VcJwtError {}

/// Result type of the `bh-vc-jwt` crate.
pub type Result<T> = bherror::Result<T, VcJwtError>;
