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

//! This crate implements [W3C Verifiable Credentials][1] in the JWT representation (VC-JWT).
//!
//! [1]: <https://www.w3.org/TR/vc-data-model/>
//!
//! # Details
//!
//! A [`VcJwtClaims`] payload duplicates the credential metadata between the registered JWT
//! claims and the `vc` member; the pairings (`jti` ↔ `vc.id`, `iss` ↔ `vc.issuer`, `nbf` ↔
//! `vc.issuanceDate`, `exp` ↔ `vc.expirationDate`) are enforced on construction and rechecked
//! on verification.  Timestamps are plain seconds since the UNIX epoch.
//!
//! The crate also builds & evaluates the bit-indexed revocation-list credential referenced from
//! a credential's `credentialStatus` member (see [`revocation`]).

mod error;
mod model;
pub mod revocation;

pub use error::{Result, VcJwtError};
pub use model::{VcJwtClaims, VerifiableCredential, TYP_VC_JWT, W3C_CREDENTIALS_CONTEXT};

/// Number of seconds since the UNIX epoch.
pub type SecondsSinceEpoch = u64;

/// A JSON object.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
