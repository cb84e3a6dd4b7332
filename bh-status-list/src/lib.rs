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

//! A crate dedicated to dealing with status & revocation lists for Verifiable Credentials.
//!
//! Two mechanisms are implemented.
//!
//! * The [Token Status List][1] draft: a compressed multi-bit status array conveyed inside a
//!   signed JWT ([`StatusListToken`]), referenced from credentials via the [`StatusClaim`].
//!   Only the JSON format for the Status List and the JWT format for the Status List Token are
//!   currently supported (no CBOR/CWT).
//! * The bit-indexed revocation list ([`RevocationList`]): a fixed-capacity single-bit array
//!   whose zlib-compressed, base64url-encoded form is embedded in a revocation-list Verifiable
//!   Credential, referenced from credentials via the [`CredentialStatus`].  A set bit means
//!   *revoked*.
//!
//! Both encodings are `DEFLATE` with the `ZLIB` data format followed by base64url, and both are
//! **signed by the issuer** of the referenced credentials; fetching is abstracted behind the
//! [`StatusListClient`] trait.
//!
//! [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-03

pub mod client;
mod error;
mod revocation_list;
mod status_list;
mod status_list_token;
mod utils;
mod vc_claim;

pub use client::{StatusListClient, StatusListResponse};
pub use error::{Error, Result};
pub use iref::{InvalidUri, UriBuf};
pub use revocation_list::{CredentialStatus, RevocationList, DEFAULT_REVOCATION_LIST_SIZE};
pub use status_list::{StatusBits, StatusList, StatusListInternal};
pub use status_list_token::{
    StatusListToken, StatusListTokenClaims, StatusListTokenHeader, STATUS_LIST_TOKEN_TYP,
};
pub use vc_claim::StatusClaim;
