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

//! This crate provides the functionality for handling `mso_mdoc` Credentials in compliance with
//! the [ISO/IEC 18013-5:2021][1] & [ISO/IEC TS 18013-7:2024][2] standards, but modified to work
//! with the OpenID for [Verifiable Presentations][3] protocol.
//!
//! [1]: <https://www.iso.org/standard/69084.html>
//! [2]: <https://www.iso.org/standard/82772.html>
//! [3]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Details
//!
//! The crate defines multiple modules, which can be roughly divided as follows.
//!
//!   * High-level modules: [`device`], [`issuer`] and [`verifier`] -- one per agent role.
//!   * The [`error`] module describing the error values.
//!   * Low-level data model -- [`models`], following the structure of section 8.3.2.1.2.2 of
//!     the standard: [`IssuerSigned`][models::IssuerSigned] with its
//!     `MobileSecurityObject`, [`DeviceResponse`][models::DeviceResponse] with its device
//!     authentication, and the CBOR scalar wrappers (tag 24 `bstr .cbor`, `tdate`,
//!     `full-date`).
//!
//! Device authentication is bound to the OpenID4VP exchange through the `OID4VPHandover`
//! session transcript; the pre-18013-7 bare-challenge binding is retained as a legacy path for
//! unencrypted responses.

pub mod device;
pub mod error;
pub mod issuer;
pub mod models;
mod utils;
pub mod verifier;

pub use device::Device;
pub use error::{MdocError, Result};
pub use issuer::Issuer;
pub use models::data_retrieval::issuer_auth::DeviceKey;
pub use utils::rand::generate_nonce;
pub use verifier::Verifier;
