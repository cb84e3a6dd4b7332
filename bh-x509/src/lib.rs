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

//! This crate provides handling of X.509 certificate chains as they appear in the `x5c` JOSE
//! header parameter ([RFC 7515, section 4.1.6][1]) and the COSE `x5chain` header parameter
//! ([RFC 9360][2]).
//!
//! [1]: <https://datatracker.ietf.org/doc/html/rfc7515#section-4.1.6>
//! [2]: <https://www.rfc-editor.org/rfc/rfc9360.html>
//!
//! # Details
//!
//! The main types of the crate are the following.
//!
//! * [`X5Chain`] -- an ordered, leaf-first certificate chain.
//! * [`JwtX5Chain`] -- the `x5c` JOSE header representation (base64 DER strings).
//! * [`X509Trust`] -- a set of trusted root certificates against which presented chains are
//!   verified.

mod error;
mod x5chain;

pub use error::{Result, X509Error};
pub use x5chain::{JwtX5Chain, X509Trust, X5Chain};
