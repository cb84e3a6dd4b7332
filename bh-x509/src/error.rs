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

/// Error type of the `bh-x509` crate.
#[derive(strum_macros::Display, Debug, PartialEq, Eq, Clone)]
pub enum X509Error {
    /// Error indicating that a certificate could not be parsed or encoded.
    #[strum(to_string = "Invalid X.509 certificate")]
    InvalidCertificate,

    /// Error indicating that the certificate chain is structurally invalid,
    /// e.g. empty or not in leaf-first order.
    #[strum(to_string = "Invalid X.509 certificate chain")]
    InvalidChain,

    /// Error indicating that the chain does not terminate in any of the
    /// trusted root certificates.
    #[strum(to_string = "X.509 certificate chain is not trusted")]
    UntrustedChain,

    /// Error indicating that the leaf certificate carries no SAN dNSName
    /// entry.
    #[strum(to_string = "Missing SAN dNSName in the leaf certificate")]
    MissingSanDnsName,

    /// Error from the underlying cryptographic backend.
    #[strum(to_string = "Crypto backend failure")]
    CryptoBackend,
}

impl bherror::BhError for X509Error {}

/// Result type of the `bh-x509` crate.
pub type Result<T> = bherror::Result<T, X509Error>;
