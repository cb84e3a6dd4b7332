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

//! Error values of the `bh-mdoc` crate.

use bh_jose::SigningAlgorithm;

use crate::models::data_retrieval::common::{DocType, NameSpace};

/// Error type of the `bh-mdoc` crate.
#[derive(strum_macros::Display, Debug, PartialEq)]
pub enum MdocError {
    /// Constructing or parsing the `IssuerAuth` COSE_Sign1 failed.
    #[strum(to_string = "IssuerAuth error")]
    IssuerAuth,

    /// Constructing or parsing the device authentication failed.
    #[strum(to_string = "DeviceAuth error")]
    DeviceAuth,

    /// The `DeviceResponse` could not be parsed.
    #[strum(to_string = "DeviceResponse parse error: {0}")]
    DeviceResponseParse(String),

    /// The `IssuerSigned` could not be parsed.
    #[strum(to_string = "IssuerSigned parse error")]
    IssuerSignedParse,

    /// The `DeviceResponse` contains no documents.
    #[strum(to_string = "Empty DeviceResponse")]
    EmptyDeviceResponse,

    /// The `docType` of a document does not match the expected value.
    #[strum(to_string = "Invalid docType: expected {0}, got {1}")]
    InvalidDocType(DocType, DocType),

    /// A digest of a presented item is absent from, or different to, the MSO.
    #[strum(to_string = "Missing or invalid digest for {0} (digestID {1})")]
    MissingOrInvalidDigest(NameSpace, u64),

    /// The MSO carries no digests at all for a presented namespace.
    #[strum(to_string = "Missing digest namespace {0}")]
    MissingDigestNamespace(NameSpace),

    /// The protected header carries no signing algorithm.
    #[strum(to_string = "Missing signing algorithm")]
    MissingSigningAlgorithm,

    /// No verifier implementation for the signing algorithm.
    #[strum(to_string = "Missing signature verifier for {0}")]
    MissingSignatureVerifier(SigningAlgorithm),

    /// A COSE signature did not verify.
    #[strum(to_string = "Invalid signature")]
    InvalidSignature,

    /// Signing with the provided backend failed.
    #[strum(to_string = "Signing failed")]
    SigningFailed,

    /// A public key could not be converted between its COSE, JWK and backend forms.
    #[strum(to_string = "Invalid public key")]
    InvalidPublicKey,

    /// The `x5chain` COSE header is missing or invalid.
    #[strum(to_string = "Invalid x5chain")]
    X5Chain,

    /// A `tdate` value is not a valid RFC 3339 UTC timestamp.
    #[strum(to_string = "Invalid value for Date Time")]
    InvalidDateTime,

    /// The document is not yet valid.
    #[strum(to_string = "Document not valid before {0}")]
    DocumentNotYetValid(i64),

    /// The document is expired.
    #[strum(to_string = "Document expired at {0}")]
    DocumentExpired(i64),

    /// Device MACs are not supported; only device signatures are.
    #[strum(to_string = "DeviceMac is not supported")]
    DeviceMac,
}

impl bherror::BhError for MdocError {}

/// Result type of the `bh-mdoc` crate.
pub type Result<T> = bherror::Result<T, MdocError>;
