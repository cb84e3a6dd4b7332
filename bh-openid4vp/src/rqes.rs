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

//! DTOs for remote qualified electronic signature (RQES) requests carried over the
//! authorization channel, per the [CSC API v2][1] vocabulary.
//!
//! These are plain data carriers; evaluating a signature request is out of scope here.
//!
//! [1]: <https://cloudsignatureconsortium.org/resources/download-api-specifications/>

use serde::{Deserialize, Serialize};

/// The hash algorithm OID for SHA-256.
pub const HASH_ALGORITHM_OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";

/// Parameters of a signature request presented to the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequestParameters {
    /// The qualifier of the requested signature, e.g. `eu_eidas_qes`.
    pub signature_qualifier: String,

    /// The digests of the documents to be signed.
    pub document_digests: Vec<DocumentDigest>,

    /// The OID of the hash algorithm the digests were computed with.
    pub hash_algorithm_o_i_d: String,

    /// An opaque identifier correlating this request across the flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_location: Option<String>,
}

impl SignatureRequestParameters {
    /// A qualified-signature request over SHA-256 digests.
    pub fn new_qes(document_digests: Vec<DocumentDigest>) -> Self {
        Self {
            signature_qualifier: "eu_eidas_qes".to_owned(),
            document_digests,
            hash_algorithm_o_i_d: HASH_ALGORITHM_OID_SHA256.to_owned(),
            document_location: None,
        }
    }
}

/// The digest of one document to be signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDigest {
    /// Base64-encoded digest value.
    pub hash: String,

    /// Human-readable label of the document shown to the signer.
    pub label: String,
}
