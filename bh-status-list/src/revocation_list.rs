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

//! The bit-indexed revocation list, as embedded in a revocation-list Verifiable Credential.

use serde::{Deserialize, Serialize};

use crate::{
    utils::{compress_and_encode, decode_and_decompress},
    Error, Result, UriBuf,
};

/// The default capacity of a revocation list, in bits.
pub const DEFAULT_REVOCATION_LIST_SIZE: usize = 1 << 17;

/// The `type` member of a revocation-list credential status.
const REVOCATION_LIST_STATUS_TYPE: &str = "RevocationList2021Status";

/// A fixed-capacity bit array tracking revocation: bit `index` set means the credential with
/// `credentialStatus.index == index` is revoked.
///
/// Bits are packed least-significant-first within each byte, consistent with [`StatusList`]
/// (crate::StatusList) at one bit per status.  The wire form is the zlib-compressed,
/// base64url-encoded `encodedList` member of the revocation-list credential subject.
#[derive(Debug, Clone, PartialEq)]
pub struct RevocationList {
    bits: Vec<u8>,
    size: usize,
}

impl RevocationList {
    /// Create an all-zeros (nothing revoked) list of [`DEFAULT_REVOCATION_LIST_SIZE`] bits.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REVOCATION_LIST_SIZE)
    }

    /// Create an all-zeros list of the given capacity in bits.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            bits: vec![0u8; size.div_ceil(8)],
            size,
        }
    }

    /// The capacity of the list in bits.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Set or clear the revocation bit at `index`.
    pub fn set(&mut self, index: usize, revoked: bool) -> Result<()> {
        if index >= self.size {
            return Err(bherror::Error::root(Error::IndexOutOfBounds(
                self.size, index,
            )));
        }

        let byte = &mut self.bits[index / 8];
        let mask = 1u8 << (index % 8);

        if revoked {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }

        Ok(())
    }

    /// Whether the bit at `index` is set.
    ///
    /// An `index` beyond the capacity of the list is treated as **not revoked**.
    pub fn is_revoked(&self, index: usize) -> bool {
        if index >= self.size {
            return false;
        }

        self.bits[index / 8] >> (index % 8) & 1 == 1
    }

    /// Produce the `encodedList` wire form: zlib-compressed, base64url-encoded bit array.
    pub fn encoded_list(&self) -> Result<String> {
        compress_and_encode(&self.bits)
    }

    /// Decode an `encodedList` wire form.
    pub fn from_encoded_list(encoded: &str) -> Result<Self> {
        let bits = decode_and_decompress(encoded)?;
        let size = bits.len() * 8;

        Ok(Self { bits, size })
    }
}

impl Default for RevocationList {
    fn default() -> Self {
        Self::new()
    }
}

/// The `credentialStatus` member of a Verifiable Credential pointing into a revocation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    /// The status entry type.
    #[serde(rename = "type")]
    type_: String,

    /// URL of the revocation-list credential.
    status_list_credential: UriBuf,

    /// The index of this credential's bit within the revocation list.
    status_list_index: u64,
}

impl CredentialStatus {
    /// Point at bit `index` of the revocation list served at `revocation_list_url`.
    pub fn new(revocation_list_url: UriBuf, index: u64) -> Self {
        Self {
            type_: REVOCATION_LIST_STATUS_TYPE.to_owned(),
            status_list_credential: revocation_list_url,
            status_list_index: index,
        }
    }

    /// URL of the revocation-list credential.
    pub fn revocation_list_url(&self) -> &UriBuf {
        &self.status_list_credential
    }

    /// The index of this credential's bit within the revocation list.
    pub fn index(&self) -> u64 {
        self.status_list_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_list_has_nothing_revoked() {
        let list = RevocationList::new();

        assert_eq!(list.size(), DEFAULT_REVOCATION_LIST_SIZE);
        assert!(!list.is_revoked(0));
        assert!(!list.is_revoked(DEFAULT_REVOCATION_LIST_SIZE - 1));
    }

    #[test]
    fn set_and_clear_bits() {
        let mut list = RevocationList::with_capacity(64);

        list.set(42, true).unwrap();
        assert!(list.is_revoked(42));
        assert!(!list.is_revoked(41));
        assert!(!list.is_revoked(43));

        list.set(42, false).unwrap();
        assert!(!list.is_revoked(42));
    }

    #[test]
    fn out_of_range_set_fails_but_read_is_not_revoked() {
        let mut list = RevocationList::with_capacity(8);

        let err = list.set(8, true).unwrap_err();
        assert!(matches!(err.error, Error::IndexOutOfBounds(8, 8)));

        // reading past the end is simply "not revoked"
        assert!(!list.is_revoked(1 << 20));
    }

    #[test]
    fn encoded_list_roundtrip() {
        let mut list = RevocationList::with_capacity(128);
        list.set(0, true).unwrap();
        list.set(42, true).unwrap();
        list.set(127, true).unwrap();

        let encoded = list.encoded_list().unwrap();
        let decoded = RevocationList::from_encoded_list(&encoded).unwrap();

        assert_eq!(decoded, list);
        assert!(decoded.is_revoked(42));
        assert!(!decoded.is_revoked(41));
    }

    #[test]
    fn credential_status_serializes_camel_case() {
        let status = CredentialStatus::new(
            UriBuf::new(b"https://issuer.example/revocation/1".to_vec()).unwrap(),
            42,
        );

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "RevocationList2021Status",
                "statusListCredential": "https://issuer.example/revocation/1",
                "statusListIndex": 42,
            })
        );

        let roundtripped: CredentialStatus = serde_json::from_value(value).unwrap();
        assert_eq!(roundtripped, status);
    }
}
