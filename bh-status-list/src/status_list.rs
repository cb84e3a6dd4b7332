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

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    utils::{
        byte_and_inner_idx, check_status_against_bits, compress_and_encode, decode_and_decompress,
    },
    Error, Result, UriBuf,
};

/// The allowed values for the number of bits each status takes on a Status List.
#[derive(Debug, Clone, Copy, PartialEq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StatusBits {
    /// The status is represented with `1` bit.
    One = 1,
    /// The status is represented with `2` bits.
    Two = 2,
    /// The status is represented with `4` bits.
    Four = 4,
    /// The status is represented with `8` bits.
    Eight = 8,
}

impl std::fmt::Display for StatusBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// A list of status values for all the referenced Verifiable Credentials.
///
/// An ordered list of bits where the status of each credential is represented with a fixed
/// amount of `bits`; each credential carries an index pointing at its status within the list.
/// This is the *reader* view; owners manipulate the list through [`StatusListInternal`].
///
/// The `lst` member serializes by compressing with `DEFLATE` (`ZLIB` data format) and
/// base64url-encoding the result, per [the draft][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-03#name-status-list-in-json-format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusList {
    bits: StatusBits,

    #[serde(serialize_with = "serialize_lst", deserialize_with = "deserialize_lst")]
    lst: Vec<u8>,

    /// An optional URI to retrieve the Status List Aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    aggregation_uri: Option<UriBuf>,
}

fn serialize_lst<S: Serializer>(lst: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
    let lst_encoded =
        compress_and_encode(lst).map_err(|e| serde::ser::Error::custom(format!("{:?}", e)))?;

    s.serialize_str(&lst_encoded)
}

fn deserialize_lst<'de, D>(d: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let lst_encoded = String::deserialize(d)?;

    decode_and_decompress(&lst_encoded).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
}

impl StatusList {
    /// Gets the number of bits of each status in the list.
    pub fn bits(&self) -> StatusBits {
        self.bits
    }

    /// Gets the reference to the raw Status List data.
    pub fn lst(&self) -> &[u8] {
        &self.lst
    }

    /// Returns the status at the given `index`, or [`None`] when the index is out of bounds.
    pub fn get(&self, index: usize) -> Option<u8> {
        let (byte_idx, inner_idx) = byte_and_inner_idx(self.bits, index);

        let mut byte = *self.lst.get(byte_idx)?;

        let bits_per_status = self.bits as u8;

        // shift left to drop the trailing statuses, then right to extract the value
        byte <<= 8 - (inner_idx + 1) * bits_per_status;
        byte >>= 8 - bits_per_status;

        Some(byte)
    }
}

/// The owner-side view of a Status List: the [`StatusList`] plus its exact size.
///
/// The `size` cannot be recovered from the `lst` alone, since the last byte may have unused
/// space; it is therefore tracked explicitly.
#[derive(Debug)]
pub struct StatusListInternal {
    status_list: StatusList,
    size: usize,
}

impl StatusListInternal {
    /// Initializes a new empty Status List.
    pub fn new(bits: StatusBits, aggregation_uri: Option<UriBuf>) -> Self {
        Self {
            status_list: StatusList {
                bits,
                lst: Vec::new(),
                aggregation_uri,
            },
            size: 0,
        }
    }

    /// Recreates a Status List from stored parts.
    ///
    /// The `size` **MUST** point into the last byte of `lst`, and the statuses from there to
    /// the end of that byte must all be `0`; otherwise [`Error::InconsistentSize`] is returned.
    pub fn new_from_parts(
        bits: StatusBits,
        lst: Vec<u8>,
        aggregation_uri: Option<UriBuf>,
        size: usize,
    ) -> Result<Self> {
        if lst.is_empty() ^ (size == 0) {
            return Err(bherror::Error::root(Error::InconsistentSize)
                .ctx("`lst` not empty but the `size` is 0 or vice-versa"));
        }

        if size > 0 {
            let (byte_idx, inner_idx) = byte_and_inner_idx(bits, size - 1);

            if byte_idx + 1 != lst.len() {
                return Err(bherror::Error::root(Error::InconsistentSize)
                    .ctx("`size` does not point into the last byte"));
            }

            // the unwrap is fine because `size` is positive
            let last_byte = *lst.last().unwrap();

            // the cast avoids a shift-overflow panic for a full last byte
            if last_byte as u16 >> ((inner_idx + 1) * bits as u8) != 0 {
                return Err(bherror::Error::root(Error::InconsistentSize)
                    .ctx("last byte is not empty after `size` elements"));
            }
        }

        Ok(Self {
            status_list: StatusList {
                bits,
                lst,
                aggregation_uri,
            },
            size,
        })
    }

    /// Returns the number of recorded statuses.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns a reference to the underlying [`StatusList`].
    pub fn status_list(&self) -> &StatusList {
        &self.status_list
    }

    /// Appends a new status entry and returns its index within the list.
    pub fn push(&mut self, status: u8) -> Result<usize> {
        let list = &mut self.status_list;

        check_status_against_bits(list.bits, status)?;

        let (_, inner_idx) = byte_and_inner_idx(list.bits, self.size);

        // an `inner_idx` of 0 means the previous byte is full (or the list is empty)
        if inner_idx == 0 {
            list.lst.push(0);
        }

        // the unwrap is fine because there is at least one byte
        let last_byte = list.lst.last_mut().unwrap();

        *last_byte |= status << (inner_idx * list.bits as u8);

        self.size += 1;

        Ok(self.size - 1)
    }

    /// Updates the status at the given `index` to the provided `status` value.
    pub fn update(&mut self, index: usize, status: u8) -> Result<()> {
        if index >= self.size {
            return Err(bherror::Error::root(Error::IndexOutOfBounds(
                self.size, index,
            )));
        }

        let list = &mut self.status_list;

        check_status_against_bits(list.bits, status)?;

        let (byte_idx, inner_idx) = byte_and_inner_idx(list.bits, index);

        // the indexing is fine because of the `index` bound check above
        let byte = &mut list.lst[byte_idx];

        let bits_per_status = list.bits as u8;
        let shift = inner_idx * bits_per_status;

        // `1`s on the lowest `bits_per_status` bits; cast avoids the u8 overflow for 8 bits
        let mask = ((1u16 << bits_per_status) - 1) as u8;

        // clear the old status, then set the new one
        *byte = *byte & !(mask << shift) | (status << shift);

        Ok(())
    }
}

impl From<StatusListInternal> for StatusList {
    fn from(list: StatusListInternal) -> Self {
        list.status_list
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn push_all(bits: StatusBits, statuses: &[u8]) -> StatusListInternal {
        let mut list = StatusListInternal::new(bits, None);
        for (i, &status) in statuses.iter().enumerate() {
            assert_eq!(list.push(status).unwrap(), i);
        }
        list
    }

    /// Taken from [the draft, section 4][1].
    ///
    /// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-03#section-4-3
    #[test]
    fn one_bit_example_serializes_correctly() {
        let statuses = [1u8, 0, 0, 1, 1, 1, 0, 1, 1, 1, 0, 0, 0, 1, 0, 1];
        let list = push_all(StatusBits::One, &statuses);

        for (i, &status) in statuses.iter().enumerate() {
            assert_eq!(list.status_list().get(i), Some(status));
        }

        let serialized = serde_json::to_value(list.status_list()).unwrap();
        assert_eq!(serialized, json!({"bits": 1, "lst": "eNrbuRgAAhcBXQ"}));
    }

    /// Taken from [the draft][1].
    ///
    /// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-03#name-status-list-token-with-2-bi
    #[test]
    fn two_bit_example_serializes_correctly() {
        let statuses = [1u8, 2, 0, 3, 0, 1, 0, 1, 1, 2, 3, 3];
        let list = push_all(StatusBits::Two, &statuses);

        let serialized = serde_json::to_value(list.status_list()).unwrap();
        assert_eq!(serialized, json!({"bits": 2, "lst": "eNo76fITAAPfAgc"}));
    }

    #[test]
    fn deserialization_restores_raw_bytes() {
        let value = json!({"bits": 1, "lst": "eNrbuRgAAhcBXQ"});

        let list: StatusList = serde_json::from_value(value).unwrap();

        assert_eq!(list.bits(), StatusBits::One);
        // 1|0|1|1|1|0|0|1, 1|0|1|0|0|0|1|1 packed LSB-first
        assert_eq!(list.lst(), &[0xb9, 0xa3]);
    }

    #[test]
    fn get_out_of_bounds_is_none() {
        let list = push_all(StatusBits::Four, &[0xa, 0x3, 0x9]);

        assert_eq!(list.status_list().get(2), Some(0x9));
        assert_eq!(list.status_list().get(3), None);
    }

    #[test]
    fn push_too_large_status_fails() {
        for bits in [StatusBits::One, StatusBits::Two, StatusBits::Four] {
            let mut list = StatusListInternal::new(bits, None);
            let too_large = 1u8 << bits as u8;

            assert_eq!(list.push(too_large - 1).unwrap(), 0);

            let err = list.push(too_large).unwrap_err();
            assert!(matches!(err.error, Error::StatusTooLarge(b, s) if b == bits && s == too_large));
        }
    }

    #[test]
    fn update_rewrites_in_place() {
        let mut list = push_all(StatusBits::Two, &[1, 2, 0, 3, 0, 1]);

        list.update(1, 0).unwrap();
        list.update(4, 3).unwrap();

        assert_eq!(list.status_list().get(1), Some(0));
        assert_eq!(list.status_list().get(4), Some(3));
        // the neighbours are untouched
        assert_eq!(list.status_list().get(0), Some(1));
        assert_eq!(list.status_list().get(2), Some(0));
        assert_eq!(list.status_list().get(3), Some(3));
        assert_eq!(list.status_list().get(5), Some(1));
    }

    #[test]
    fn update_out_of_bounds_fails() {
        let mut list = push_all(StatusBits::Two, &[3]);

        let err = list.update(1, 1).unwrap_err();
        assert!(matches!(err.error, Error::IndexOutOfBounds(1, 1)));
    }

    #[test]
    fn new_from_parts_validates_size() {
        // consistent: 3 statuses of 4 bits in 2 bytes
        StatusListInternal::new_from_parts(StatusBits::Four, vec![0xa3, 0x09], None, 3).unwrap();

        // inconsistent: size points before the last byte
        let err = StatusListInternal::new_from_parts(StatusBits::Four, vec![0xa3, 0x09], None, 2)
            .unwrap_err();
        assert!(matches!(err.error, Error::InconsistentSize));

        // inconsistent: trailing statuses of the last byte are not zero
        let err = StatusListInternal::new_from_parts(StatusBits::Four, vec![0xa3, 0x99], None, 3)
            .unwrap_err();
        assert!(matches!(err.error, Error::InconsistentSize));

        // inconsistent: empty list with non-zero size
        let err =
            StatusListInternal::new_from_parts(StatusBits::One, vec![], None, 1).unwrap_err();
        assert!(matches!(err.error, Error::InconsistentSize));
    }

    #[test]
    fn eight_bit_statuses_take_a_full_byte() {
        let mut list = StatusListInternal::new(StatusBits::Eight, None);

        list.push(u8::MAX).unwrap();
        list.push(0x42).unwrap();

        assert_eq!(list.status_list().get(0), Some(u8::MAX));
        assert_eq!(list.status_list().get(1), Some(0x42));
        assert_eq!(list.status_list().lst().len(), 2);
    }
}
