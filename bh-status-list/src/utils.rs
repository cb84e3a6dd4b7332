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

use std::io::{Read as _, Write as _};

use bh_jose::{base64_url_decode, base64_url_encode};
use bherror::traits::ForeignError as _;
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use crate::{Error, Result, StatusBits};

/// `DEFLATE` (`ZLIB` format, highest compression) then base64url, as required for both the
/// Status List `lst` member and the revocation-list `encodedList` member.
pub(crate) fn compress_and_encode(data: &[u8]) -> Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).foreign_err(|| Error::DecodeFailed)?;
    let compressed = encoder.finish().foreign_err(|| Error::DecodeFailed)?;

    Ok(base64_url_encode(compressed))
}

/// Inverse of [`compress_and_encode`].
pub(crate) fn decode_and_decompress(encoded: &str) -> Result<Vec<u8>> {
    let compressed = base64_url_decode(encoded).foreign_err(|| Error::DecodeFailed)?;

    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .foreign_err(|| Error::DecodeFailed)?;

    Ok(data)
}

/// Number of statuses packed into one byte.
pub(crate) fn statuses_per_byte(bits: StatusBits) -> u8 {
    8 / bits as u8
}

/// Split a status index into the index of its byte and the index *within* that byte.
///
/// Within a byte, statuses are packed starting from the least significant bits, as illustrated
/// in the [draft][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-03#section-4-3
pub(crate) fn byte_and_inner_idx(bits: StatusBits, index: usize) -> (usize, u8) {
    let per_byte = statuses_per_byte(bits) as usize;
    (index / per_byte, (index % per_byte) as u8)
}

/// Error when `status` takes more bits than `bits` allows.
pub(crate) fn check_status_against_bits(bits: StatusBits, status: u8) -> Result<()> {
    // all 8-bit values fit into a full byte
    if bits == StatusBits::Eight {
        return Ok(());
    }

    if status >> (bits as u8) != 0 {
        return Err(bherror::Error::root(Error::StatusTooLarge(bits, status)));
    }

    Ok(())
}
