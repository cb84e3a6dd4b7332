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

use rand::Rng;

/// Length of the per-item `random` salt in bytes; ISO 18013-5 requires at least 16.
const SALT_LEN: usize = 16;

/// Draw a fresh `random` salt for an `IssuerSignedItem`.
pub(crate) fn generate_salt<R: Rng + ?Sized>(rng: &mut R) -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    salt
}

/// Generate a nonce: 16 random bytes, base64url-encoded.
pub fn generate_nonce<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    bh_jose::base64_url_encode(bytes)
}
