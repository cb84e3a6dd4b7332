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

use bh_jose::base64_url_encode;
use rand_core::CryptoRngCore;

use crate::Hasher;

/// The claim name holding disclosure digests within an object.
pub(crate) const SD_FIELD_NAME: &str = "_sd";

/// The claim name holding the hashing algorithm of the disclosure digests.
pub(crate) const SD_ALG_FIELD_NAME: &str = "_sd_alg";

/// The key of an `{"...": digest}` placeholder concealing an array element.
pub(crate) const ARRAY_ELEMENT_FIELD_NAME: &str = "...";

/// Number of random salt bytes per disclosure.
const SALT_LEN: usize = 16;

/// Compute the base64url-encoded digest of `input` with the provided [`Hasher`].
pub(crate) fn base64_url_digest(input: &[u8], hasher: &impl Hasher) -> String {
    base64_url_encode(hasher.digest(input))
}

/// Draw a fresh disclosure salt: 16 random bytes, base64url-encoded.
pub(crate) fn generate_salt<R: CryptoRngCore + ?Sized>(rng: &mut R) -> String {
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    base64_url_encode(salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sha256;

    /// Digest of the `family_name` disclosure from [the SD-JWT draft, section 5.2.3][1].
    ///
    /// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-07#section-5.2.3
    #[test]
    fn digest_matches_draft_vector() {
        let disclosure = "WyJfMjZiYzRMVC1hYzZxMktJNmNCVzVlcyIsICJmYW1pbHlfbmFtZSIsICJNw7ZiaXVzIl0";

        let digest = base64_url_digest(disclosure.as_bytes(), &Sha256);

        assert_eq!(digest, "uutlBuYeMDyjLLTpf6Jxi7yNkEF35jdyWMn9U7b_RYY");
    }

    #[test]
    fn salts_are_distinct() {
        let mut rng = rand::thread_rng();
        let a = generate_salt(&mut rng);
        let b = generate_salt(&mut rng);

        assert_ne!(a, b);
        // 16 bytes -> 22 base64url characters
        assert_eq!(a.len(), 22);
    }
}
