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

use serde::{Deserialize, Serialize};

/// Name of the SHA-256 hashing algorithm for the `_sd_alg` claim, as specified [here][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-07#name-hash-function-claim
pub const SHA_256_ALG_NAME: &str = "sha-256";
/// Name of the SHA-384 hashing algorithm for the `_sd_alg` claim.
pub const SHA_384_ALG_NAME: &str = "sha-384";
/// Name of the SHA-512 hashing algorithm for the `_sd_alg` claim.
pub const SHA_512_ALG_NAME: &str = "sha-512";

/// Hashing algorithms usable for disclosure digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashingAlgorithm {
    /// SHA-256.
    #[serde(rename = "sha-256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "sha-384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "sha-512")]
    Sha512,
}

impl std::fmt::Display for HashingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sha256 => SHA_256_ALG_NAME,
            Self::Sha384 => SHA_384_ALG_NAME,
            Self::Sha512 => SHA_512_ALG_NAME,
        };
        write!(f, "{}", name)
    }
}

/// A disclosure digest backend.
///
/// The verifier needs an implementation for whatever algorithm the issuer recorded in the
/// `_sd_alg` claim; issuers pick one at construction.
pub trait Hasher {
    /// The algorithm this hasher implements.  Must be a constant function.
    fn algorithm(&self) -> HashingAlgorithm;

    /// Compute the digest of `input`.
    fn digest(&self, input: &[u8]) -> Vec<u8>;
}

impl<H: Hasher + ?Sized> Hasher for &H {
    fn algorithm(&self) -> HashingAlgorithm {
        (**self).algorithm()
    }

    fn digest(&self, input: &[u8]) -> Vec<u8> {
        (**self).digest(input)
    }
}

impl Hasher for Box<dyn Hasher> {
    fn algorithm(&self) -> HashingAlgorithm {
        (**self).algorithm()
    }

    fn digest(&self, input: &[u8]) -> Vec<u8> {
        (**self).digest(input)
    }
}

/// SHA-256 [`Hasher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256;

impl Hasher for Sha256 {
    fn algorithm(&self) -> HashingAlgorithm {
        HashingAlgorithm::Sha256
    }

    fn digest(&self, input: &[u8]) -> Vec<u8> {
        openssl::sha::sha256(input).to_vec()
    }
}

/// SHA-384 [`Hasher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha384;

impl Hasher for Sha384 {
    fn algorithm(&self) -> HashingAlgorithm {
        HashingAlgorithm::Sha384
    }

    fn digest(&self, input: &[u8]) -> Vec<u8> {
        openssl::sha::sha384(input).to_vec()
    }
}

/// SHA-512 [`Hasher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512;

impl Hasher for Sha512 {
    fn algorithm(&self) -> HashingAlgorithm {
        HashingAlgorithm::Sha512
    }

    fn digest(&self, input: &[u8]) -> Vec<u8> {
        openssl::sha::sha512(input).to_vec()
    }
}

/// The default hasher factory covering all the [`HashingAlgorithm`] variants with the bundled
/// openssl implementations.
pub fn default_hasher(algorithm: HashingAlgorithm) -> Option<Box<dyn Hasher>> {
    Some(match algorithm {
        HashingAlgorithm::Sha256 => Box::new(Sha256),
        HashingAlgorithm::Sha384 => Box::new(Sha384),
        HashingAlgorithm::Sha512 => Box::new(Sha512),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sd_alg_names_serialize_correctly() {
        for (alg, name) in [
            (HashingAlgorithm::Sha256, SHA_256_ALG_NAME),
            (HashingAlgorithm::Sha384, SHA_384_ALG_NAME),
            (HashingAlgorithm::Sha512, SHA_512_ALG_NAME),
        ] {
            assert_eq!(serde_json::to_string(&alg).unwrap(), format!("\"{name}\""));
            assert_eq!(alg.to_string(), name);

            let roundtripped: HashingAlgorithm =
                serde_json::from_str(&format!("\"{name}\"")).unwrap();
            assert_eq!(roundtripped, alg);
        }
    }

    /// SHA-256 of "abc", the classic NIST vector.
    #[test]
    fn sha256_vector() {
        let digest = Sha256.digest(b"abc");
        assert_eq!(
            hex_string(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    fn hex_string(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
