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

//! Compact JWE ([RFC 7516][1]) with ECDH-ES direct key agreement ([RFC 7518, section 4.6][2]).
//!
//! The content-encryption key is derived with the Concat KDF (SHA-256) from the ECDH shared
//! secret; the `epk`, `apu` and `apv` parameters travel in the protected header.  With direct
//! key agreement the `encrypted_key` part of the compact serialization is empty.
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc7516
//! [2]: https://datatracker.ietf.org/doc/html/rfc7518#section-4.6

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::{
    ec::EcKey,
    hash::MessageDigest,
    memcmp,
    pkey::{PKey, Private},
    sha::sha256,
    symm::Cipher,
};
use serde::{Deserialize, Serialize};

use crate::{
    base64_url_decode, base64_url_encode, ecdh_shared_secret, generate_ephemeral_p256,
    secure_random, CryptoError, FormatError, JwkPublic,
};

/// The only supported JWE key-management algorithm: ECDH-ES in direct key agreement mode.
pub const KEY_AGREEMENT_ECDH_ES: &str = "ECDH-ES";

/// JWE content-encryption algorithms, as named in [RFC 7518, section 5.1][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/rfc7518#section-5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncryptionAlgorithm {
    /// AES GCM with a 128-bit key.
    #[serde(rename = "A128GCM")]
    A128Gcm,
    /// AES GCM with a 192-bit key.
    #[serde(rename = "A192GCM")]
    A192Gcm,
    /// AES GCM with a 256-bit key.
    #[serde(rename = "A256GCM")]
    A256Gcm,
    /// AES-128-CBC with HMAC-SHA-256 (composite key).
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,
    /// AES-192-CBC with HMAC-SHA-384 (composite key).
    #[serde(rename = "A192CBC-HS384")]
    A192CbcHs384,
    /// AES-256-CBC with HMAC-SHA-512 (composite key).
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,
}

impl ContentEncryptionAlgorithm {
    /// The registered `enc` header value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    /// The length of the content-encryption key in bytes.
    ///
    /// For the CBC-HS variants this is the length of the *composite* key, whose first half keys
    /// the HMAC and second half the cipher.
    pub fn key_len(&self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
            Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
        }
    }

    fn iv_len(&self) -> usize {
        if self.is_gcm() {
            12
        } else {
            16
        }
    }

    fn tag_len(&self) -> usize {
        match self {
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 16,
            Self::A128CbcHs256 => 16,
            Self::A192CbcHs384 => 24,
            Self::A256CbcHs512 => 32,
        }
    }

    fn is_gcm(&self) -> bool {
        matches!(self, Self::A128Gcm | Self::A192Gcm | Self::A256Gcm)
    }

    fn gcm_cipher(&self) -> Cipher {
        match self {
            Self::A128Gcm => Cipher::aes_128_gcm(),
            Self::A192Gcm => Cipher::aes_192_gcm(),
            Self::A256Gcm => Cipher::aes_256_gcm(),
            _ => unreachable!("not a GCM algorithm"),
        }
    }

    fn cbc_cipher(&self) -> Cipher {
        match self {
            Self::A128CbcHs256 => Cipher::aes_128_cbc(),
            Self::A192CbcHs384 => Cipher::aes_192_cbc(),
            Self::A256CbcHs512 => Cipher::aes_256_cbc(),
            _ => unreachable!("not a CBC algorithm"),
        }
    }

    fn hmac_digest(&self) -> MessageDigest {
        match self {
            Self::A128CbcHs256 => MessageDigest::sha256(),
            Self::A192CbcHs384 => MessageDigest::sha384(),
            Self::A256CbcHs512 => MessageDigest::sha512(),
            _ => unreachable!("not a CBC-HS algorithm"),
        }
    }
}

/// The protected header of a [`JweEncrypted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JweHeader {
    /// Key-management algorithm; always [`KEY_AGREEMENT_ECDH_ES`] for us.
    pub alg: String,

    /// Content-encryption algorithm.
    pub enc: ContentEncryptionAlgorithm,

    /// The ephemeral public key of the originator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epk: Option<JwkPublic>,

    /// Agreement PartyUInfo, base64url-encoded.  OpenID4VP carries the wallet-generated mdoc
    /// nonce here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,

    /// Agreement PartyVInfo, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apv: Option<String>,

    /// Identifier of the recipient key the content was encrypted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A JWE in its parsed compact form.
///
/// Invariant: the additional authenticated data of the content encryption is the ASCII of the
/// base64url-encoded protected header, which is therefore preserved verbatim between parsing and
/// decryption.
#[derive(Debug, Clone, PartialEq)]
pub struct JweEncrypted {
    /// The parsed protected header.
    pub header: JweHeader,
    /// `b64u(header_json)`, preserved as the AAD.
    header_b64: String,
    /// The encrypted key; empty for ECDH-ES direct key agreement.
    pub encrypted_key: Vec<u8>,
    /// The initialization vector.
    pub iv: Vec<u8>,
    /// The ciphertext.
    pub ciphertext: Vec<u8>,
    /// The authentication tag.
    pub auth_tag: Vec<u8>,
}

impl JweEncrypted {
    /// Encrypt `payload` to the P-256 key `recipient_jwk` using ECDH-ES with the chosen content
    /// encryption.
    ///
    /// `apu` and `apv` are the raw (not yet base64url-encoded) agreement party infos, entering
    /// both the protected header and the Concat-KDF.
    pub fn encrypt(
        payload: &[u8],
        recipient_jwk: &JwkPublic,
        enc: ContentEncryptionAlgorithm,
        apu: Option<&[u8]>,
        apv: Option<&[u8]>,
    ) -> bherror::Result<Self, CryptoError> {
        let (ephemeral_private, epk) = generate_ephemeral_p256()?;
        let shared_secret = ecdh_shared_secret(&ephemeral_private, recipient_jwk)?;

        let cek = concat_kdf(
            &shared_secret,
            enc.name(),
            apu.unwrap_or_default(),
            apv.unwrap_or_default(),
            enc.key_len(),
        );

        let kid = recipient_jwk
            .get("kid")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        let header = JweHeader {
            alg: KEY_AGREEMENT_ECDH_ES.to_owned(),
            enc,
            epk: Some(epk),
            apu: apu.map(base64_url_encode),
            apv: apv.map(base64_url_encode),
            kid,
        };

        let header_json = serde_json::to_string(&header)
            .foreign_err(|| CryptoError::EncryptionFailed)
            .ctx(|| "header serialization failed")?;
        let header_b64 = base64_url_encode(header_json);

        let iv = secure_random(enc.iv_len())?;

        let (ciphertext, auth_tag) = if enc.is_gcm() {
            encrypt_gcm(enc, &cek, &iv, header_b64.as_bytes(), payload)?
        } else {
            encrypt_cbc_hmac(enc, &cek, &iv, header_b64.as_bytes(), payload)?
        };

        Ok(Self {
            header,
            header_b64,
            encrypted_key: Vec::new(),
            iv,
            ciphertext,
            auth_tag,
        })
    }

    /// Parse a compact JWE serialization.
    pub fn parse(compact: &str) -> bherror::Result<Self, FormatError> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [header_b64, encrypted_key, iv, ciphertext, auth_tag] = parts.as_slice() else {
            return Err(Error::root(FormatError::InvalidCompactJwe(
                "expected 5 dot-separated parts".to_owned(),
            )));
        };

        let decode = |part: &str, what: &str| {
            base64_url_decode(part).foreign_err(|| {
                FormatError::InvalidCompactJwe(format!("{what} is not base64url"))
            })
        };

        let header_json = decode(header_b64, "header")?;
        let header: JweHeader = serde_json::from_slice(&header_json)
            .foreign_err(|| FormatError::InvalidCompactJwe("invalid header JSON".to_owned()))?;

        Ok(Self {
            header,
            header_b64: (*header_b64).to_owned(),
            encrypted_key: decode(encrypted_key, "encrypted key")?,
            iv: decode(iv, "initialization vector")?,
            ciphertext: decode(ciphertext, "ciphertext")?,
            auth_tag: decode(auth_tag, "authentication tag")?,
        })
    }

    /// Serialize into the compact form; the encrypted-key part is empty for ECDH-ES.
    pub fn serialize_compact(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}",
            self.header_b64,
            base64_url_encode(&self.encrypted_key),
            base64_url_encode(&self.iv),
            base64_url_encode(&self.ciphertext),
            base64_url_encode(&self.auth_tag),
        )
    }

    /// The decoded `apu` (agreement PartyUInfo) header value, if present.
    pub fn apu(&self) -> bherror::Result<Option<Vec<u8>>, FormatError> {
        self.header
            .apu
            .as_deref()
            .map(|apu| {
                base64_url_decode(apu).foreign_err(|| {
                    FormatError::InvalidCompactJwe("`apu` is not base64url".to_owned())
                })
            })
            .transpose()
    }

    /// Decrypt the content with the recipient's static P-256 key.
    pub fn decrypt(
        &self,
        recipient_private: &EcKey<Private>,
    ) -> bherror::Result<Vec<u8>, CryptoError> {
        if self.header.alg != KEY_AGREEMENT_ECDH_ES {
            return Err(Error::root(CryptoError::Unsupported(format!(
                "JWE key management algorithm {}",
                self.header.alg
            ))));
        }
        // direct key agreement has no encrypted key
        if !self.encrypted_key.is_empty() {
            return Err(Error::root(CryptoError::DecryptionFailed)
                .ctx("non-empty encrypted key for ECDH-ES"));
        }

        let epk = self
            .header
            .epk
            .as_ref()
            .ok_or_else(|| Error::root(CryptoError::DecryptionFailed).ctx("missing `epk`"))?;

        let shared_secret = ecdh_shared_secret(recipient_private, epk)?;

        let decode_info = |value: Option<&String>| -> bherror::Result<Vec<u8>, CryptoError> {
            value
                .map(|v| {
                    base64_url_decode(v)
                        .foreign_err(|| CryptoError::DecryptionFailed)
                        .ctx(|| "agreement party info is not base64url")
                })
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let apu = decode_info(self.header.apu.as_ref())?;
        let apv = decode_info(self.header.apv.as_ref())?;

        let enc = self.header.enc;
        let cek = concat_kdf(&shared_secret, enc.name(), &apu, &apv, enc.key_len());

        let aad = self.header_b64.as_bytes();

        if enc.is_gcm() {
            decrypt_gcm(enc, &cek, &self.iv, aad, &self.ciphertext, &self.auth_tag)
        } else {
            decrypt_cbc_hmac(enc, &cek, &self.iv, aad, &self.ciphertext, &self.auth_tag)
        }
    }
}

/// The Concat KDF of [NIST SP 800-56A] as profiled by [RFC 7518, section 4.6.2][1]: SHA-256 over
/// `round_be32 || Z || OtherInfo`, repeated until `key_len` bytes are produced.
///
/// `OtherInfo = len(alg_id) || alg_id || len(apu) || apu || len(apv) || apv || keydatalen_bits`,
/// all lengths 32-bit big-endian.
///
/// [1]: https://datatracker.ietf.org/doc/html/rfc7518#section-4.6.2
pub(crate) fn concat_kdf(
    shared_secret: &[u8],
    alg_id: &str,
    apu: &[u8],
    apv: &[u8],
    key_len: usize,
) -> Vec<u8> {
    let mut other_info = Vec::new();
    for field in [alg_id.as_bytes(), apu, apv] {
        other_info.extend_from_slice(&(field.len() as u32).to_be_bytes());
        other_info.extend_from_slice(field);
    }
    other_info.extend_from_slice(&((key_len * 8) as u32).to_be_bytes());

    let mut derived = Vec::with_capacity(key_len);
    let mut round: u32 = 1;
    while derived.len() < key_len {
        let mut input = round.to_be_bytes().to_vec();
        input.extend_from_slice(shared_secret);
        input.extend_from_slice(&other_info);
        derived.extend_from_slice(&sha256(&input));
        round += 1;
    }
    derived.truncate(key_len);
    derived
}

fn encrypt_gcm(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    payload: &[u8],
) -> bherror::Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let mut tag = vec![0u8; enc.tag_len()];
    let ciphertext =
        openssl::symm::encrypt_aead(enc.gcm_cipher(), cek, Some(iv), aad, payload, &mut tag)
            .foreign_err(|| CryptoError::EncryptionFailed)?;
    Ok((ciphertext, tag))
}

fn decrypt_gcm(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> bherror::Result<Vec<u8>, CryptoError> {
    openssl::symm::decrypt_aead(enc.gcm_cipher(), cek, Some(iv), aad, ciphertext, tag)
        .foreign_err(|| CryptoError::DecryptionFailed)
}

/// AES-CBC + HMAC composite encryption per [RFC 7518, section 5.2.2][1]: the first half of the
/// composite key keys the HMAC, the second half the cipher; the tag is the HMAC over
/// `AAD || IV || CT || AL` truncated to half the digest, where `AL` is the AAD length in *bits*
/// as a 64-bit big-endian integer.
///
/// [1]: https://datatracker.ietf.org/doc/html/rfc7518#section-5.2.2
fn encrypt_cbc_hmac(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    payload: &[u8],
) -> bherror::Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let (mac_key, enc_key) = cek.split_at(cek.len() / 2);

    let ciphertext = openssl::symm::encrypt(enc.cbc_cipher(), enc_key, Some(iv), payload)
        .foreign_err(|| CryptoError::EncryptionFailed)?;

    let tag = cbc_hmac_tag(enc, mac_key, iv, aad, &ciphertext)?;

    Ok((ciphertext, tag))
}

fn decrypt_cbc_hmac(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> bherror::Result<Vec<u8>, CryptoError> {
    let (mac_key, enc_key) = cek.split_at(cek.len() / 2);

    let expected_tag = cbc_hmac_tag(enc, mac_key, iv, aad, ciphertext)?;

    // constant-time tag comparison
    if tag.len() != expected_tag.len() || !memcmp::eq(tag, &expected_tag) {
        return Err(Error::root(CryptoError::DecryptionFailed).ctx("authentication tag mismatch"));
    }

    openssl::symm::decrypt(enc.cbc_cipher(), enc_key, Some(iv), ciphertext)
        .foreign_err(|| CryptoError::DecryptionFailed)
}

fn cbc_hmac_tag(
    enc: ContentEncryptionAlgorithm,
    mac_key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> bherror::Result<Vec<u8>, CryptoError> {
    let al = ((aad.len() as u64) * 8).to_be_bytes();

    let hmac = || -> Result<Vec<u8>, openssl::error::ErrorStack> {
        let key = PKey::hmac(mac_key)?;
        let mut signer = openssl::sign::Signer::new(enc.hmac_digest(), &key)?;
        signer.update(aad)?;
        signer.update(iv)?;
        signer.update(ciphertext)?;
        signer.update(&al)?;
        signer.sign_to_vec()
    };

    let mut tag = hmac().foreign_err(|| CryptoError::EncryptionFailed)?;
    tag.truncate(enc.tag_len());
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{json_object, openssl_ec_pub_key_to_jwk};

    /// Test vector from [RFC 7518, Appendix C][1].
    ///
    /// [1]: https://datatracker.ietf.org/doc/html/rfc7518#appendix-C
    #[test]
    fn concat_kdf_rfc7518_appendix_c() {
        let z = [
            158u8, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49,
            110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];

        let derived = concat_kdf(&z, "A128GCM", b"Alice", b"Bob", 16);

        assert_eq!(base64_url_encode(derived), "VqqN6vgjbSBcIijNcacQGg");
    }

    fn recipient() -> (EcKey<Private>, JwkPublic) {
        let (private, _) = generate_ephemeral_p256().unwrap();
        let public = EcKey::from_public_key(private.group(), private.public_key()).unwrap();
        let jwk = openssl_ec_pub_key_to_jwk(&public, Some("enc-kid")).unwrap();
        (private, jwk)
    }

    fn roundtrip(enc: ContentEncryptionAlgorithm) {
        let (private, jwk) = recipient();
        let payload = br#"{"vp_token":"...","state":"s1"}"#;

        let jwe =
            JweEncrypted::encrypt(payload, &jwk, enc, Some(b"mdoc-nonce"), Some(b"n3")).unwrap();

        let compact = jwe.serialize_compact();
        let parsed = JweEncrypted::parse(&compact).unwrap();
        assert_eq!(parsed, jwe);

        let decrypted = parsed.decrypt(&private).unwrap();
        assert_eq!(decrypted, payload);

        assert_eq!(parsed.apu().unwrap().unwrap(), b"mdoc-nonce");
    }

    #[test]
    fn roundtrip_a128gcm() {
        roundtrip(ContentEncryptionAlgorithm::A128Gcm);
    }

    #[test]
    fn roundtrip_a192gcm() {
        roundtrip(ContentEncryptionAlgorithm::A192Gcm);
    }

    #[test]
    fn roundtrip_a256gcm() {
        roundtrip(ContentEncryptionAlgorithm::A256Gcm);
    }

    #[test]
    fn roundtrip_a128cbc_hs256() {
        roundtrip(ContentEncryptionAlgorithm::A128CbcHs256);
    }

    #[test]
    fn roundtrip_a192cbc_hs384() {
        roundtrip(ContentEncryptionAlgorithm::A192CbcHs384);
    }

    #[test]
    fn roundtrip_a256cbc_hs512() {
        roundtrip(ContentEncryptionAlgorithm::A256CbcHs512);
    }

    #[test]
    fn tampered_ciphertext_fails_gcm() {
        let (private, jwk) = recipient();

        let mut jwe = JweEncrypted::encrypt(
            b"payload",
            &jwk,
            ContentEncryptionAlgorithm::A256Gcm,
            None,
            None,
        )
        .unwrap();

        jwe.ciphertext[0] ^= 0x01;

        let err = jwe.decrypt(&private).unwrap_err();
        assert_eq!(err.error, CryptoError::DecryptionFailed);
    }

    #[test]
    fn tampered_tag_fails_cbc() {
        let (private, jwk) = recipient();

        let mut jwe = JweEncrypted::encrypt(
            b"payload",
            &jwk,
            ContentEncryptionAlgorithm::A128CbcHs256,
            None,
            None,
        )
        .unwrap();

        jwe.auth_tag[0] ^= 0x01;

        let err = jwe.decrypt(&private).unwrap_err();
        assert_eq!(err.error, CryptoError::DecryptionFailed);
    }

    #[test]
    fn wrong_recipient_key_fails() {
        let (_, jwk) = recipient();
        let (other_private, _) = recipient();

        let jwe = JweEncrypted::encrypt(
            b"payload",
            &jwk,
            ContentEncryptionAlgorithm::A256Gcm,
            None,
            None,
        )
        .unwrap();

        assert!(jwe.decrypt(&other_private).is_err());
    }

    #[test]
    fn unknown_enc_is_rejected_on_parse() {
        let header = json_object!({"alg": "ECDH-ES", "enc": "A999GCM"});
        let header_b64 = base64_url_encode(serde_json::to_string(&header).unwrap());
        let compact = format!("{header_b64}....");

        let err = JweEncrypted::parse(&compact).unwrap_err();
        assert!(matches!(err.error, FormatError::InvalidCompactJwe(_)));
    }
}
