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

use std::result::Result as StdResult;

use bh_x509::X5Chain;
use bherror::{
    traits::{ErrorContext, ForeignError, PropagateError as _},
    Error, Result,
};
use openssl::{
    bn::{BigNum, BigNumContext},
    derive::Deriver,
    ec::{EcGroup, EcGroupRef, EcKey, EcPointRef},
    ecdsa::EcdsaSig,
    nid::Nid,
    pkey::{PKey, Private, Public},
    sha::{sha256, sha384, sha512},
};

use super::{utils, HasJwkKid, HasX5Chain, SignatureVerifier, Signer, SigningAlgorithm};
use crate::{
    error::{CryptoError, FormatError},
    json_object, BoxError, JwkPublic,
};

type EcPrivate = EcKey<Private>;
type EcPublic = EcKey<Public>;

/// A 32-byte coordinate for the elliptic curve.
pub type Coordinate = [u8; 32];

// X9_62_PRIME256V1 is basically an alias for secp256r1
//
// ------------------------------------------
//           Curve names chosen by
//      different standards organizations
// ------------+---------------+-------------
// SECG        |  ANSI X9.62   |  NIST
// ------------+---------------+-------------
// secp256r1   |  prime256v1   |   NIST P-256
//
// source: https://tools.ietf.org/search/rfc4492#appendix-A
pub(crate) const ELLIPTIC_CURVE_NID: Nid = Nid::X9_62_PRIME256V1;

const CRV: &str = "P-256";
const ALG: &str = "ES256";
const KTY: &str = "EC";

/// [`Signer`] implementation supporting the `ES256` algorithm (ECDSA using the P-256 curve and
/// the SHA-256 hash function).
pub struct Es256Signer {
    private_key: EcPrivate,
    kid: String,
}

impl Es256Signer {
    /// Generate a fresh `ES256` key with the given `kid` field when presented as a JWK.
    pub fn generate(kid: String) -> Result<Self, CryptoError> {
        let ec_group = EcGroup::from_curve_name(ELLIPTIC_CURVE_NID)
            .foreign_err(|| CryptoError::CryptoBackend)?;
        let private_key = EcKey::<Private>::generate(ec_group.as_ref())
            .foreign_err(|| CryptoError::KeyGenerationFailed)?;

        Ok(Self { private_key, kid })
    }

    /// Create an `ES256` signer from a private key in the PEM format.
    pub fn from_private_key_pem(kid: String, private_key_pem: &[u8]) -> Result<Self, CryptoError> {
        let private_key = EcPrivate::private_key_from_pem(private_key_pem)
            .foreign_err(|| CryptoError::CryptoBackend)?;

        Ok(Self { private_key, kid })
    }

    /// Return the private key in the PEM format.
    pub fn private_key_pem(&self) -> Result<Vec<u8>, CryptoError> {
        self.private_key
            .private_key_to_pem()
            .foreign_err(|| CryptoError::CryptoBackend)
    }

    /// Borrow the underlying EC private key, e.g. for ECDH key agreement.
    pub fn ec_key(&self) -> &EcKey<Private> {
        &self.private_key
    }

    /// Construct a JWK JSON object for the public counterpart of this key.  It will use the
    /// `kid` field set at construction.
    pub fn public_jwk(&self) -> Result<JwkPublic, CryptoError> {
        let (x_bytes, y_bytes) =
            to_affine_coords(self.private_key.public_key(), self.private_key.group())?;

        Ok(ec_public_affine_coords_to_jwk(
            &x_bytes,
            &y_bytes,
            Some(&self.kid),
        ))
    }
}

impl Signer for Es256Signer {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Es256
    }

    fn sign(&self, message: &[u8]) -> StdResult<Vec<u8>, BoxError> {
        let digest = sha256(message);
        let signature = EcdsaSig::sign(&digest, self.private_key.as_ref())?;

        // The unwraps are safe, as we've requested a vector of the exact same size as the array
        let r: Box<[u8; 32]> = signature.r().to_vec_padded(32)?.try_into().unwrap();
        let s: Box<[u8; 32]> = signature.s().to_vec_padded(32)?.try_into().unwrap();
        let mut jws = (r as Box<[_]>).into_vec();
        jws.extend_from_slice(&*s);
        Ok(jws)
    }

    fn public_jwk(&self) -> StdResult<JwkPublic, BoxError> {
        Ok(self.public_jwk()?)
    }
}

impl HasJwkKid for Es256Signer {
    fn jwk_kid(&self) -> &str {
        &self.kid
    }
}

/// A [`Signer`] paired with an X.509 certificate chain whose leaf certifies the signing key.
pub struct SignerWithChain<S> {
    signer: S,
    x5chain: X5Chain,
}

impl<S: Signer> SignerWithChain<S> {
    /// Pair an existing signer with its certificate chain.
    ///
    /// No check is performed that the chain's leaf actually certifies the signer's key.
    pub fn new(signer: S, x5chain: X5Chain) -> Self {
        Self { signer, x5chain }
    }
}

impl SignerWithChain<Es256Signer> {
    /// Generate a fresh `ES256` key together with a self-signed single-certificate chain.
    ///
    /// When `san_dns` is provided, the certificate carries a SAN dNSName extension, as required
    /// for the `x509_san_dns` client identifier scheme.
    pub fn generate(
        kid: String,
        common_name: &str,
        san_dns: Option<&str>,
    ) -> Result<Self, CryptoError> {
        let signer = Es256Signer::generate(kid)?;

        let x5chain = X5Chain::self_signed(&signer.private_key_pem()?, common_name, san_dns)
            .with_err(|| CryptoError::InvalidX5Chain)?;

        Ok(Self { signer, x5chain })
    }

    /// Borrow the wrapped [`Es256Signer`].
    pub fn signer(&self) -> &Es256Signer {
        &self.signer
    }
}

impl<S: Signer> Signer for SignerWithChain<S> {
    fn algorithm(&self) -> SigningAlgorithm {
        self.signer.algorithm()
    }

    fn sign(&self, message: &[u8]) -> StdResult<Vec<u8>, BoxError> {
        self.signer.sign(message)
    }

    fn public_jwk(&self) -> StdResult<JwkPublic, BoxError> {
        self.signer.public_jwk()
    }
}

impl<S: Signer> HasX5Chain for SignerWithChain<S> {
    fn x5chain(&self) -> X5Chain {
        self.x5chain.clone()
    }
}

impl<S: Signer + HasJwkKid> HasJwkKid for SignerWithChain<S> {
    fn jwk_kid(&self) -> &str {
        self.signer.jwk_kid()
    }
}

/// [`SignatureVerifier`] implementation supporting the `ES256` algorithm (ECDSA using the P-256
/// curve and the SHA-256 hash function).
#[derive(Default)]
pub struct Es256Verifier;

impl SignatureVerifier for Es256Verifier {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Es256
    }

    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &JwkPublic,
    ) -> StdResult<bool, BoxError> {
        let public_key = public_key_from_jwk_es256(public_key)?;
        let jws_bytes = <&[u8; 64]>::try_from(signature)?;
        let (r, s) = jws_bytes.split_at(32);
        let r = BigNum::from_slice(r)?;
        let s = BigNum::from_slice(s)?;
        let ecdsa_sig = EcdsaSig::from_private_components(r, s)?;

        let digest = sha256(message);

        Ok(ecdsa_sig.verify(&digest, public_key.as_ref())?)
    }
}

/// Returns the affine coordinates of the public key.
fn to_affine_coords(
    point: &EcPointRef,
    group: &EcGroupRef,
) -> Result<(Box<Coordinate>, Box<Coordinate>), CryptoError> {
    let mut x = BigNum::new().foreign_err(|| CryptoError::CryptoBackend)?;
    let mut y = BigNum::new().foreign_err(|| CryptoError::CryptoBackend)?;
    let mut ctx = BigNumContext::new().foreign_err(|| CryptoError::CryptoBackend)?;
    point
        .affine_coordinates(group, &mut x, &mut y, &mut ctx)
        .foreign_err(|| CryptoError::CryptoBackend)?;

    // The unwraps are safe, as we choose the length correctly
    let x = x
        .to_vec_padded(32)
        .foreign_err(|| CryptoError::CryptoBackend)?
        .try_into()
        .unwrap();
    let y = y
        .to_vec_padded(32)
        .foreign_err(|| CryptoError::CryptoBackend)?
        .try_into()
        .unwrap();
    Ok((x, y))
}

/// Construct a JWK JSON object for this public key.
/// **Note**: only ECDSA keys using the P-256 curve are supported!
pub fn openssl_ec_pub_key_to_jwk(
    key: &EcKey<Public>,
    kid: Option<&str>,
) -> Result<JwkPublic, CryptoError> {
    let (x_bytes, y_bytes) = to_affine_coords(key.public_key(), key.group())?;
    Ok(ec_public_affine_coords_to_jwk(&x_bytes, &y_bytes, kid))
}

/// Constructs the JWK from the coordinates of the public ECDSA key using the P-256 curve.
///
/// **Note**: this function **DOES NOT** check that the coordinates are valid.
pub fn ec_public_affine_coords_to_jwk(
    x_bytes: &[u8; 32],
    y_bytes: &[u8; 32],
    kid: Option<&str>,
) -> JwkPublic {
    let x = utils::base64_url_encode(x_bytes);
    let y = utils::base64_url_encode(y_bytes);

    let mut jwk = json_object!({
        "kty": KTY,
        "alg": ALG,
        "use": "sig",
        "crv": CRV,
        "x": x,
        "y": y,
    });

    if let Some(kid) = kid {
        jwk.insert("kid".to_owned(), serde_json::Value::String(kid.to_owned()));
    }

    jwk
}

/// Parse a P-256 public key out of a JWK.
pub fn public_key_from_jwk_es256(public_key: &JwkPublic) -> Result<EcPublic, FormatError> {
    check_jwk_field(public_key, "kty", KTY)?;
    check_jwk_field(public_key, "crv", CRV)?;

    let x = parse_coord(public_key, "x")?;
    let x = BigNum::from_slice(check_len(&x)?)
        .foreign_err(|| FormatError::JwkParsingFailed("Failed to construct BigNum".to_string()))?;
    let y = parse_coord(public_key, "y")?;
    let y = BigNum::from_slice(check_len(&y)?)
        .foreign_err(|| FormatError::JwkParsingFailed("Failed to construct BigNum".to_string()))?;

    // The unwrap is safe because we always use the same curve.
    let group = EcGroup::from_curve_name(ELLIPTIC_CURVE_NID).unwrap();
    let public_key =
        EcPublic::from_public_key_affine_coordinates(group.as_ref(), x.as_ref(), y.as_ref())
            .foreign_err(|| {
                FormatError::JwkParsingFailed("coordinate construction failed".to_string())
            })?;
    Ok(public_key)
}

/// Perform ECDH key agreement between `private` and the P-256 public key in `peer_jwk`,
/// returning the shared secret `Z`.
pub fn ecdh_shared_secret(
    private: &EcKey<Private>,
    peer_jwk: &JwkPublic,
) -> Result<Vec<u8>, CryptoError> {
    let peer = public_key_from_jwk_es256(peer_jwk)
        .with_err(|| CryptoError::CryptoBackend)
        .ctx(|| "invalid peer JWK")?;

    let derive = || -> StdResult<Vec<u8>, openssl::error::ErrorStack> {
        let private = PKey::from_ec_key(private.clone())?;
        let peer = PKey::from_ec_key(peer.clone())?;

        let mut deriver = Deriver::new(&private)?;
        deriver.set_peer(&peer)?;
        deriver.derive_to_vec()
    };

    derive()
        .foreign_err(|| CryptoError::CryptoBackend)
        .ctx(|| "ECDH key agreement failed")
}

/// Generate an ephemeral P-256 key pair, returning the private key and the public JWK (without
/// `alg`/`use`/`kid` members, as appropriate for an `epk` header value).
pub fn generate_ephemeral_p256() -> Result<(EcKey<Private>, JwkPublic), CryptoError> {
    let group =
        EcGroup::from_curve_name(ELLIPTIC_CURVE_NID).foreign_err(|| CryptoError::CryptoBackend)?;
    let private =
        EcKey::<Private>::generate(&group).foreign_err(|| CryptoError::KeyGenerationFailed)?;

    let (x, y) = to_affine_coords(private.public_key(), private.group())?;
    let epk = json_object!({
        "kty": KTY,
        "crv": CRV,
        "x": utils::base64_url_encode(*x),
        "y": utils::base64_url_encode(*y),
    });

    Ok((private, epk))
}

/// Fill a buffer of `n` cryptographically secure random bytes.
pub fn secure_random(n: usize) -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; n];
    openssl::rand::rand_bytes(&mut bytes).foreign_err(|| CryptoError::CryptoBackend)?;
    Ok(bytes)
}

fn check_len(coord: &[u8]) -> Result<&[u8; 32], FormatError> {
    <&[u8; 32]>::try_from(coord)
        .foreign_err(|| FormatError::JwkParsingFailed("parsing coord failed".to_string()))
        .ctx(|| format!("check len of {:?} failed", coord))
}

fn check_jwk_field(
    public_key: &JwkPublic,
    field: &str,
    expected_value: &str,
) -> Result<(), FormatError> {
    let error = |message| Error::root(FormatError::JwkParsingFailed(message));

    let value = public_key
        .get(field)
        .ok_or_else(|| error(format!("missing \"{}\" field", field)))?;

    if value == expected_value {
        return Ok(());
    }

    Err(error(format!("incorrect value on \"{}\" field", field))).ctx(|| {
        format!(
            "value on field \"{}\" was {}, expected {}",
            field, value, expected_value
        )
    })
}

fn parse_coord(public_key: &JwkPublic, coord: &str) -> Result<Vec<u8>, FormatError> {
    let error = |message| bherror::Error::root(FormatError::JwkParsingFailed(message));

    let coord = public_key
        .get(coord)
        .ok_or_else(|| error(format!("fetching coordinate {} failed", coord)))?;
    let base64_coord = coord
        .as_str()
        .ok_or_else(|| error("coord not str".to_string()))
        .ctx(|| format!("coord {0} as str failed", coord))?;
    utils::base64_url_decode(base64_coord)
        .foreign_err(|| FormatError::JwkParsingFailed("decoding coord failed".to_string()))
        .ctx(|| format!("decoding coord {0} failed", base64_coord))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn simple_verify_setup() -> (JwkPublic, [u8; 25], Vec<u8>) {
        let signer = Es256Signer::generate("test key id".to_owned()).unwrap();
        let public_jwk = signer.public_jwk().unwrap();

        let message = b"Test message to be signed";
        let signature = Signer::sign(&signer, message).unwrap();

        (public_jwk, *message, signature)
    }

    #[test]
    fn sign_verify_bytes() {
        let (public_jwk, message, signature) = simple_verify_setup();

        assert!(Es256Verifier
            .verify(&message, &signature, &public_jwk)
            .unwrap());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let (public_jwk, mut message, signature) = simple_verify_setup();

        message[0] ^= 0x01;

        assert!(!Es256Verifier
            .verify(&message, &signature, &public_jwk)
            .unwrap());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let (public_jwk, message, mut signature) = simple_verify_setup();

        signature[10] ^= 0x01;

        assert!(!Es256Verifier
            .verify(&message, &signature, &public_jwk)
            .unwrap());
    }

    #[test]
    fn invalid_jwk_missing_kty_field() {
        let (mut public_jwk, message, signature) = simple_verify_setup();

        public_jwk.remove("kty");

        let error = Es256Verifier
            .verify(&message, &signature, &public_jwk)
            .unwrap_err();

        assert_eq!(
            error
                .downcast::<bherror::Error<FormatError>>()
                .unwrap()
                .error,
            FormatError::JwkParsingFailed("missing \"kty\" field".to_string())
        );
    }

    #[test]
    fn invalid_jwk_incorrect_kty_field() {
        let (mut public_jwk, message, signature) = simple_verify_setup();

        public_jwk.insert("kty".to_string(), Value::String("bla".to_string()));

        let error = Es256Verifier
            .verify(&message, &signature, &public_jwk)
            .unwrap_err();

        assert_eq!(
            error
                .downcast::<bherror::Error<FormatError>>()
                .unwrap()
                .error,
            FormatError::JwkParsingFailed("incorrect value on \"kty\" field".to_string())
        );
    }

    #[test]
    fn ecdh_shared_secret_is_symmetric() {
        let (alice_private, alice_jwk) = generate_ephemeral_p256().unwrap();
        let (bob_private, bob_jwk) = generate_ephemeral_p256().unwrap();

        let z_alice = ecdh_shared_secret(&alice_private, &bob_jwk).unwrap();
        let z_bob = ecdh_shared_secret(&bob_private, &alice_jwk).unwrap();

        assert_eq!(z_alice, z_bob);
        assert_eq!(z_alice.len(), 32);
    }

    #[test]
    fn secure_random_produces_distinct_outputs() {
        let a = secure_random(32).unwrap();
        let b = secure_random(32).unwrap();

        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
