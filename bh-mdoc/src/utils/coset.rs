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

//! Bridging between [`coset`] types, serde, and the JWK world.

use bh_jose::{base64_url_decode, base64_url_encode, JwkPublic, SigningAlgorithm};
use bherror::traits::ForeignError as _;
use coset::{
    iana::{self, EnumI64 as _},
    CoseKey, CoseKeyBuilder, KeyType, Label,
};
use serde::{de::Error as _, ser::Error as _, Deserialize as _, Deserializer, Serializer};

use crate::{MdocError, Result};

/// Serialize a [`coset`] type through its CBOR [`ciborium::Value`] form.
pub(crate) fn serialize_coset<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: Clone + coset::AsCborValue,
    S: Serializer,
{
    let value = value
        .clone()
        .to_cbor_value()
        .map_err(|err| S::Error::custom(err.to_string()))?;

    serde::Serialize::serialize(&value, serializer)
}

/// Deserialize a [`coset`] type through its CBOR [`ciborium::Value`] form.
pub(crate) fn deserialize_coset<'de, T, D>(deserializer: D) -> std::result::Result<T, D::Error>
where
    T: coset::AsCborValue,
    D: Deserializer<'de>,
{
    let value = ciborium::Value::deserialize(deserializer)?;

    T::from_cbor_value(value).map_err(|err| D::Error::custom(err.to_string()))
}

/// Convert a COSE algorithm identifier to the corresponding JWS [`SigningAlgorithm`].
pub(crate) fn coset_alg_to_jws_alg(alg: &iana::Algorithm) -> Option<SigningAlgorithm> {
    Some(match alg {
        iana::Algorithm::ES256 => SigningAlgorithm::Es256,
        iana::Algorithm::ES384 => SigningAlgorithm::Es384,
        iana::Algorithm::ES512 => SigningAlgorithm::Es512,
        iana::Algorithm::PS256 => SigningAlgorithm::Ps256,
        iana::Algorithm::PS384 => SigningAlgorithm::Ps384,
        iana::Algorithm::PS512 => SigningAlgorithm::Ps512,
        _ => return None,
    })
}

/// Build a P-256 `COSE_Key` out of a public JWK.
///
/// Only EC keys on the P-256 curve are supported.
pub(crate) fn cose_key_from_jwk(jwk: &JwkPublic) -> Result<CoseKey> {
    let field = |name: &str| -> Result<&str> {
        jwk.get(name)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                bherror::Error::root(MdocError::InvalidPublicKey)
                    .ctx(format!("missing JWK member `{name}`"))
            })
    };

    if field("kty")? != "EC" || field("crv")? != "P-256" {
        return Err(bherror::Error::root(MdocError::InvalidPublicKey)
            .ctx("only EC keys on P-256 are supported"));
    }

    let x = base64_url_decode(field("x")?).foreign_err(|| MdocError::InvalidPublicKey)?;
    let y = base64_url_decode(field("y")?).foreign_err(|| MdocError::InvalidPublicKey)?;

    Ok(CoseKeyBuilder::new_ec2_pub_key(iana::EllipticCurve::P_256, x, y).build())
}

/// Project a P-256 `COSE_Key` back to its JWK form.
pub(crate) fn cose_key_to_jwk(key: &CoseKey) -> Result<JwkPublic> {
    if key.kty != KeyType::Assigned(iana::KeyType::EC2) {
        return Err(
            bherror::Error::root(MdocError::InvalidPublicKey).ctx("COSE key type is not EC2")
        );
    }

    let param = |label: iana::Ec2KeyParameter| -> Result<&ciborium::Value> {
        key.params
            .iter()
            .find_map(|(l, v)| (l == &Label::Int(label.to_i64())).then_some(v))
            .ok_or_else(|| {
                bherror::Error::root(MdocError::InvalidPublicKey)
                    .ctx(format!("missing COSE key parameter {:?}", label))
            })
    };

    let crv = param(iana::Ec2KeyParameter::Crv)?;
    if crv != &ciborium::Value::Integer(iana::EllipticCurve::P_256.to_i64().into()) {
        return Err(
            bherror::Error::root(MdocError::InvalidPublicKey).ctx("COSE key curve is not P-256")
        );
    }

    let coord = |label| -> Result<String> {
        let bytes = param(label)?
            .as_bytes()
            .ok_or_else(|| bherror::Error::root(MdocError::InvalidPublicKey))?;
        Ok(base64_url_encode(bytes))
    };

    Ok(bh_jose::json_object!({
        "kty": "EC",
        "crv": "P-256",
        "x": coord(iana::Ec2KeyParameter::X)?,
        "y": coord(iana::Ec2KeyParameter::Y)?,
    }))
}

/// Convert a registered-label-wrapped algorithm to the JWS form.
pub(crate) fn registered_alg_to_jws_alg(
    alg: &coset::RegisteredLabelWithPrivate<iana::Algorithm>,
) -> Option<SigningAlgorithm> {
    match alg {
        coset::RegisteredLabelWithPrivate::Assigned(alg) => coset_alg_to_jws_alg(alg),
        _ => None,
    }
}
