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

use std::collections::HashSet;

use bh_jose::{base64_url_decode, base64_url_encode, JwkPublic};
use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use serde::{Deserialize, Serialize};

use crate::{error::FormatError, Value};

/// Base64url encoded disclosure hash salt.
pub type Salt = String;

/// Base64url encoded hash value.
pub type Digest = String;

/// The `cnf` claim carrying the holder's public key for key binding, as specified in
/// [RFC 7800, section 3.2][1].
///
/// [1]: https://datatracker.ietf.org/doc/html/rfc7800#section-3.2
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CnfClaim {
    /// Holder's public JWK.
    pub jwk: JwkPublic,
}

lazy_static::lazy_static! {
    /// Claim names with structural meaning inside an SD-JWT payload.  These may never be
    /// selectively disclosed nor appear as custom claims.
    pub static ref RESERVED_CLAIM_NAMES: HashSet<&'static str> = {
        ["_sd", "...", "_sd_alg"].into_iter().collect()
    };
}

/// A disclosure for a JSON node, in both parsed form and the original serialized form.
///
/// The serialized form is what travels in the tilde-separated presentation, and what the digest
/// is computed over; it is therefore preserved byte for byte.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Disclosure {
    pub(crate) data: DisclosureData,
    // serialized-as-hashed
    serialized: String,
}

/// Parsed form of a disclosure.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum DisclosureData {
    /// A key-value pair disclosure, concealing an object property.
    KeyValue {
        /// Disclosure hash salt.
        salt: Salt,
        /// Key (claim name) of the disclosure.
        key: String,
        /// Value of the disclosure.
        value: Value,
    },
    /// An array element disclosure, referenced via an `{"...": digest}` placeholder.
    ArrayElement {
        /// Disclosure hash salt.
        salt: Salt,
        /// Value of the disclosure.
        value: Value,
    },
}

impl Disclosure {
    /// Construct a new [`Disclosure`] from the given `salt`, optional `claim_name` and
    /// `claim_value`.
    ///
    /// With a `claim_name` the disclosure conceals an object property; without one it conceals
    /// an array element.
    pub fn new(salt: Salt, claim_name: Option<String>, claim_value: Value) -> Self {
        // The serialization mirrors the IETF draft examples: `", "` separators, claim value in
        // compact JSON.
        let input = if let Some(name) = &claim_name {
            format!("[\"{}\", \"{}\", {}]", &salt, &name, &claim_value)
        } else {
            format!("[\"{}\", {}]", &salt, &claim_value)
        };

        let serialized = base64_url_encode(input);

        let data = if let Some(key) = claim_name {
            DisclosureData::KeyValue {
                salt,
                key,
                value: claim_value,
            }
        } else {
            DisclosureData::ArrayElement {
                salt,
                value: claim_value,
            }
        };

        Self { data, serialized }
    }

    /// Disclosure data value.
    pub fn value(&self) -> &Value {
        match &self.data {
            DisclosureData::KeyValue { value, .. } => value,
            DisclosureData::ArrayElement { value, .. } => value,
        }
    }

    /// Disclosure data key, i.e. claim name.  [`None`] for array element disclosures.
    pub fn claim_name(&self) -> Option<&str> {
        match &self.data {
            DisclosureData::KeyValue { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Serialized form of [`Self`].
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Serialize [`Self`] into an owned [`String`].
    pub fn into_string(self) -> String {
        self.serialized
    }
}

impl TryFrom<String> for Disclosure {
    type Error = Error<FormatError>;

    fn try_from(serialized: String) -> Result<Self, Self::Error> {
        let decoded = base64_url_decode(&serialized)
            .foreign_err(|| {
                FormatError::InvalidDisclosure("provided string is not base64".to_string())
            })
            .ctx(|| serialized.clone())?;

        let array: Vec<Value> = serde_json::from_slice(&decoded)
            .foreign_err(|| {
                FormatError::InvalidDisclosure("decoded string is not a JSON array".to_string())
            })
            .ctx(|| serialized.clone())?;

        let data = match array.len() {
            3 => {
                let [salt, key, value] = array.try_into().unwrap();
                disclosure_data_key_value(salt, key, value)
            }
            2 => {
                let [salt, value] = array.try_into().unwrap();
                disclosure_data_array_element(salt, value)
            }
            n => Err(Error::root(FormatError::InvalidDisclosure(format!(
                "deserialized disclosure array has invalid length {}",
                n,
            )))),
        }
        .ctx(|| serialized.clone())?;

        Ok(Self { data, serialized })
    }
}

fn disclosure_data_key_value(
    salt: Value,
    key: Value,
    value: Value,
) -> crate::Result<DisclosureData, FormatError> {
    let Value::String(salt) = salt else {
        return Err(Error::root(FormatError::InvalidDisclosure(
            "salt value is not a string".to_string(),
        )));
    };
    let Value::String(key) = key else {
        return Err(Error::root(FormatError::InvalidDisclosure(
            "key value is not a string".to_string(),
        )));
    };

    Ok(DisclosureData::KeyValue { salt, key, value })
}

fn disclosure_data_array_element(
    salt: Value,
    value: Value,
) -> crate::Result<DisclosureData, FormatError> {
    let Value::String(salt) = salt else {
        return Err(Error::root(FormatError::InvalidDisclosure(
            "salt value is not a string".to_string(),
        )));
    };

    Ok(DisclosureData::ArrayElement { salt, value })
}

impl std::fmt::Display for Disclosure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            DisclosureData::KeyValue { salt, key, value } => {
                write!(f, "[{}, {}, {}]", salt, key, value)
            }
            DisclosureData::ArrayElement { salt, value } => write!(f, "[{}, {}]", salt, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn test_disclosure_encode_and_parse(
        salt: &str,
        claim_name: Option<&str>,
        claim_value: Value,
        encoded: &str,
    ) {
        let disclosure =
            Disclosure::new(salt.to_owned(), claim_name.map(str::to_owned), claim_value);

        assert_eq!(disclosure.as_str(), encoded);

        let parsed = Disclosure::try_from(encoded.to_owned()).unwrap();

        assert_eq!(parsed, disclosure);
    }

    /// Example taken from [the SD-JWT draft, section 5.2.1][1].
    ///
    /// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-07#section-5.2.1-5
    #[test]
    fn disclosure_object_property() {
        test_disclosure_encode_and_parse(
            "_26bc4LT-ac6q2KI6cBW5es",
            Some("family_name"),
            Value::String("Möbius".to_owned()),
            "WyJfMjZiYzRMVC1hYzZxMktJNmNCVzVlcyIsICJmYW1pbHlfbmFtZSIsICJNw7ZiaXVzIl0",
        )
    }

    /// Example taken from [the SD-JWT draft, section 5.2.2][1].
    ///
    /// [1]: https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt-07#section-5.2.2-4
    #[test]
    fn disclosure_array_element() {
        test_disclosure_encode_and_parse(
            "lklxF5jMYlGTPUovMNIvCA",
            None,
            Value::String("FR".to_owned()),
            "WyJsa2x4RjVqTVlsR1RQVW92TU5JdkNBIiwgIkZSIl0",
        )
    }

    #[test]
    fn invalid_disclosure_not_base64() {
        let decoded = Disclosure::try_from("bla".to_string());

        assert_eq!(
            decoded.unwrap_err().error,
            FormatError::InvalidDisclosure("provided string is not base64".to_string())
        )
    }

    #[test]
    fn invalid_disclosure_wrong_arity() {
        for input in [json!(["salt-only"]), json!(["salt", "name", 5, "extra"])] {
            let encoded = base64_url_encode(input.to_string());

            let decoded = Disclosure::try_from(encoded);

            assert_matches::assert_matches!(
                decoded.unwrap_err().error,
                FormatError::InvalidDisclosure(m) if m.starts_with("deserialized disclosure array")
            );
        }
    }

    #[test]
    fn invalid_disclosure_salt_not_a_string() {
        let encoded = base64_url_encode(json!([{}, 10.0]).to_string());

        let decoded = Disclosure::try_from(encoded);

        assert_eq!(
            decoded.unwrap_err().error,
            FormatError::InvalidDisclosure("salt value is not a string".to_string())
        );
    }

    #[test]
    fn invalid_disclosure_key_not_a_string() {
        let encoded = base64_url_encode(json!(["salt", {}, 10.0]).to_string());

        let decoded = Disclosure::try_from(encoded);

        assert_eq!(
            decoded.unwrap_err().error,
            FormatError::InvalidDisclosure("key value is not a string".to_string())
        );
    }
}
