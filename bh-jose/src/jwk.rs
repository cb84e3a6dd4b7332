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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object meant to represent a public JWK.
///
/// Since this is a type alias, no aspects of the schema are enforced; this is left to any
/// end-consumers of the public key, such as [`SignatureVerifier`](crate::SignatureVerifier).
pub type JwkPublic = Map<String, Value>;

/// Models a JWK Set ([RFC 7517, section 5][RFC]).
///
/// If any of the JWKs in the set carries a `kid` parameter then all of them must, and the `kid`
/// values must be distinct.
///
/// [RFC]: https://datatracker.ietf.org/doc/html/rfc7517#section-5
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "JwkSetUnverified")]
pub struct JwkSet {
    /// Underlying representation of the JWK Set.
    pub keys: Vec<JwkPublic>,
}

impl JwkSet {
    /// Create an empty `JwkSet`.
    pub fn empty() -> Self {
        JwkSet { keys: vec![] }
    }

    /// Return the first key whose `use` parameter designates encryption (`"enc"`), or, failing
    /// that, the first key without a `use` parameter.
    ///
    /// This is the selection rule for picking the response-encryption key out of a verifier's
    /// `client_metadata.jwks`.
    pub fn encryption_key(&self) -> Option<&JwkPublic> {
        self.keys
            .iter()
            .find(|jwk| jwk.get("use").and_then(Value::as_str) == Some("enc"))
            .or_else(|| self.keys.iter().find(|jwk| !jwk.contains_key("use")))
    }
}

/// "Shadow" type to verify validity of a deserialized [`JwkSet`] without writing the
/// deserialization manually; see <https://github.com/serde-rs/serde/issues/642>.
#[derive(Deserialize, Debug)]
struct JwkSetUnverified {
    keys: Vec<JwkPublic>,
}

impl TryFrom<JwkSetUnverified> for JwkSet {
    type Error = &'static str;

    fn try_from(value: JwkSetUnverified) -> std::result::Result<Self, Self::Error> {
        let keys = value.keys;
        let jwk_with_kid_cnt = keys.iter().filter(|jwk| jwk.contains_key("kid")).count();

        if jwk_with_kid_cnt == 0 {
            return Ok(JwkSet { keys });
        }
        if jwk_with_kid_cnt != keys.len() {
            return Err("Some of the provided JWKs contain kid parameter values and some don't");
        }

        let mut uniq = HashSet::new();
        for key in keys.iter() {
            if !uniq.insert(
                key.get("kid")
                    .unwrap() // safe unwrap because all JWKs contain a `kid` value
                    .as_str()
                    .ok_or("JWK contains a `kid` parameter that is not a string")?,
            ) {
                return Err("Provided JWKs contain duplicate kid parameter values");
            }
        }

        Ok(JwkSet { keys })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn jwk_set_with_distinct_kids_parses() {
        let jwk_set = json!({"keys": [
            {"kty": "EC", "kid": "1"},
            {"kty": "EC", "kid": "2"},
        ]});

        let set: JwkSet = serde_json::from_value(jwk_set).unwrap();
        assert_eq!(set.keys.len(), 2);
    }

    #[test]
    fn duplicate_kids_are_rejected() {
        let jwk_set = json!({"keys": [
            {"kid": "1"},
            {"kid": "1"},
        ]});

        let error = serde_json::from_value::<JwkSet>(jwk_set).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Provided JWKs contain duplicate kid parameter values"
        );
    }

    #[test]
    fn mixed_kid_presence_is_rejected() {
        let jwk_set = json!({"keys": [
            {"kid": "1"},
            {"kty": "EC"},
        ]});

        let error = serde_json::from_value::<JwkSet>(jwk_set).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Some of the provided JWKs contain kid parameter values and some don't"
        );
    }

    #[test]
    fn encryption_key_prefers_enc_use() {
        let jwk_set = json!({"keys": [
            {"kty": "EC", "use": "sig", "kid": "1"},
            {"kty": "EC", "use": "enc", "kid": "2"},
        ]});

        let set: JwkSet = serde_json::from_value(jwk_set).unwrap();
        let enc = set.encryption_key().unwrap();
        assert_eq!(enc.get("kid").unwrap(), "2");
    }

    #[test]
    fn encryption_key_falls_back_to_unrestricted() {
        let jwk_set = json!({"keys": [
            {"kty": "EC", "use": "sig", "kid": "1"},
            {"kty": "EC", "kid": "2"},
        ]});

        let set: JwkSet = serde_json::from_value(jwk_set).unwrap();
        let enc = set.encryption_key().unwrap();
        assert_eq!(enc.get("kid").unwrap(), "2");
    }
}
