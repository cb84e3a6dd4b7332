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

//! Reconstructing cleartext claims from an issuer JWT payload and a set of disclosures.

use std::collections::{HashMap, HashSet};

use bherror::Error;

use crate::{
    error::DecodingError,
    utils::{self, ARRAY_ELEMENT_FIELD_NAME, SD_ALG_FIELD_NAME, SD_FIELD_NAME},
    Digest, Disclosure, DisclosureData, Hasher, JsonObject, Value,
};

type Result<T> = bherror::Result<T, DecodingError>;

/// Reconstruct the cleartext claims object from the (signature-verified) issuer JWT custom
/// claims and the presented disclosures.
///
/// Digests present in the JWT without a matching disclosure are silently ignored (those claims
/// simply stay concealed).  Each presented disclosure, however, **must** be referenced exactly
/// once, and each digest may appear at most once across all `_sd` arrays and array-element
/// placeholders.
pub(crate) fn decode_disclosed_claims(
    claims: &JsonObject,
    disclosures: &[Disclosure],
    hasher: &impl Hasher,
) -> Result<JsonObject> {
    let mut decoder = Decoder {
        disclosure_by_digest: disclosure_table(disclosures, hasher)?,
        seen_digests: HashSet::new(),
        used_digests: HashSet::new(),
    };

    let decoded = decoder.decode_object(claims)?;

    // every presented disclosure must have been consumed
    for (digest, disclosure) in &decoder.disclosure_by_digest {
        if !decoder.used_digests.contains(digest) {
            return Err(Error::root(DecodingError::UnreferencedDisclosure(
                disclosure.as_str().to_owned(),
            )));
        }
    }

    Ok(decoded)
}

fn disclosure_table<'a>(
    disclosures: &'a [Disclosure],
    hasher: &impl Hasher,
) -> Result<HashMap<Digest, &'a Disclosure>> {
    let mut table = HashMap::new();
    for disclosure in disclosures {
        let digest = utils::base64_url_digest(disclosure.as_str().as_bytes(), hasher);
        if table.insert(digest, disclosure).is_some() {
            return Err(Error::root(DecodingError::DisclosureDigestCollision));
        }
    }
    Ok(table)
}

struct Decoder<'a> {
    disclosure_by_digest: HashMap<Digest, &'a Disclosure>,
    /// Every digest referenced anywhere in the JWT; duplicates are an error.
    seen_digests: HashSet<Digest>,
    /// The subset of `seen_digests` with a matching presented disclosure.
    used_digests: HashSet<Digest>,
}

impl Decoder<'_> {
    fn decode_object(&mut self, object: &JsonObject) -> Result<JsonObject> {
        let mut decoded = JsonObject::new();

        for (key, value) in object {
            if key == SD_FIELD_NAME || key == SD_ALG_FIELD_NAME {
                continue;
            }
            decoded.insert(key.clone(), self.decode_value(value)?);
        }

        if let Some(sd) = object.get(SD_FIELD_NAME) {
            let Value::Array(digests) = sd else {
                return Err(Error::root(DecodingError::MalformedSdStructure(format!(
                    "`{}` is not an array",
                    SD_FIELD_NAME
                ))));
            };

            for digest in digests {
                let Value::String(digest) = digest else {
                    return Err(Error::root(DecodingError::MalformedSdStructure(format!(
                        "`{}` contains a non-string digest",
                        SD_FIELD_NAME
                    ))));
                };

                self.record_digest(digest)?;

                let Some(disclosure) = self.disclosure_by_digest.get(digest.as_str()) else {
                    // stays concealed
                    continue;
                };
                let disclosure = *disclosure;

                let DisclosureData::KeyValue { key, value, .. } = &disclosure.data else {
                    return Err(Error::root(DecodingError::MisplacedDisclosure(
                        disclosure.as_str().to_owned(),
                    )));
                };

                self.used_digests.insert(digest.clone());

                let value = self.decode_value(value)?;
                if decoded.insert(key.clone(), value).is_some() {
                    return Err(Error::root(DecodingError::ClaimCollision(key.clone())));
                }
            }
        }

        Ok(decoded)
    }

    fn decode_value(&mut self, value: &Value) -> Result<Value> {
        match value {
            Value::Object(object) => Ok(Value::Object(self.decode_object(object)?)),
            Value::Array(array) => self.decode_array(array),
            scalar => Ok(scalar.clone()),
        }
    }

    fn decode_array(&mut self, array: &[Value]) -> Result<Value> {
        let mut decoded = Vec::with_capacity(array.len());

        for element in array {
            let Some(placeholder) = array_element_placeholder(element)? else {
                decoded.push(self.decode_value(element)?);
                continue;
            };

            self.record_digest(placeholder)?;

            let Some(disclosure) = self.disclosure_by_digest.get(placeholder) else {
                // a concealed, non-disclosed element is dropped from the reconstruction
                continue;
            };
            let disclosure = *disclosure;

            let DisclosureData::ArrayElement { value, .. } = &disclosure.data else {
                return Err(Error::root(DecodingError::MisplacedDisclosure(
                    disclosure.as_str().to_owned(),
                )));
            };

            self.used_digests.insert(placeholder.to_owned());

            decoded.push(self.decode_value(value)?);
        }

        Ok(Value::Array(decoded))
    }

    fn record_digest(&mut self, digest: &str) -> Result<()> {
        if !self.seen_digests.insert(digest.to_owned()) {
            return Err(Error::root(DecodingError::DuplicateDigest(
                digest.to_owned(),
            )));
        }
        Ok(())
    }
}

/// Return the digest of an `{"...": digest}` array-element placeholder, or [`None`] when the
/// element is ordinary data.
fn array_element_placeholder(element: &Value) -> Result<Option<&str>> {
    let Value::Object(object) = element else {
        return Ok(None);
    };
    let Some(digest) = object.get(ARRAY_ELEMENT_FIELD_NAME) else {
        return Ok(None);
    };

    // per the draft, a placeholder object must contain nothing but the `...` key
    if object.len() != 1 {
        return Err(Error::root(DecodingError::MalformedSdStructure(format!(
            "`{}` placeholder with extra keys",
            ARRAY_ELEMENT_FIELD_NAME
        ))));
    }

    let Value::String(digest) = digest else {
        return Err(Error::root(DecodingError::MalformedSdStructure(format!(
            "`{}` placeholder digest is not a string",
            ARRAY_ELEMENT_FIELD_NAME
        ))));
    };

    Ok(Some(digest))
}
