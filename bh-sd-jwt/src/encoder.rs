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

//! Concealing claims: turning JSON nodes into disclosures & digests.

use bherror::Error;
use rand_core::CryptoRngCore;

use crate::{
    issuer::{IssuerError, Result},
    utils::{self, ARRAY_ELEMENT_FIELD_NAME, SD_FIELD_NAME},
    Disclosure, Hasher, JsonObject, Value, RESERVED_CLAIM_NAMES,
};

/// One step on a path from the root of the claims object to a JSON node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonNodePathSegment<'a> {
    /// A key of a JSON object.
    Key(&'a str),
    /// An index into a JSON array.
    Index(usize),
}

/// A path from the root of the claims object to a JSON node.
pub type JsonNodePath<'a> = [JsonNodePathSegment<'a>];

/// [`std::fmt::Display`] adapter for a [`JsonNodePath`], rendering e.g. `$.parent.child[3]`.
#[derive(Debug)]
pub struct DisplayWrapper<'a>(pub &'a JsonNodePath<'a>);

impl std::fmt::Display for DisplayWrapper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$")?;
        for segment in self.0 {
            match segment {
                JsonNodePathSegment::Key(key) => write!(f, ".{}", key)?,
                JsonNodePathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Conceal the nodes at `disclosure_paths` within `claims`, returning the created disclosures.
///
/// Paths are processed deepest-first, so a path that extends another produces a recursive
/// disclosure (the parent's disclosure then carries the child's digest instead of the child's
/// cleartext).
pub(crate) fn encode_claims<R: CryptoRngCore + ?Sized>(
    claims: &mut JsonObject,
    disclosure_paths: &[&JsonNodePath],
    hasher: &impl Hasher,
    rng: &mut R,
) -> Result<Vec<Disclosure>> {
    validate_paths(disclosure_paths)?;

    // Deepest paths first, so that concealing a parent finds the child digests already in place.
    let mut ordered: Vec<&JsonNodePath> = disclosure_paths.to_vec();
    ordered.sort_by_key(|path| std::cmp::Reverse(path.len()));

    let mut disclosures = Vec::with_capacity(ordered.len());

    for path in ordered {
        disclosures.push(conceal_node(claims, path, hasher, rng)?);
    }

    Ok(disclosures)
}

fn validate_paths(paths: &[&JsonNodePath]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();

    for path in paths {
        match path.first() {
            // the claims root is an object, so a path may not start with an index
            None | Some(JsonNodePathSegment::Index(_)) => {
                return Err(Error::root(IssuerError::InvalidPath(
                    DisplayWrapper(path).to_string(),
                )))
            }
            Some(JsonNodePathSegment::Key(_)) => {}
        }

        for segment in path.iter() {
            if let JsonNodePathSegment::Key(key) = segment {
                if let Some(name) = RESERVED_CLAIM_NAMES.get(key) {
                    return Err(Error::root(IssuerError::ReservedOrRegisteredClaimName(
                        *name,
                    )));
                }
            }
        }

        if !seen.insert(DisplayWrapper(path).to_string()) {
            return Err(Error::root(IssuerError::DuplicatePath(
                DisplayWrapper(path).to_string(),
            )));
        }
    }

    Ok(())
}

fn conceal_node<R: CryptoRngCore + ?Sized>(
    claims: &mut JsonObject,
    path: &JsonNodePath,
    hasher: &impl Hasher,
    rng: &mut R,
) -> Result<Disclosure> {
    let non_existent = || Error::root(IssuerError::NonExistentPath(DisplayWrapper(path).to_string()));

    // `validate_paths` guarantees a non-empty path starting with a key
    let Some((last, parents)) = path.split_last() else {
        unreachable!("validated: path is non-empty");
    };

    if parents.is_empty() {
        let JsonNodePathSegment::Key(key) = last else {
            unreachable!("validated: first segment is a key");
        };
        return conceal_object_key(claims, key, path, hasher, rng);
    }

    let JsonNodePathSegment::Key(first) = parents[0] else {
        unreachable!("validated: first segment is a key");
    };

    let mut current = claims.get_mut(first).ok_or_else(non_existent)?;
    for segment in &parents[1..] {
        current = match (segment, current) {
            (JsonNodePathSegment::Key(key), Value::Object(object)) => {
                object.get_mut(*key).ok_or_else(non_existent)?
            }
            (JsonNodePathSegment::Index(index), Value::Array(array)) => {
                array.get_mut(*index).ok_or_else(non_existent)?
            }
            _ => return Err(non_existent()),
        };
    }

    match (last, current) {
        (JsonNodePathSegment::Key(key), Value::Object(object)) => {
            conceal_object_key(object, key, path, hasher, rng)
        }
        (JsonNodePathSegment::Index(index), Value::Array(array)) => {
            conceal_array_element(array, *index, path, hasher, rng)
        }
        _ => Err(non_existent()),
    }
}

fn conceal_object_key<R: CryptoRngCore + ?Sized>(
    object: &mut JsonObject,
    key: &str,
    path: &JsonNodePath,
    hasher: &impl Hasher,
    rng: &mut R,
) -> Result<Disclosure> {
    let value = object.remove(key).ok_or_else(|| {
        Error::root(IssuerError::NonExistentPath(DisplayWrapper(path).to_string()))
    })?;

    let disclosure = Disclosure::new(utils::generate_salt(rng), Some(key.to_owned()), value);
    let digest = utils::base64_url_digest(disclosure.as_str().as_bytes(), hasher);

    let sd_array = object
        .entry(SD_FIELD_NAME.to_owned())
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(sd_array) = sd_array else {
        return Err(Error::root(IssuerError::InvalidPath(format!(
            "`{}` already present and not an array",
            SD_FIELD_NAME
        ))));
    };
    sd_array.push(Value::String(digest));

    Ok(disclosure)
}

fn conceal_array_element<R: CryptoRngCore + ?Sized>(
    array: &mut [Value],
    index: usize,
    path: &JsonNodePath,
    hasher: &impl Hasher,
    rng: &mut R,
) -> Result<Disclosure> {
    let slot = array.get_mut(index).ok_or_else(|| {
        Error::root(IssuerError::NonExistentPath(DisplayWrapper(path).to_string()))
    })?;

    let value = slot.take();

    let disclosure = Disclosure::new(utils::generate_salt(rng), None, value);
    let digest = utils::base64_url_digest(disclosure.as_str().as_bytes(), hasher);

    *slot = serde_json::json!({ ARRAY_ELEMENT_FIELD_NAME: digest });

    Ok(disclosure)
}
