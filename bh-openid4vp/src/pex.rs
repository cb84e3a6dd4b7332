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

//! The subset of the [DIF Presentation Exchange v2][1] data model used by OpenID4VP, plus the
//! minimal JSONPath dialect needed to evaluate it.
//!
//! The JSONPath support is deliberately restricted to what descriptor maps and constraint
//! fields actually use: `$`, `.key`, `['key']` and `[index]`.
//!
//! [1]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::JsonObject;

/// The credential format identifier for W3C VC-JWTs.
pub const FORMAT_JWT_VC: &str = "jwt_vc";
/// The credential format identifier for SD-JWT VCs.
pub const FORMAT_VC_SD_JWT: &str = "vc+sd-jwt";
/// The legacy credential format identifier for SD-JWT VCs, accepted on input.
pub const FORMAT_JWT_SD: &str = "jwt_sd";
/// The credential format identifier for ISO mdocs.
pub const FORMAT_MSO_MDOC: &str = "mso_mdoc";

/// A `presentation_definition`: what the verifier asks the wallet to present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationDefinition {
    /// Identifier echoed back in the submission's `definition_id`.
    pub id: String,

    /// One descriptor per requested credential.
    pub input_descriptors: Vec<InputDescriptor>,
}

impl PresentationDefinition {
    /// A definition with a fresh UUID identifier.
    pub fn new(input_descriptors: Vec<InputDescriptor>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input_descriptors,
        }
    }
}

/// A single requested credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Identifier echoed back in the submission's descriptor map.
    pub id: String,

    /// The acceptable credential formats, keyed by format identifier (e.g. `vc+sd-jwt`), with
    /// format-specific algorithm parameters as values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<JsonObject>,

    /// Constraints on the claims of the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

impl InputDescriptor {
    /// A descriptor requesting `format` with constraint fields selecting the given claim
    /// paths.
    pub fn new(id: String, format: &str, claim_paths: &[&str]) -> Self {
        let mut format_container = JsonObject::new();
        format_container.insert(format.to_owned(), serde_json::json!({}));

        let fields = claim_paths
            .iter()
            .map(|path| ConstraintField {
                path: vec![(*path).to_owned()],
                intent_to_retain: None,
                filter: None,
            })
            .collect();

        Self {
            id,
            format: Some(format_container),
            constraints: Some(Constraints {
                fields: Some(fields),
                limit_disclosure: Some("required".to_owned()),
            }),
        }
    }

    /// The format identifiers this descriptor accepts.
    pub fn formats(&self) -> Vec<&str> {
        self.format
            .as_ref()
            .map(|f| f.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// The `constraints` member of an input descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// The requested claim fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<ConstraintField>>,

    /// `"required"` instructs the wallet to disclose no more than the requested fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_disclosure: Option<String>,
}

/// A single requested claim field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintField {
    /// JSONPath alternatives locating the claim; the first one is authoritative for us.
    pub path: Vec<String>,

    /// Whether the verifier intends to retain the claim value (mdoc vocabulary).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_to_retain: Option<bool>,

    /// An optional JSON-Schema filter over the claim value; carried, not evaluated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl ConstraintField {
    /// The path segments of the first (authoritative) path alternative, without the root.
    pub fn claim_path_segments(&self) -> Option<Vec<String>> {
        let segments = parse_path(self.path.first()?)?;
        Some(
            segments
                .into_iter()
                .map(|segment| match segment {
                    PathSegment::Key(key) => key,
                    PathSegment::Index(index) => index.to_string(),
                })
                .collect(),
        )
    }
}

/// A `presentation_submission`: how the wallet's response maps onto the definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationSubmission {
    /// Identifier of this submission.
    pub id: String,

    /// The `id` of the [`PresentationDefinition`] being answered.
    pub definition_id: String,

    /// One entry per answered input descriptor.
    pub descriptor_map: Vec<PresentationSubmissionDescriptor>,
}

/// One entry of the descriptor map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationSubmissionDescriptor {
    /// The `id` of the answered [`InputDescriptor`].
    pub id: String,

    /// The format of the presentation at `path`.
    pub format: String,

    /// JSONPath into the `vp_token` locating the presentation.
    pub path: String,

    /// Optional nested descriptor for presentations embedded in an outer envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<PresentationSubmissionDescriptor>>,
}

impl PresentationSubmissionDescriptor {
    /// The effective format: the innermost nested descriptor decides.
    pub fn effective_format(&self) -> &str {
        match &self.path_nested {
            Some(nested) => nested.effective_format(),
            None => &self.format,
        }
    }

    /// The cumulative JSONPath: this descriptor's `path` concatenated with every nested
    /// `path` (with their roots stripped).
    pub fn cumulative_path(&self) -> String {
        let mut path = self.path.clone();
        let mut nested = &self.path_nested;
        while let Some(descriptor) = nested {
            path.push_str(descriptor.path.trim_start_matches('$'));
            nested = &descriptor.path_nested;
        }
        path
    }
}

/// One segment of a JSONPath.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse the restricted JSONPath dialect: `$`, `.key`, `['key']`, `[index]`.
fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let rest = path.strip_prefix('$')?;
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let key: String = {
                    let mut key = String::new();
                    while let Some(&next) = chars.peek() {
                        if next == '.' || next == '[' {
                            break;
                        }
                        key.push(next);
                        chars.next();
                    }
                    key
                };
                if key.is_empty() {
                    return None;
                }
                segments.push(PathSegment::Key(key));
            }
            '[' => {
                let inner: String = {
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(next) => inner.push(next),
                            None => return None,
                        }
                    }
                    inner
                };
                if let Some(quoted) = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                {
                    segments.push(PathSegment::Key(quoted.to_owned()));
                } else {
                    segments.push(PathSegment::Index(inner.parse().ok()?));
                }
            }
            _ => return None,
        }
    }

    Some(segments)
}

/// Evaluate a restricted JSONPath against a JSON value.
pub fn evaluate_json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path)?;

    let mut current = value;
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => current.get(key.as_str())?,
            PathSegment::Index(index) => current.get(index)?,
        };
    }

    Some(current)
}
