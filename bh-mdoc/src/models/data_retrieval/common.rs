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

//! Identifier & value types shared by the mdoc structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A namespace of data elements, e.g. `org.iso.18013.5.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameSpace(String);

impl std::fmt::Display for NameSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NameSpace {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NameSpace {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A document type, e.g. `org.iso.18013.5.1.mDL`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocType(String);

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DocType {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The identifier of a single data element within a namespace, e.g. `family_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataElementIdentifier(String);

impl std::fmt::Display for DataElementIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DataElementIdentifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DataElementIdentifier {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The value of a data element: any CBOR value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataElementValue(pub ciborium::Value);

impl From<&str> for DataElementValue {
    fn from(value: &str) -> Self {
        Self(ciborium::Value::Text(value.to_owned()))
    }
}

impl From<String> for DataElementValue {
    fn from(value: String) -> Self {
        Self(ciborium::Value::Text(value))
    }
}

impl From<bool> for DataElementValue {
    fn from(value: bool) -> Self {
        Self(ciborium::Value::Bool(value))
    }
}

impl From<i64> for DataElementValue {
    fn from(value: i64) -> Self {
        Self(ciborium::Value::Integer(value.into()))
    }
}

/// Data elements grouped by namespace, in cleartext form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(pub HashMap<NameSpace, HashMap<DataElementIdentifier, DataElementValue>>);

impl Claims {
    /// Insert a single data element.
    pub fn insert(
        &mut self,
        name_space: impl Into<NameSpace>,
        element: impl Into<DataElementIdentifier>,
        value: impl Into<DataElementValue>,
    ) {
        self.0
            .entry(name_space.into())
            .or_default()
            .insert(element.into(), value.into());
    }

    /// Look up a single data element.
    pub fn get(
        &self,
        name_space: &NameSpace,
        element: &DataElementIdentifier,
    ) -> Option<&DataElementValue> {
        self.0.get(name_space)?.get(element)
    }
}

/// The set of data elements a verifier requests, grouped by namespace.
///
/// This is the selective-disclosure input on the presentation path; the wallet includes only
/// the issuer-signed items listed here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestedElements(pub HashMap<NameSpace, Vec<DataElementIdentifier>>);

impl RequestedElements {
    /// Request a single data element.
    pub fn add(
        &mut self,
        name_space: impl Into<NameSpace>,
        element: impl Into<DataElementIdentifier>,
    ) {
        self.0
            .entry(name_space.into())
            .or_default()
            .push(element.into());
    }

    /// Whether the given element of the given namespace is requested.
    pub fn contains(&self, name_space: &NameSpace, element: &DataElementIdentifier) -> bool {
        self.0
            .get(name_space)
            .is_some_and(|elements| elements.contains(element))
    }
}
