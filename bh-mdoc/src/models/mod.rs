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

//! The data model of the [ISO/IEC 18013-5:2021][1] standard, as used for `mso_mdoc`
//! credentials over OpenID4VP.
//!
//! This module hosts the CBOR scalar wrappers ([`Bytes`], [`BytesCbor`], [`DateTime`],
//! [`FullDate`]); the document structures live in [`data_retrieval`], mirroring section 8.3.2.1
//! of the standard.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

pub mod data_retrieval;

use std::str::FromStr;

use bherror::traits::{ErrorContext as _, ForeignError as _};
use chrono::{Timelike as _, Utc};
use ciborium::{from_reader, into_writer, value::Value};
pub use data_retrieval::{
    common::{Claims, DataElementIdentifier, DataElementValue, DocType, NameSpace},
    device_auth::SessionBinding,
    response::{DeviceResponse, Document, IssuerSigned},
};
use hex::FromHexError;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{utils::rand::generate_salt, MdocError};

/// The CBOR tag for `tdate` (RFC 3339 date-time strings), per [RFC 8949][1].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc8949#name-standard-date-time-string>
const MDOC_TDATE_CBOR_TAG: u64 = 0;

/// The CBOR tag for the embedded-CBOR byte string (`bstr .cbor`), per section 8.1 of the
/// standard.
const MDOC_BYTES_CBOR_TAG: u64 = 24;

/// The CBOR tag for `full-date`, per section 7.2.1 of the standard.
const MDOC_FULL_DATE_CBOR_TAG: u64 = 1004;

/// A CBOR byte string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct Bytes(pub(crate) Vec<u8>);

impl Bytes {
    /// Decode a hex string into [`Bytes`].
    pub fn from_hex(value: &str) -> Result<Self, FromHexError> {
        Ok(Self(hex::decode(value)?))
    }

    /// Generate [`Bytes`] to be used as an `IssuerSignedItem` salt.
    pub fn random_salt<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(generate_salt(rng))
    }
}

impl FromStr for Bytes {
    type Err = FromHexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_hex(value)
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<Bytes> for Value {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes.0)
    }
}

impl TryFrom<Value> for Bytes {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value
            .into_bytes()
            .map(Self)
            .map_err(|_| "expected a CBOR byte string".to_owned())
    }
}

/// A CBOR byte string whose bytes are the CBOR encoding of the underlying type, tagged with
/// `24` (`bstr .cbor`) per section 8.1 of the standard.
///
/// The exact bytes as received on the wire are preserved in `original_data`: the digests of
/// section 9.1.2.5 are computed over those bytes, so re-serializing a third-party item in our
/// own field order must never change its digest.
#[derive(Clone, Debug, PartialEq)]
pub struct BytesCbor<T> {
    pub(crate) inner: T,

    pub(crate) original_data: Option<Vec<u8>>,
}

impl<T> BytesCbor<T> {
    /// Try to create a [`BytesCbor`] from a CBOR [`Value`].
    pub fn try_from_cbor(value: &Value) -> Result<Self, String>
    where
        T: serde::de::DeserializeOwned,
    {
        let tagged_value @ Value::Tag(MDOC_BYTES_CBOR_TAG, ref inner) = value else {
            return Err(format!(
                "`bstr .cbor` MUST be tagged with `{}`",
                MDOC_BYTES_CBOR_TAG
            ));
        };

        let bytes = inner
            .as_bytes()
            .ok_or_else(|| "`bstr .cbor` MUST be `Bytes`".to_owned())?;

        let inner = from_reader(bytes.as_slice()).map_err(|err| err.to_string())?;

        let mut original_data = Vec::new();
        // re-serializing a Value preserves the ordering
        into_writer(tagged_value, &mut original_data).map_err(|err| err.to_string())?;

        Ok(Self {
            inner,
            original_data: Some(original_data),
        })
    }

    /// Convert the [`BytesCbor`] into a CBOR [`Value`].
    pub fn try_into_cbor(&self) -> Result<Value, ciborium::ser::Error<std::io::Error>>
    where
        T: Serialize,
    {
        let bytes = match self.original_data {
            Some(ref bytes) => return Ok(from_reader(bytes.as_slice()).unwrap()),
            None => {
                let mut bytes = vec![];
                into_writer(&self.inner, &mut bytes)?;
                bytes
            }
        };

        Ok(Value::Tag(
            MDOC_BYTES_CBOR_TAG,
            Box::new(Value::Bytes(bytes)),
        ))
    }

    /// The exact tag-24 wire bytes, either as received or as we would serialize them.
    pub(crate) fn tagged_bytes(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>>
    where
        T: Serialize,
    {
        if let Some(ref original) = self.original_data {
            return Ok(original.clone());
        }

        let value = self.try_into_cbor()?;
        let mut bytes = Vec::new();
        into_writer(&value, &mut bytes)?;
        Ok(bytes)
    }
}

impl<T> From<T> for BytesCbor<T> {
    fn from(value: T) -> Self {
        Self {
            inner: value,
            original_data: None,
        }
    }
}

impl<T> Serialize for BytesCbor<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.try_into_cbor().map_err(serde::ser::Error::custom)?;

        value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for BytesCbor<T>
where
    T: serde::de::DeserializeOwned,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        Self::try_from_cbor(&value).map_err(serde::de::Error::custom)
    }
}

/// A `tdate` CBOR type per section 7.2.1 of the standard: an RFC 3339 date-time, in UTC
/// (`Z` offset), without fractional seconds, tagged with `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct DateTime(pub(crate) chrono::DateTime<Utc>);

impl DateTime {
    /// The timestamp in seconds since the UNIX epoch.
    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }
}

impl FromStr for DateTime {
    type Err = bherror::Error<MdocError>;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let date_time = chrono::DateTime::parse_from_rfc3339(value)
            .foreign_err(|| MdocError::InvalidDateTime)
            .ctx(|| format!("{value} not a valid Date Time string"))?;

        if date_time.offset().utc_minus_local() != 0 {
            return Err(bherror::Error::root(MdocError::InvalidDateTime)
                .ctx("Date Time is not in UTC (offset must be Z)"));
        }

        DateTime::try_from(date_time.with_timezone(&Utc))
    }
}

impl TryFrom<u64> for DateTime {
    type Error = bherror::Error<MdocError>;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let value_i64 = value
            .try_into()
            .foreign_err(|| MdocError::InvalidDateTime)
            .ctx(|| format!("{value} seconds do not fit into i64"))?;

        let date_time = chrono::DateTime::from_timestamp(value_i64, 0).ok_or_else(|| {
            bherror::Error::root(MdocError::InvalidDateTime)
                .ctx(format!("{value} seconds out of range"))
        })?;

        DateTime::try_from(date_time)
    }
}

impl TryFrom<chrono::DateTime<Utc>> for DateTime {
    type Error = bherror::Error<MdocError>;

    fn try_from(value: chrono::DateTime<Utc>) -> Result<Self, Self::Error> {
        // ISO/IEC 18013-5:2021: "fraction of seconds shall not be used"
        if value.nanosecond() != 0 {
            return Err(bherror::Error::root(MdocError::InvalidDateTime)
                .ctx("Date Time should not use fraction of seconds"));
        }

        Ok(Self(value))
    }
}

impl From<DateTime> for Value {
    fn from(date_time: DateTime) -> Self {
        let date_time = date_time
            .0
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        Self::Tag(MDOC_TDATE_CBOR_TAG, Box::new(Self::Text(date_time)))
    }
}

impl TryFrom<Value> for DateTime {
    type Error = bherror::Error<MdocError>;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Tag(MDOC_TDATE_CBOR_TAG, value) = value else {
            return Err(
                bherror::Error::root(MdocError::InvalidDateTime).ctx(format!(
                    "`tdate` MUST be tagged with `{}`",
                    MDOC_TDATE_CBOR_TAG
                )),
            );
        };

        let value = value.as_text().ok_or_else(|| {
            bherror::Error::root(MdocError::InvalidDateTime).ctx("`tdate` MUST be `String`")
        })?;

        value.parse::<DateTime>()
    }
}

/// A `full-date` per section 7.2.1 of the standard, tagged with `1004`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct FullDate(chrono::NaiveDate);

impl FromStr for FullDate {
    type Err = chrono::ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")?))
    }
}

impl From<FullDate> for Value {
    fn from(full_date: FullDate) -> Self {
        let text = full_date.0.format("%Y-%m-%d").to_string();

        Self::Tag(MDOC_FULL_DATE_CBOR_TAG, Box::new(Self::Text(text)))
    }
}

impl TryFrom<Value> for FullDate {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Tag(MDOC_FULL_DATE_CBOR_TAG, value) = value else {
            return Err(format!(
                "`full-date` MUST be tagged with `{}`",
                MDOC_FULL_DATE_CBOR_TAG
            ));
        };

        value
            .as_text()
            .ok_or_else(|| "`full-date` MUST be `String`".to_owned())?
            .parse()
            .map_err(|err: chrono::ParseError| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn tdate_cbor_roundtrip() {
        const EXPECTED_CBOR: &str = "c074323032302d31302d30315431333a33303a30325a";

        let date_time: DateTime = "2020-10-01T13:30:02Z".parse().unwrap();

        let mut encoded = Vec::new();
        into_writer(&date_time, &mut encoded).unwrap();
        assert_eq!(hex::encode(&encoded), EXPECTED_CBOR);

        let decoded: DateTime = from_reader(encoded.as_slice()).unwrap();
        assert_eq!(date_time, decoded);
    }

    #[test]
    fn tdate_rejects_fractional_seconds_and_offsets() {
        assert_matches!(
            "1985-04-12T23:20:50.52Z".parse::<DateTime>().unwrap_err().error,
            MdocError::InvalidDateTime
        );
        assert_matches!(
            "1996-12-19T16:39:57-08:00".parse::<DateTime>().unwrap_err().error,
            MdocError::InvalidDateTime
        );
        // plain UTC passes
        "1985-04-12T23:20:50Z".parse::<DateTime>().unwrap();
    }

    #[test]
    fn tdate_untagged_fails() {
        // untagged "2020-10-01T13:30:02Z"
        let data = hex::decode("74323032302d31302d30315431333a33303a30325a").unwrap();

        let err = from_reader::<DateTime, _>(data.as_slice()).unwrap_err();

        assert_matches!(err, ciborium::de::Error::Semantic(None, m) if m.contains("tagged"));
    }

    #[test]
    fn full_date_cbor_roundtrip() {
        // d9 03ec ("full-date" tag 1004) "2024-10-20"
        const EXPECTED_CBOR: &str = "d903ec6a323032342d31302d3230";

        let date: FullDate = "2024-10-20".parse().unwrap();

        let mut encoded = Vec::new();
        into_writer(&date, &mut encoded).unwrap();
        assert_eq!(hex::encode(&encoded), EXPECTED_CBOR);

        let decoded: FullDate = from_reader(encoded.as_slice()).unwrap();
        assert_eq!(date, decoded);
    }

    #[test]
    fn bytes_cbor_preserves_third_party_field_order() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Pair {
            a: u8,
            b: u8,
        }

        // tag24( bytes( {"b": 2, "a": 1} ) ) -- field order differs from the struct
        let reordered = Value::Tag(
            24,
            Box::new(Value::Bytes(
                hex::decode("a2616202616101").unwrap(),
            )),
        );

        let parsed: BytesCbor<Pair> = BytesCbor::try_from_cbor(&reordered).unwrap();
        assert_eq!(parsed.inner, Pair { a: 1, b: 2 });

        // the wire bytes survive re-serialization untouched
        let reserialized = parsed.try_into_cbor().unwrap();
        assert_eq!(reserialized, reordered);

        // a locally created value serializes in our own field order instead
        let local: BytesCbor<Pair> = Pair { a: 1, b: 2 }.into();
        assert_ne!(local.tagged_bytes().unwrap(), parsed.tagged_bytes().unwrap());
    }

    #[test]
    fn bytes_cbor_untagged_fails() {
        let untagged = Value::Bytes(vec![0xa0]);

        let err = BytesCbor::<ciborium::Value>::try_from_cbor(&untagged).unwrap_err();
        assert!(err.contains("tagged"));
    }
}
