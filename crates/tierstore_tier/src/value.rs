// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The payload type moved between storage tiers.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Number, Value};

use crate::Error;

/// A value stored in a tier.
///
/// `StorageValue` is a tagged union of the shapes application data takes: scalars,
/// structured records, arrays, dates, and null. Backends treat it as opaque; typed access
/// goes through [`encode`](Self::encode) and [`decode`](Self::decode), which bridge to any
/// serde-compatible type.
///
/// The serialized form is adjacently tagged (`{"type": "date", "value": "..."}`) so that a
/// durable tier can write dates and read them back as dates.
///
/// # Examples
///
/// ```
/// use tierstore_tier::StorageValue;
///
/// let value = StorageValue::encode(&vec![1, 2, 3])?;
/// assert_eq!(value.decode::<Vec<u8>>(), Some(vec![1, 2, 3]));
///
/// // A decode into the wrong shape is a miss, not an error.
/// assert_eq!(value.decode::<String>(), None);
/// # Ok::<(), tierstore_tier::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StorageValue {
    /// Absence of a value that is still worth storing.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer or floating point number.
    Number(Number),
    /// A string.
    Text(String),
    /// A point in time.
    Date(Timestamp),
    /// An ordered list of values.
    Array(Vec<Self>),
    /// A structured record keyed by field name.
    Record(BTreeMap<String, Self>),
}

impl StorageValue {
    /// Encodes any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON, for example a map with
    /// non-string keys.
    pub fn encode<T>(value: &T) -> Result<Self, Error>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_value(value).map(Self::from).map_err(Error::caused_by)
    }

    /// Decodes the value into `T`, returning `None` when the shapes do not match.
    ///
    /// Dates decode from their RFC 3339 representation, so they can be read back either as
    /// [`Timestamp`] or as a plain string.
    #[must_use]
    pub fn decode<T>(&self) -> Option<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.to_json()).ok()
    }

    /// Decodes the value into `T` and keeps it only when `validator` accepts it.
    #[must_use]
    pub fn decode_validated<T, F>(&self, validator: F) -> Option<T>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        self.decode::<T>().filter(|decoded| validator(decoded))
    }

    /// Converts the value into plain JSON.
    ///
    /// Dates become RFC 3339 strings.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Date(ts) => Value::String(ts.to_string()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Record(fields) => Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }

    /// Returns the approximate stored size, in bytes, of this value.
    ///
    /// This is the length of the compact JSON encoding and is used for size accounting.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        serde_json::to_vec(&self.to_json()).map_or(0, |bytes| bytes.len() as u64)
    }

    /// Returns `true` for [`StorageValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for StorageValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => Self::Record(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<StorageValue> for Value {
    fn from(value: StorageValue) -> Self {
        value.to_json()
    }
}

impl From<bool> for StorageValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for StorageValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for StorageValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for StorageValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for StorageValue {
    /// Non-finite numbers have no JSON representation and become [`StorageValue::Null`].
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for StorageValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StorageValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Timestamp> for StorageValue {
    fn from(value: Timestamp) -> Self {
        Self::Date(value)
    }
}

impl<T> From<Option<T>> for StorageValue
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
