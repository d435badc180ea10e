//! Record types, keys and values.
//!
//! A [`Record`] is an ordered mapping of field names to JSON values, exactly
//! as the bridge decodes it from a container. Records are addressed by a
//! [`RecordKey`], the pair of a [`RecordType`] and the record's identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fingerprint::{self, Fingerprint};
use crate::{Error, Result};

/// Prefix of diagnostic keys produced when decoding fails.
pub const RAW_PREFIX: &str = "raw_";

/// Prefix of diagnostic keys produced when the container file is absent.
pub const MISSING_PREFIX: &str = "missing_";

/// The kinds of record containers that can be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum RecordType {
    /// Character loadouts (`modules/loadouts.dat`).
    Loadouts,
}

impl RecordType {
    /// All supported record types.
    pub const ALL: &'static [RecordType] = &[RecordType::Loadouts];

    /// Returns the display name used in patch targets.
    pub fn name(self) -> &'static str {
        match self {
            Self::Loadouts => "Loadouts",
        }
    }

    /// Returns the lowercase stem used in file names and diagnostic keys.
    pub fn stem(self) -> &'static str {
        match self {
            Self::Loadouts => "loadouts",
        }
    }

    /// Relative paths tried before searching the scratch tree.
    pub fn conventional_paths(self) -> &'static [&'static str] {
        match self {
            Self::Loadouts => &["modules/loadouts.dat", "dot/modules/loadouts.dat"],
        }
    }

    /// Key of the diagnostic record emitted when decoding fails.
    pub fn raw_key(self) -> String {
        format!("{}{}", RAW_PREFIX, self.stem())
    }

    /// Key of the diagnostic record emitted when the container is absent.
    pub fn missing_key(self) -> String {
        format!("{}{}", MISSING_PREFIX, self.stem())
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RecordType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedType(s.to_string()))
    }
}

impl Serialize for RecordType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for RecordType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Address of a record: its type plus its identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// The record's type.
    pub record_type: RecordType,
    /// The identifier, unique within the type.
    pub key: String,
}

impl RecordKey {
    /// Creates a new key.
    pub fn new(record_type: RecordType, key: impl Into<String>) -> Self {
        Self {
            record_type,
            key: key.into(),
        }
    }

    /// Returns `true` if the key names a synthetic diagnostic record.
    pub fn is_diagnostic(&self) -> bool {
        self.key == self.record_type.raw_key() || self.key == self.record_type.missing_key()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.key)
    }
}

/// A single structured record.
///
/// Field order is preserved as decoded. Equality is structural; use
/// [`Record::fingerprint`] for the canonical, order-independent comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Returns the record as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.deep_clone().0)
    }

    /// Returns a structurally independent copy of this record.
    ///
    /// Nested objects and arrays are copied element by element; numbers and
    /// strings are copied verbatim, so no precision or ordering is lost.
    pub fn deep_clone(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), deep_clone_value(v)))
                .collect(),
        )
    }

    /// Returns the record's identifier: `key`, falling back to `id`.
    ///
    /// Strings and integers are accepted; empty strings and other value
    /// kinds are not identifiers.
    pub fn identifier(&self) -> Option<String> {
        ["key", "id"]
            .iter()
            .filter_map(|field| self.0.get(*field))
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
                _ => None,
            })
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field value, returning the previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over fields in order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the canonical content fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint::fingerprint_map(&self.0)
    }

    /// Builds a diagnostic placeholder record.
    pub(crate) fn diagnostic(key: String, name: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.insert("key", key);
        record.insert("name", name.into());
        record
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Record::from_value(value).ok_or_else(|| Error::MalformedOutput {
            reason: "record is not a JSON object".into(),
            preview: String::new(),
        })
    }
}

fn deep_clone_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), deep_clone_value(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(deep_clone_value).collect()),
        Value::String(s) => Value::String(s.clone()),
        Value::Number(n) => Value::Number(n.clone()),
        Value::Bool(b) => Value::Bool(*b),
        Value::Null => Value::Null,
    }
}
