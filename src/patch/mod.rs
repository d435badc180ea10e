//! Durable record edits.
//!
//! Every saved edit becomes a [`Patch`]: the target record, the fingerprint
//! of the value the edit was based on, the full replacement value and its
//! fingerprint. Patches are appended to a [`PatchLog`] and can later be
//! replayed onto a fresh extraction of the archive with a [`Replayer`].
//!
//! On disk a patch is one JSON object per line:
//!
//! ```text
//! {"id":"Loadouts:warrior:2024-05-01T12:34:56.123456Z",
//!  "target":{"type":"Loadouts","key":"warrior","baseHash":"sha256:..."},
//!  "ops":[{"op":"replace","path":"/","value":{...}}],
//!  "hash":"sha256:...","created":"2024-05-01T12:34:56.123456Z"}
//! ```

mod log;
mod replay;

pub use log::{DEFAULT_PROFILE_DIR, PATCH_LOG_FILE, PatchLog};
pub use replay::{Conflict, ConflictPolicy, ReplayOptions, ReplayReport, Replayer, apply_all};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::fingerprint::Fingerprint;
use crate::record::{Record, RecordKey, RecordType};
use crate::{Error, Result};

/// The only supported operation.
pub const REPLACE_OP: &str = "replace";

/// The only supported operation path: the whole record.
pub const ROOT_PATH: &str = "/";

/// The record a patch applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Record type name as written (parsed when the patch is applied).
    #[serde(rename = "type")]
    pub record_type: String,
    /// Record identifier.
    pub key: String,
    /// Fingerprint of the value the edit replaced.
    #[serde(rename = "baseHash")]
    pub base_hash: Fingerprint,
}

/// A single patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// Operation name, `replace`.
    pub op: String,
    /// Location inside the record, `/`.
    pub path: String,
    /// The new value.
    pub value: Value,
}

/// One logged edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Unique identifier `<type>:<key>:<created>`.
    pub id: String,
    /// The patched record.
    pub target: Target,
    /// Operations, a single whole-record replace.
    pub ops: Vec<PatchOp>,
    /// Fingerprint of the new value.
    pub hash: Fingerprint,
    /// Creation time.
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
}

impl Patch {
    /// Builds a whole-record replacement patch.
    pub fn replace(
        record_type: RecordType,
        key: &str,
        value: &Record,
        base_hash: Fingerprint,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!(
                "{}:{}:{}",
                record_type,
                key,
                timestamp::format(&created)
            ),
            target: Target {
                record_type: record_type.name().to_string(),
                key: key.to_string(),
                base_hash,
            },
            ops: vec![PatchOp {
                op: REPLACE_OP.to_string(),
                path: ROOT_PATH.to_string(),
                value: value.to_value(),
            }],
            hash: value.fingerprint(),
            created,
        }
    }

    /// Parses the target record type.
    pub fn record_type(&self) -> Result<RecordType> {
        self.target.record_type.parse()
    }

    /// Returns the target as a record key.
    pub fn record_key(&self) -> Result<RecordKey> {
        Ok(RecordKey::new(self.record_type()?, self.target.key.clone()))
    }

    /// Returns the replacement value after checking the operation list.
    pub fn replacement(&self) -> Result<Record> {
        let op = match self.ops.as_slice() {
            [op] => op,
            ops => {
                return Err(self.malformed(format!(
                    "expected exactly one operation, found {}",
                    ops.len()
                )));
            }
        };
        if op.op != REPLACE_OP {
            return Err(self.malformed(format!("unsupported operation '{}'", op.op)));
        }
        if op.path != ROOT_PATH {
            return Err(self.malformed(format!("unsupported path '{}'", op.path)));
        }
        Record::from_value(op.value.clone())
            .ok_or_else(|| self.malformed("replacement value is not an object"))
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedPatch {
            patch_id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

/// Patch timestamps: ISO-8601 UTC with microseconds and a `Z` suffix.
pub(crate) mod timestamp {
    use super::*;

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub(crate) fn format(time: &DateTime<Utc>) -> String {
        time.format(FORMAT).to_string()
    }

    pub(crate) fn parse(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(time) = DateTime::parse_from_rfc3339(text) {
            return Some(time.with_timezone(&Utc));
        }
        let naive = text.strip_suffix('Z').unwrap_or(text);
        NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|t| t.and_utc())
    }

    pub(crate) fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(time))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn warrior() -> Record {
        Record::from_value(json!({"key": "warrior", "power": 5})).unwrap()
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap()
            + chrono::Duration::microseconds(123_456)
    }

    #[test]
    fn test_patch_wire_format() {
        let base = Fingerprint::from_string("sha256:00");
        let patch = Patch::replace(RecordType::Loadouts, "warrior", &warrior(), base, created());
        let value = serde_json::to_value(&patch).unwrap();

        assert_eq!(value["id"], "Loadouts:warrior:2024-05-01T12:34:56.123456Z");
        assert_eq!(value["target"]["type"], "Loadouts");
        assert_eq!(value["target"]["baseHash"], "sha256:00");
        assert_eq!(value["ops"][0]["op"], "replace");
        assert_eq!(value["ops"][0]["path"], "/");
        assert_eq!(value["ops"][0]["value"]["power"], 5);
        assert_eq!(value["created"], "2024-05-01T12:34:56.123456Z");
        assert_eq!(value["hash"], warrior().fingerprint().as_str());
    }

    #[test]
    fn test_patch_parse_roundtrip() {
        let patch = Patch::replace(
            RecordType::Loadouts,
            "warrior",
            &warrior(),
            Fingerprint::from_string("sha256:00"),
            created(),
        );
        let line = serde_json::to_string(&patch).unwrap();
        let parsed: Patch = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, patch);
        assert_eq!(parsed.replacement().unwrap(), warrior());
        assert_eq!(parsed.record_key().unwrap().to_string(), "Loadouts:warrior");
    }

    #[test]
    fn test_timestamp_without_fraction() {
        let parsed = timestamp::parse("2024-05-01T12:34:56Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap());
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_replacement_validation() {
        let mut patch = Patch::replace(
            RecordType::Loadouts,
            "warrior",
            &warrior(),
            Fingerprint::from_string("sha256:00"),
            created(),
        );
        patch.ops[0].path = "/power".into();
        assert!(matches!(
            patch.replacement(),
            Err(Error::MalformedPatch { reason, .. }) if reason.contains("/power")
        ));

        patch.ops[0].path = "/".into();
        patch.ops[0].value = json!(7);
        assert!(patch.replacement().is_err());

        patch.ops.clear();
        assert!(patch.replacement().is_err());
    }

    #[test]
    fn test_unknown_type_parses_but_fails_later() {
        let line = r#"{"id":"Monsters:orc:2024-05-01T00:00:00Z","target":{"type":"Monsters","key":"orc","baseHash":"sha256:00"},"ops":[],"hash":"sha256:00","created":"2024-05-01T00:00:00Z"}"#;
        let patch: Patch = serde_json::from_str(line).unwrap();
        assert!(matches!(patch.record_type(), Err(Error::UnsupportedType(_))));
    }
}
