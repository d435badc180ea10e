//! Conversion between record containers and structured records.
//!
//! Record containers inside the archive are opaque binary files. A [`Codec`]
//! turns one into a list of [`Record`]s and writes a list back. Two codecs
//! ship with the crate:
//!
//! - [`ProcessCodec`] runs the external Java helper as a subprocess
//! - [`JsonFileCodec`] stores the record array as plain JSON in the container
//!
//! Codecs only report failures. Turning a failed decode into a diagnostic
//! record is the session's job.

mod json;
mod process;

pub use json::JsonFileCodec;
pub use process::{
    BridgeConfig, DEFAULT_GAME_JAR, DEFAULT_HELPER_DIR, DEFAULT_TIMEOUT, GAME_JAR_ENV,
    HELPER_DIR_ENV, JAVA_ENV, JAVA_SERIALIZATION_MAGIC, ProcessCodec,
};

use std::path::Path;

use serde_json::Value;

use crate::record::{Record, RecordType};
use crate::{Error, Result};

/// Maximum number of output characters kept in a [`Error::MalformedOutput`] preview.
pub const OUTPUT_PREVIEW_CHARS: usize = 400;

/// Maximum number of characters kept when previewing an unrecognized container.
pub const CONTAINER_PREVIEW_CHARS: usize = 4000;

/// Decodes and encodes the records of a container file.
pub trait Codec {
    /// Reads every record stored in `container`.
    fn decode(&self, container: &Path, record_type: RecordType) -> Result<Vec<Record>>;

    /// Replaces the contents of `container` with `records`, in order.
    fn encode(&self, container: &Path, record_type: RecordType, records: &[Record]) -> Result<()>;
}

impl<C: Codec + ?Sized> Codec for &C {
    fn decode(&self, container: &Path, record_type: RecordType) -> Result<Vec<Record>> {
        (**self).decode(container, record_type)
    }

    fn encode(&self, container: &Path, record_type: RecordType, records: &[Record]) -> Result<()> {
        (**self).encode(container, record_type, records)
    }
}

impl<C: Codec + ?Sized> Codec for Box<C> {
    fn decode(&self, container: &Path, record_type: RecordType) -> Result<Vec<Record>> {
        (**self).decode(container, record_type)
    }

    fn encode(&self, container: &Path, record_type: RecordType, records: &[Record]) -> Result<()> {
        (**self).encode(container, record_type, records)
    }
}

/// Returns at most `max` characters of `text`.
pub(crate) fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Parses helper output that must be a JSON array of record objects.
///
/// Array items that are not objects are dropped with a warning.
pub(crate) fn parse_record_array(text: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(text).map_err(|e| Error::MalformedOutput {
        reason: format!("Bad JSON from helper: {}", e),
        preview: preview(text, OUTPUT_PREVIEW_CHARS),
    })?;

    let Value::Array(items) = value else {
        return Err(Error::MalformedOutput {
            reason: "Unexpected helper output".into(),
            preview: preview(text, OUTPUT_PREVIEW_CHARS),
        });
    };

    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        match Record::from_value(item) {
            Some(record) => records.push(record),
            None => log::warn!("Skipping non-object record at index {}", idx),
        }
    }
    Ok(records)
}

/// Serializes records as a JSON array.
pub(crate) fn records_to_json(records: &[Record]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_array() {
        let records = parse_record_array(r#"[{"key": "a"}, 3, {"key": "b"}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].identifier().as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_non_array() {
        let err = parse_record_array(r#"{"key": "a"}"#).unwrap_err();
        match err {
            Error::MalformedOutput { reason, preview } => {
                assert_eq!(reason, "Unexpected helper output");
                assert_eq!(preview, r#"{"key": "a"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_bad_json_truncates_preview() {
        let text = format!("not json {}", "x".repeat(1000));
        let err = parse_record_array(&text).unwrap_err();
        match err {
            Error::MalformedOutput { reason, preview } => {
                assert!(reason.starts_with("Bad JSON from helper"));
                assert_eq!(preview.chars().count(), OUTPUT_PREVIEW_CHARS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_boxed_codec_delegates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("loadouts.dat");
        let codec: Box<dyn Codec> = Box::new(JsonFileCodec::new());
        let record = Record::from_value(serde_json::json!({"key": "warrior"})).unwrap();

        codec
            .encode(&path, RecordType::Loadouts, std::slice::from_ref(&record))
            .unwrap();
        let decoded = codec.decode(&path, RecordType::Loadouts).unwrap();
        assert_eq!(decoded, vec![record]);
    }
}
