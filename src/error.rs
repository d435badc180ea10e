//! Error types for record session and patch log operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when opening archives, decoding and encoding record
//! containers, and reading or replaying the patch log, along with a
//! convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Most
//! callers only need the `?` operator:
//!
//! ```rust,no_run
//! use jarpatch::{ArchiveSession, JsonFileCodec, RecordType, Result};
//!
//! fn count_loadouts(path: &str) -> Result<usize> {
//!     let mut session = ArchiveSession::open(path, JsonFileCodec::new())?;
//!     Ok(session.list_records(RecordType::Loadouts)?.len())
//! }
//! ```
//!
//! ## Degraded Decodes
//!
//! Bridge failures while *reading* a container do not surface as errors from
//! [`ArchiveSession::list_records`]. They are turned into a single diagnostic
//! record instead. [`Error::degrades_to_diagnostic`] tells which variants take
//! that path. Failures while *writing* a container are always hard errors.
//!
//! [`ArchiveSession::list_records`]: crate::ArchiveSession::list_records

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::fingerprint::Fingerprint;
use crate::record::RecordKey;

/// What kind of file was missing when [`Error::NotFound`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFoundKind {
    /// The live archive being opened or restored.
    Archive,
    /// The pristine `.backup` copy of the archive.
    Backup,
    /// A record container inside the scratch directory.
    Container,
    /// A record container inside the backup archive.
    BackupEntry,
    /// The game jar the external bridge needs on its classpath.
    NativeAsset,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Backup => write!(f, "backup archive"),
            Self::Container => write!(f, "record container"),
            Self::BackupEntry => write!(f, "backup entry"),
            Self::NativeAsset => write!(f, "bridge asset"),
        }
    }
}

/// Which direction of the bridge failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOperation {
    /// Container to records.
    Decode,
    /// Records to container.
    Encode,
}

impl fmt::Display for BridgeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode => write!(f, "decode"),
            Self::Encode => write!(f, "encode"),
        }
    }
}

/// Helper struct for formatting BridgeFailure error messages.
struct BridgeFailureDisplay<'a> {
    operation: BridgeOperation,
    status: Option<i32>,
    stderr: &'a str,
}

impl fmt::Display for BridgeFailureDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bridge {} failed", self.operation)?;
        match self.status {
            Some(code) => write!(f, " with exit code {}", code)?,
            None => write!(f, " without an exit code")?,
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

/// The main error type for archive session and patch log operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`Zip`][Self::Zip] | File system or archive failures |
/// | Lookup | [`NotFound`][Self::NotFound], [`RecordNotFound`][Self::RecordNotFound] | Missing archive, backup or record |
/// | Bridge | [`BridgeFailure`][Self::BridgeFailure], [`MalformedOutput`][Self::MalformedOutput], [`UnrecognizedContainer`][Self::UnrecognizedContainer] | External helper problems |
/// | Editing | [`ReadOnlyRecord`][Self::ReadOnlyRecord], [`KeyMismatch`][Self::KeyMismatch], [`UnsupportedType`][Self::UnsupportedType] | Invalid edit requests |
/// | Patch log | [`PatchLogCorrupt`][Self::PatchLogCorrupt], [`MalformedPatch`][Self::MalformedPatch], [`Conflict`][Self::Conflict] | Log parsing and replay |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during extraction, repacking or copying.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The zip container could not be read or written.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A JSON value could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required file does not exist.
    ///
    /// Fatal to the operation that triggered it; the path is reported verbatim.
    #[error("{what} not found: {}", path.display())]
    NotFound {
        /// Which file was missing.
        what: NotFoundKind,
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The record was never listed in this session.
    #[error("Record not found: {key}")]
    RecordNotFound {
        /// The key that was requested.
        key: RecordKey,
    },

    /// The record is a synthetic diagnostic and cannot be edited.
    #[error("Record {key} is a diagnostic placeholder and cannot be edited")]
    ReadOnlyRecord {
        /// The diagnostic record's key.
        key: RecordKey,
    },

    /// The replacement value names a different record than the one targeted.
    #[error("Record {key} cannot be replaced by a value with identifier '{found}'")]
    KeyMismatch {
        /// The key being updated.
        key: RecordKey,
        /// The identifier found in the new value.
        found: String,
    },

    /// The record type name is not known.
    #[error("Unsupported record type: {0}")]
    UnsupportedType(String),

    /// The external helper exited unsuccessfully or timed out.
    #[error("{}", BridgeFailureDisplay { operation: *operation, status: *status, stderr })]
    BridgeFailure {
        /// Which direction was running.
        operation: BridgeOperation,
        /// The exit code, if the process exited normally.
        status: Option<i32>,
        /// Captured standard error (or a timeout description).
        stderr: String,
    },

    /// The helper's output was not a JSON array of records.
    #[error("Malformed bridge output: {reason}")]
    MalformedOutput {
        /// Why the output was rejected.
        reason: String,
        /// The beginning of the output, for diagnostics.
        preview: String,
    },

    /// The container is not in a format the bridge understands.
    #[error("Unrecognized container format: {}", path.display())]
    UnrecognizedContainer {
        /// The container path.
        path: PathBuf,
        /// The beginning of the file read as text.
        preview: String,
    },

    /// A line of the patch log could not be parsed.
    #[error("Patch log corrupt at line {line}: {reason}")]
    PatchLogCorrupt {
        /// 1-based line number.
        line: usize,
        /// Parser message.
        reason: String,
    },

    /// A patch parsed but cannot be applied as written.
    #[error("Patch {patch_id} is malformed: {reason}")]
    MalformedPatch {
        /// The patch identifier.
        patch_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The record drifted away from the base the patch was recorded against.
    #[error("Conflict on {key}: patch expects base {expected}, archive has {found}")]
    Conflict {
        /// The patched record.
        key: RecordKey,
        /// The base fingerprint recorded in the patch.
        expected: Fingerprint,
        /// The fingerprint of the current value in the session.
        found: Fingerprint,
    },
}

impl Error {
    /// Returns `true` if a required file or record was missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } | Error::RecordNotFound { .. } => true,
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns `true` if the external bridge produced the error.
    pub fn is_bridge_failure(&self) -> bool {
        matches!(
            self,
            Error::BridgeFailure { .. }
                | Error::MalformedOutput { .. }
                | Error::UnrecognizedContainer { .. }
        )
    }

    /// Returns `true` if a decode failing with this error is reported as a
    /// diagnostic record instead of an error.
    pub fn degrades_to_diagnostic(&self) -> bool {
        self.is_bridge_failure() || matches!(self, Error::Json(_))
    }

    /// Returns the record key associated with this error, if any.
    pub fn record_key(&self) -> Option<&RecordKey> {
        match self {
            Error::RecordNotFound { key }
            | Error::ReadOnlyRecord { key }
            | Error::KeyMismatch { key, .. }
            | Error::Conflict { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Creates a NotFound error.
    pub fn not_found(what: NotFoundKind, path: impl Into<PathBuf>) -> Self {
        Error::NotFound {
            what,
            path: path.into(),
        }
    }

    /// Creates a BridgeFailure error.
    pub fn bridge_failure(
        operation: BridgeOperation,
        status: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Error::BridgeFailure {
            operation,
            status,
            stderr: stderr.into(),
        }
    }
}

/// A specialized Result type for jarpatch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_not_found_reports_path() {
        let err = Error::not_found(NotFoundKind::Backup, "/games/DOT.jar.backup");
        let msg = err.to_string();
        assert!(msg.starts_with("backup archive not found"));
        assert!(msg.contains("DOT.jar.backup"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_bridge_failure_message() {
        let err = Error::bridge_failure(BridgeOperation::Decode, Some(1), "  boom\n");
        assert_eq!(err.to_string(), "Bridge decode failed with exit code 1: boom");
        assert!(err.is_bridge_failure());
        assert!(err.degrades_to_diagnostic());

        let err = Error::bridge_failure(BridgeOperation::Encode, None, "");
        assert_eq!(err.to_string(), "Bridge encode failed without an exit code");
    }

    #[test]
    fn test_record_errors_carry_key() {
        let key = RecordKey::new(RecordType::Loadouts, "warrior");
        let err = Error::ReadOnlyRecord { key: key.clone() };
        assert_eq!(err.record_key(), Some(&key));
        assert!(err.to_string().contains("Loadouts:warrior"));
        assert!(!err.degrades_to_diagnostic());
    }

    #[test]
    fn test_patch_log_corrupt() {
        let err = Error::PatchLogCorrupt {
            line: 3,
            reason: "expected value".into(),
        };
        assert_eq!(err.to_string(), "Patch log corrupt at line 3: expected value");
        assert!(!err.is_bridge_failure());
    }
}
