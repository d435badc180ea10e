//! Exit codes for the CLI tool.

use jarpatch::{Error, NotFoundKind};

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Operation completed but some patches were not applied
pub const CONFLICTS: i32 = 1;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Archive format error
pub const BAD_ARCHIVE: i32 = 3;
/// I/O error
pub const IO_ERROR: i32 = 5;
/// The Java helper failed or is missing
pub const BRIDGE_FAILURE: i32 = 6;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Conflicts,
    FatalError,
    BadArchive,
    IoError,
    BridgeFailure,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Conflicts => CONFLICTS,
            Self::FatalError => FATAL_ERROR,
            Self::BadArchive => BAD_ARCHIVE,
            Self::IoError => IO_ERROR,
            Self::BridgeFailure => BRIDGE_FAILURE,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts a jarpatch error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Io(_) => ExitCode::IoError,
        Error::Zip(_) => ExitCode::BadArchive,
        Error::NotFound {
            what: NotFoundKind::NativeAsset,
            ..
        } => ExitCode::BridgeFailure,
        Error::NotFound { .. } => ExitCode::IoError,
        Error::RecordNotFound { .. }
        | Error::ReadOnlyRecord { .. }
        | Error::KeyMismatch { .. }
        | Error::UnsupportedType(_) => ExitCode::BadArgs,
        Error::BridgeFailure { .. }
        | Error::MalformedOutput { .. }
        | Error::UnrecognizedContainer { .. } => ExitCode::BridgeFailure,
        Error::Conflict { .. } => ExitCode::Conflicts,
        Error::Json(_) | Error::PatchLogCorrupt { .. } | Error::MalformedPatch { .. } => {
            ExitCode::FatalError
        }
        // Future error variants - required by #[non_exhaustive]
        _ => ExitCode::FatalError,
    }
}
