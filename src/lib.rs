//! # jarpatch
//!
//! Safe editing of structured records stored inside a game's zip archive.
//!
//! The archive is extracted into a private scratch directory, record
//! containers are decoded into JSON-like [`Record`]s through a [`Codec`],
//! and every edit is written back and repacked over the live archive in a
//! single atomic rename. A pristine backup is taken the first time an
//! archive is opened, and every saved edit is appended to a [`PatchLog`] so
//! it can be replayed after the game replaces its archive.
//!
//! ## Quick Start
//!
//! ### Editing a Record
//!
//! ```rust,no_run
//! use jarpatch::{ArchiveSession, PatchLog, ProcessCodec, RecordType, Result};
//!
//! fn main() -> Result<()> {
//!     let codec = ProcessCodec::from_env()?;
//!     let mut session = ArchiveSession::open("DOT.jar", codec)?;
//!     let mut log = PatchLog::open_default()?;
//!
//!     let keys = session.list_records(RecordType::Loadouts)?;
//!     println!("{} loadouts", keys.len());
//!
//!     let mut warrior = session.get_record(RecordType::Loadouts, "warrior")?;
//!     warrior.insert("gold", 500);
//!     let patch = session.commit_edit(RecordType::Loadouts, "warrior", warrior, &mut log)?;
//!     println!("logged {}", patch.id);
//!     Ok(())
//! }
//! ```
//!
//! ### Replaying Edits
//!
//! ```rust,no_run
//! use jarpatch::{ArchiveSession, PatchLog, ProcessCodec, Result, apply_all};
//!
//! fn main() -> Result<()> {
//!     let mut session = ArchiveSession::open("DOT.jar", ProcessCodec::from_env()?)?;
//!     let log = PatchLog::open_default()?;
//!
//!     let report = apply_all(&mut session, &log)?;
//!     for conflict in &report.conflicts {
//!         eprintln!("{}", conflict);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli` | No | The `jarpatch` command-line tool |
//!
//! ## Logging
//!
//! The library logs through the [`log`](https://docs.rs/log) facade. Install
//! any compatible logger to see extraction, repack and replay activity.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod archive;
pub mod atomic;
pub mod backup;
pub mod bridge;
pub mod error;
pub mod fingerprint;
pub mod patch;
pub mod record;
pub mod session;

pub use error::{BridgeOperation, Error, NotFoundKind, Result};

// Re-export the record model at crate root for convenience
pub use fingerprint::{Fingerprint, canonical_json, fingerprint};
pub use record::{Record, RecordKey, RecordType};

// Re-export session API
pub use session::{ArchiveSession, SessionOptions};

// Re-export bridge API
pub use bridge::{BridgeConfig, Codec, JsonFileCodec, ProcessCodec};

// Re-export storage helpers
pub use atomic::{AtomicFile, atomic_replace};
pub use backup::BackupManager;

// Re-export patch API
pub use patch::{
    Conflict, ConflictPolicy, Patch, PatchLog, ReplayOptions, ReplayReport, Replayer, apply_all,
};
