//! Record sessions over an extracted archive.
//!
//! An [`ArchiveSession`] owns a scratch copy of the archive's contents. Record
//! containers are decoded on demand through a [`Codec`], edits are written
//! back into the container and the whole scratch tree is repacked over the
//! live archive after every mutation.
//!
//! # Lifecycle
//!
//! 1. [`ArchiveSession::open`] checks the archive, makes sure a pristine
//!    backup exists next to it and extracts it into a fresh scratch directory
//! 2. [`list_records`](ArchiveSession::list_records) decodes a record type and
//!    caches both the current values and, the first time only, the originals
//! 3. [`update_record`](ArchiveSession::update_record) and the restore
//!    operations re-encode the type and repack the archive immediately
//! 4. dropping the session deletes the scratch directory
//!
//! # Example
//!
//! ```rust,no_run
//! use jarpatch::{ArchiveSession, JsonFileCodec, PatchLog, RecordType};
//!
//! let mut session = ArchiveSession::open("DOT.jar", JsonFileCodec::new())?;
//! let mut log = PatchLog::open("profiles/default")?;
//!
//! for key in session.list_records(RecordType::Loadouts)? {
//!     println!("{}", key);
//! }
//!
//! let mut warrior = session.get_record(RecordType::Loadouts, "warrior")?;
//! warrior.insert("power", 10);
//! session.commit_edit(RecordType::Loadouts, "warrior", warrior, &mut log)?;
//! # Ok::<(), jarpatch::Error>(())
//! ```

mod cache;
mod options;
mod resolve;

pub use options::{DEFAULT_PROFILE, DEFAULT_SCRATCH_PREFIX, SessionOptions};

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

use crate::archive;
use crate::atomic::{AtomicFile, atomic_replace};
use crate::backup::BackupManager;
use crate::bridge::Codec;
use crate::error::NotFoundKind;
use crate::fingerprint::Fingerprint;
use crate::patch::{Patch, PatchLog};
use crate::record::{Record, RecordKey, RecordType};
use crate::{Error, Result};

use cache::TypeCache;

/// An editing session over one archive.
///
/// All mutations take `&mut self` and run to completion before returning.
/// Each session has its own scratch directory and caches; two sessions on the
/// same archive do not see each other's state.
#[derive(Debug)]
pub struct ArchiveSession<C: Codec = Box<dyn Codec>> {
    archive: PathBuf,
    scratch: TempDir,
    codec: C,
    backups: BackupManager,
    options: SessionOptions,
    current: HashMap<RecordType, TypeCache>,
    originals: HashMap<RecordType, HashMap<String, Record>>,
    containers: HashMap<RecordType, PathBuf>,
}

impl<C: Codec> ArchiveSession<C> {
    /// Opens a session with default options.
    pub fn open(archive: impl AsRef<Path>, codec: C) -> Result<Self> {
        Self::open_with_options(archive, codec, SessionOptions::default())
    }

    /// Opens a session.
    ///
    /// Fails with [`NotFoundKind::Archive`] if `archive` does not exist. The
    /// backup is created on the first open of an archive and reused after.
    pub fn open_with_options(
        archive: impl AsRef<Path>,
        codec: C,
        options: SessionOptions,
    ) -> Result<Self> {
        let archive = archive.as_ref().to_path_buf();
        if !archive.is_file() {
            return Err(Error::not_found(NotFoundKind::Archive, archive));
        }

        let backups = BackupManager::new(options.profile_root.clone());
        backups.ensure_backup(&archive)?;

        let scratch = temp_dir(&options)?;

        let extracted = archive::extract_all(&archive, scratch.path())?;
        if !extracted.skipped.is_empty() {
            log::warn!(
                "Skipped {} unsafe entries in '{}'",
                extracted.skipped.len(),
                archive.display()
            );
        }

        Ok(Self {
            archive,
            scratch,
            codec,
            backups,
            options,
            current: HashMap::new(),
            originals: HashMap::new(),
            containers: HashMap::new(),
        })
    }

    /// Returns the live archive path.
    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// Returns the scratch directory holding the extracted tree.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Returns the backup path of the archive.
    pub fn backup_path(&self) -> PathBuf {
        self.backups.backup_path(&self.archive)
    }

    /// Returns the resolved container path, if the type has been resolved.
    pub fn container_path(&self, record_type: RecordType) -> Option<&Path> {
        self.containers.get(&record_type).map(PathBuf::as_path)
    }

    /// Returns the record types listed so far, in sorted order.
    pub fn loaded_types(&self) -> Vec<RecordType> {
        let mut types: Vec<_> = self.current.keys().copied().collect();
        types.sort();
        types
    }

    /// Returns the codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Decodes `record_type` and returns its identifiers in container order.
    ///
    /// Replaces the current cache of the type. Originals are recorded only
    /// for identifiers not seen before in this session. A missing container
    /// or a failed decode yields a single diagnostic identifier instead of an
    /// error.
    pub fn list_records(&mut self, record_type: RecordType) -> Result<Vec<String>> {
        let container = self.resolve(record_type)?;
        let cache = match self.codec.decode(&container, record_type) {
            Ok(records) => TypeCache::from_records(record_type, records),
            Err(err) => {
                let (key, record) = diagnostic_for(record_type, &container, err)?;
                log::warn!(
                    "Decoding {} failed, listing diagnostic '{}'",
                    record_type,
                    key
                );
                TypeCache::diagnostic(key, record)
            }
        };

        if !cache.is_diagnostic() {
            let originals = self.originals.entry(record_type).or_default();
            for key in cache.keys() {
                if let Some(record) = cache.get(key) {
                    originals
                        .entry(key.clone())
                        .or_insert_with(|| record.deep_clone());
                }
            }
        }

        let keys = cache.keys().to_vec();
        log::debug!("Cached {} {} records", keys.len(), record_type);
        self.current.insert(record_type, cache);
        Ok(keys)
    }

    /// Returns an independent copy of a listed record.
    pub fn get_record(&self, record_type: RecordType, key: &str) -> Result<Record> {
        self.current
            .get(&record_type)
            .and_then(|cache| cache.get(key))
            .map(Record::deep_clone)
            .ok_or_else(|| Error::RecordNotFound {
                key: RecordKey::new(record_type, key),
            })
    }

    /// Replaces a record and writes the change through to the archive.
    ///
    /// The type is listed first if it has not been yet. On failure the cache
    /// and the container in scratch are rolled back and the archive is left
    /// as it was.
    pub fn update_record(
        &mut self,
        record_type: RecordType,
        key: &str,
        value: Record,
    ) -> Result<()> {
        self.ensure_loaded(record_type)?;
        let record_key = RecordKey::new(record_type, key);
        self.check_editable(&record_key)?;

        if let Some(found) = value.identifier() {
            if found != key {
                return Err(Error::KeyMismatch {
                    key: record_key,
                    found,
                });
            }
        }

        self.replace_and_write(&record_key, value)?;
        log::info!("Updated {}", record_key);
        Ok(())
    }

    /// Puts a record back to the value it had when first listed.
    pub fn restore_record(&mut self, record_type: RecordType, key: &str) -> Result<()> {
        self.ensure_loaded(record_type)?;
        let record_key = RecordKey::new(record_type, key);
        self.check_editable(&record_key)?;

        let original = self
            .original(&record_key)
            .map(Record::deep_clone)
            .ok_or_else(|| Error::RecordNotFound {
                key: record_key.clone(),
            })?;
        self.replace_and_write(&record_key, original)?;
        log::info!("Restored {}", record_key);
        Ok(())
    }

    /// Replaces the type's container with the one from the backup.
    ///
    /// The current container is first copied into a timestamped rollback
    /// directory (unless disabled in [`SessionOptions`]). Cached values of the
    /// type, originals included, are dropped and the type is listed again.
    /// Fails without changing anything if the backup or its entry is missing.
    pub fn restore_object_type(&mut self, record_type: RecordType) -> Result<Vec<String>> {
        let (backup, container, entry) = self.backup_entry(record_type)?;

        if self.options.keep_rollbacks && container.is_file() {
            let dir = self.backups.rollback_dir(&self.options.profile)?;
            let name = container.file_name().unwrap_or(container.as_os_str());
            atomic_replace(&container, dir.join(name))?;
            log::info!("Saved current {} container to '{}'", record_type, dir.display());
        }

        archive::extract_entry(&backup, &entry, &container)?;
        self.current.remove(&record_type);
        self.originals.remove(&record_type);
        let keys = self.list_records(record_type)?;
        let repacked = archive::repack(self.scratch.path(), &self.archive)?;
        log::info!(
            "Restored {} from '{}' ({} files, {} bytes repacked)",
            record_type,
            backup.display(),
            repacked.files,
            repacked.total_bytes
        );
        Ok(keys)
    }

    /// Takes the originals of `record_type` from the backup archive.
    ///
    /// Listing records the values found at open time, which already hold the
    /// edits of earlier sessions. This decodes the backup's container instead
    /// and records its values as the originals of every identifier it holds,
    /// so a later [`restore_record`](Self::restore_record) goes back to the
    /// pristine value. Current values are not touched. Returns the
    /// identifiers found in the backup.
    pub fn load_originals_from_backup(&mut self, record_type: RecordType) -> Result<Vec<String>> {
        let (backup, container, entry) = self.backup_entry(record_type)?;

        let staging = temp_dir(&self.options)?;
        let name = container.file_name().unwrap_or(container.as_os_str());
        let pristine = staging.path().join(name);
        archive::extract_entry(&backup, &entry, &pristine)?;
        let records = self.codec.decode(&pristine, record_type)?;
        let cache = TypeCache::from_records(record_type, records);

        let originals = self.originals.entry(record_type).or_default();
        for key in cache.keys() {
            if let Some(record) = cache.get(key) {
                originals.insert(key.clone(), record.deep_clone());
            }
        }
        log::info!(
            "Loaded {} original {} records from '{}'",
            cache.keys().len(),
            record_type,
            backup.display()
        );
        Ok(cache.keys().to_vec())
    }

    /// Replaces the live archive with its backup and ends the session.
    pub fn restore_all(self) -> Result<()> {
        let backup = self.backups.require_backup(&self.archive)?;
        atomic_replace(&backup, &self.archive)?;
        log::info!(
            "Restored '{}' from '{}'",
            self.archive.display(),
            backup.display()
        );
        Ok(())
    }

    /// Returns the fingerprint of a record's original value.
    pub fn base_fingerprint(&self, record_type: RecordType, key: &str) -> Result<Fingerprint> {
        let record_key = RecordKey::new(record_type, key);
        self.original(&record_key)
            .map(Record::fingerprint)
            .ok_or(Error::RecordNotFound { key: record_key })
    }

    /// Returns the fingerprint of a record's current value.
    pub fn current_fingerprint(&self, record_type: RecordType, key: &str) -> Result<Fingerprint> {
        self.current
            .get(&record_type)
            .and_then(|cache| cache.get(key))
            .map(Record::fingerprint)
            .ok_or_else(|| Error::RecordNotFound {
                key: RecordKey::new(record_type, key),
            })
    }

    /// Updates a record and appends the edit to `patches`.
    pub fn commit_edit(
        &mut self,
        record_type: RecordType,
        key: &str,
        value: Record,
        patches: &mut PatchLog,
    ) -> Result<Patch> {
        self.ensure_loaded(record_type)?;
        self.check_editable(&RecordKey::new(record_type, key))?;
        let base = self.base_fingerprint(record_type, key)?;
        let logged = value.deep_clone();
        self.update_record(record_type, key, value)?;
        patches.append(record_type, key, &logged, base)
    }

    /// Lists `record_type` if it has not been listed in this session.
    pub(crate) fn ensure_loaded(&mut self, record_type: RecordType) -> Result<()> {
        if !self.current.contains_key(&record_type) {
            self.list_records(record_type)?;
        }
        Ok(())
    }

    fn resolve(&mut self, record_type: RecordType) -> Result<PathBuf> {
        if let Some(path) = self.containers.get(&record_type) {
            return Ok(path.clone());
        }
        let path = resolve::resolve_container(self.scratch.path(), record_type)?;
        log::info!("Resolved {} container to '{}'", record_type, path.display());
        self.containers.insert(record_type, path.clone());
        Ok(path)
    }

    /// Locates the backup and the type's entry in it, checking both exist.
    fn backup_entry(&mut self, record_type: RecordType) -> Result<(PathBuf, PathBuf, String)> {
        let backup = self.backups.require_backup(&self.archive)?;
        let container = self.resolve(record_type)?;
        let entry = archive::entry_name(self.scratch.path(), &container)
            .ok_or_else(|| Error::not_found(NotFoundKind::Container, container.clone()))?;
        if !archive::has_entry(&backup, &entry)? {
            return Err(Error::not_found(
                NotFoundKind::BackupEntry,
                backup.join(&entry),
            ));
        }
        Ok((backup, container, entry))
    }

    fn original(&self, key: &RecordKey) -> Option<&Record> {
        self.originals
            .get(&key.record_type)
            .and_then(|originals| originals.get(&key.key))
    }

    fn check_editable(&self, key: &RecordKey) -> Result<()> {
        match self.current.get(&key.record_type) {
            Some(cache) if cache.is_diagnostic() => {
                if cache.get(&key.key).is_some() {
                    Err(Error::ReadOnlyRecord { key: key.clone() })
                } else {
                    Err(Error::RecordNotFound { key: key.clone() })
                }
            }
            Some(cache) if cache.get(&key.key).is_some() => Ok(()),
            _ => Err(Error::RecordNotFound { key: key.clone() }),
        }
    }

    fn replace_and_write(&mut self, key: &RecordKey, value: Record) -> Result<()> {
        let previous = self
            .current
            .get_mut(&key.record_type)
            .and_then(|cache| cache.replace(&key.key, value))
            .ok_or_else(|| Error::RecordNotFound { key: key.clone() })?;

        if let Err(err) = self.write_type(key.record_type) {
            if let Some(cache) = self.current.get_mut(&key.record_type) {
                cache.replace(&key.key, previous);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Encodes the cached records of a type and repacks the archive.
    fn write_type(&mut self, record_type: RecordType) -> Result<()> {
        let container = self.resolve(record_type)?;
        let snapshot = match fs::read(&container) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let records = self
            .current
            .get(&record_type)
            .map(TypeCache::records)
            .unwrap_or_default();

        let written = self
            .codec
            .encode(&container, record_type, records)
            .and_then(|()| archive::repack(self.scratch.path(), &self.archive));

        match written {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Err(rollback) = put_back(&container, snapshot.as_deref()) {
                    log::warn!(
                        "Could not roll back '{}': {}",
                        container.display(),
                        rollback
                    );
                }
                Err(err)
            }
        }
    }
}

/// Creates a private directory under the configured scratch parent.
fn temp_dir(options: &SessionOptions) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(&options.scratch_prefix);
    let dir = match &options.scratch_parent {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            builder.tempdir_in(parent)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// Restores container bytes captured before a failed write.
fn put_back(container: &Path, snapshot: Option<&[u8]>) -> Result<()> {
    match snapshot {
        Some(bytes) => {
            let mut file = AtomicFile::create(container)?;
            file.write_all(bytes)?;
            file.commit()
        }
        None => match fs::remove_file(container) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        },
    }
}

/// Builds the diagnostic record for a failed decode.
///
/// Errors that do not describe the container or the helper are returned.
fn diagnostic_for(
    record_type: RecordType,
    container: &Path,
    err: Error,
) -> Result<(String, Record)> {
    if let Error::NotFound {
        what: NotFoundKind::Container,
        ..
    } = err
    {
        let key = record_type.missing_key();
        let mut record = Record::diagnostic(key.clone(), format!("{} file not found", record_type));
        record.insert("path", container.display().to_string());
        return Ok((key, record));
    }
    if !err.degrades_to_diagnostic() {
        return Err(err);
    }

    let key = record_type.raw_key();
    let record = match err {
        Error::UnrecognizedContainer { preview, .. } => {
            let mut record = Record::diagnostic(key.clone(), format!("Unparsed {}", record_type));
            record.insert("raw", preview);
            record
        }
        Error::MalformedOutput { reason, preview } => {
            let name = reason
                .split_once(": ")
                .map_or(reason.as_str(), |(head, _)| head)
                .to_string();
            let mut record = Record::diagnostic(key.clone(), name);
            record.insert("error", reason);
            record.insert("firstOut", preview);
            record
        }
        other => {
            let mut record = Record::diagnostic(key.clone(), "Java deserialization failed");
            record.insert("error", Value::String(other.to_string()));
            record
        }
    };
    Ok((key, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeOperation;

    #[test]
    fn test_diagnostic_for_missing_container() {
        let (key, record) = diagnostic_for(
            RecordType::Loadouts,
            Path::new("modules/loadouts.dat"),
            Error::not_found(NotFoundKind::Container, "modules/loadouts.dat"),
        )
        .unwrap();
        assert_eq!(key, "missing_loadouts");
        assert_eq!(record.identifier().as_deref(), Some("missing_loadouts"));
        assert_eq!(
            record.get("name"),
            Some(&Value::from("Loadouts file not found"))
        );
    }

    #[test]
    fn test_diagnostic_for_bridge_failure() {
        let (key, record) = diagnostic_for(
            RecordType::Loadouts,
            Path::new("x"),
            Error::bridge_failure(BridgeOperation::Decode, Some(1), "ClassNotFoundException"),
        )
        .unwrap();
        assert_eq!(key, "raw_loadouts");
        assert_eq!(
            record.get("name"),
            Some(&Value::from("Java deserialization failed"))
        );
        let error = record.get("error").and_then(Value::as_str).unwrap();
        assert!(error.contains("ClassNotFoundException"));
    }

    #[test]
    fn test_diagnostic_for_malformed_output() {
        let (_, record) = diagnostic_for(
            RecordType::Loadouts,
            Path::new("x"),
            Error::MalformedOutput {
                reason: "Bad JSON from helper: expected value at line 1 column 1".into(),
                preview: "oops".into(),
            },
        )
        .unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Bad JSON from helper")));
        assert_eq!(record.get("firstOut"), Some(&Value::from("oops")));
    }

    #[test]
    fn test_diagnostic_for_unrecognized_container() {
        let (_, record) = diagnostic_for(
            RecordType::Loadouts,
            Path::new("x"),
            Error::UnrecognizedContainer {
                path: "x".into(),
                preview: "plain text".into(),
            },
        )
        .unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Unparsed Loadouts")));
        assert_eq!(record.get("raw"), Some(&Value::from("plain text")));
    }

    #[test]
    fn test_io_errors_are_not_diagnostics() {
        let err = diagnostic_for(
            RecordType::Loadouts,
            Path::new("x"),
            Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
