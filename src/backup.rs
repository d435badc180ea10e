//! Pristine archive backups and rollback directories.
//!
//! The first time an archive is opened, a byte-for-byte copy is written next
//! to it with the [`BACKUP_SUFFIX`] appended. That copy is never refreshed:
//! its presence alone means "already backed up", and it stays the reference
//! for restoring single record types or the whole archive.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::atomic::atomic_replace;
use crate::error::NotFoundKind;
use crate::{Error, Result};

/// Suffix appended to the archive path to form the backup path.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Default directory holding per-profile data.
pub const DEFAULT_PROFILE_ROOT: &str = "profiles";

/// Creates and locates archive backups.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILE_ROOT)
    }
}

impl BackupManager {
    /// Creates a manager whose rollback directories live under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the profile root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the backup path for an archive.
    pub fn backup_path(&self, archive: &Path) -> PathBuf {
        let mut path = archive.as_os_str().to_owned();
        path.push(BACKUP_SUFFIX);
        PathBuf::from(path)
    }

    /// Makes sure a backup of `archive` exists and returns its path.
    ///
    /// An existing backup is left as is, even if the archive has changed
    /// since it was taken.
    pub fn ensure_backup(&self, archive: &Path) -> Result<PathBuf> {
        let backup = self.backup_path(archive);
        if backup.exists() {
            log::debug!("Backup already present at '{}'", backup.display());
            return Ok(backup);
        }
        if !archive.exists() {
            return Err(Error::not_found(NotFoundKind::Archive, archive));
        }

        atomic_replace(archive, &backup)?;
        log::info!("Created backup '{}'", backup.display());
        Ok(backup)
    }

    /// Returns the backup path, failing if no backup has been taken.
    pub fn require_backup(&self, archive: &Path) -> Result<PathBuf> {
        let backup = self.backup_path(archive);
        if backup.is_file() {
            Ok(backup)
        } else {
            Err(Error::not_found(NotFoundKind::Backup, backup))
        }
    }

    /// Creates a fresh timestamped rollback directory for `profile`.
    ///
    /// The layout is `<root>/<profile>/backups/<YYYYmmdd-HHMMSS>`. A second
    /// directory within the same second gets a `-1`, `-2`, ... suffix, so an
    /// earlier rollback is never reused.
    pub fn rollback_dir(&self, profile: &str) -> Result<PathBuf> {
        let parent = self.root.join(profile).join("backups");
        std::fs::create_dir_all(&parent)?;

        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                stamp.clone()
            } else {
                format!("{}-{}", stamp, attempt)
            };
            let dir = parent.join(name);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
