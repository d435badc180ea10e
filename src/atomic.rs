//! Crash-safe file replacement.
//!
//! Every write to the archive, its backup and restored containers goes
//! through this module. New content is written to a temporary file in the
//! destination's directory, synced, and renamed over the destination in one
//! step, so readers see either the old bytes or the new bytes and never a
//! partial file.
//!
//! There is no cross-process locking here: two writers racing on the same
//! destination each produce a complete file and the last rename wins.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::io::Write;
//! use jarpatch::atomic::AtomicFile;
//!
//! let mut file = AtomicFile::create("settings.json")?;
//! file.write_all(b"{}")?;
//! file.commit()?;
//! # Ok::<(), jarpatch::Error>(())
//! ```

use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::Result;

/// A pending replacement of a destination file.
///
/// Content written to the `AtomicFile` lands in a temporary sibling of the
/// destination. [`commit`](Self::commit) moves it into place; dropping the
/// value without committing deletes the temporary file and leaves the
/// destination untouched.
#[derive(Debug)]
pub struct AtomicFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl AtomicFile {
    /// Starts a replacement of `dest`.
    ///
    /// The destination itself is not touched until [`commit`](Self::commit).
    pub fn create(dest: impl AsRef<Path>) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmpswap")
            .tempfile_in(dir)?;

        Ok(Self { temp, dest })
    }

    /// Returns the destination path.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Returns the temporary file's path.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Returns the temporary file for writers that need `Seek` as well.
    pub fn as_file_mut(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// Syncs the temporary file and renames it over the destination.
    pub fn commit(self) -> Result<()> {
        self.temp.as_file().sync_all()?;
        self.temp.persist(&self.dest).map_err(|e| e.error)?;
        log::debug!("Replaced '{}'", self.dest.display());
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl Seek for AtomicFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.temp.seek(pos)
    }
}

/// Replaces `dest` with a copy of `source`.
///
/// The copy is made into a temporary file next to `dest` and then renamed
/// onto it, so `dest` is never observed half-written.
pub fn atomic_replace(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    let mut reader = BufReader::new(File::open(source.as_ref())?);
    let mut file = AtomicFile::create(dest)?;
    io::copy(&mut reader, &mut file)?;
    file.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_replace_copies_content() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, b"new content").unwrap();
        std::fs::write(&dst, b"old").unwrap();

        atomic_replace(&src, &dst).unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"new content");
        assert_eq!(std::fs::read(&src).unwrap(), b"new content");
    }

    #[test]
    fn test_atomic_replace_creates_missing_dest() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("fresh.bin");
        std::fs::write(&src, b"abc").unwrap();

        atomic_replace(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"abc");
    }

    #[test]
    fn test_uncommitted_write_leaves_dest_unchanged() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("archive.jar");
        std::fs::write(&dst, b"original bytes").unwrap();

        let temp_path = {
            let mut file = AtomicFile::create(&dst).unwrap();
            file.write_all(b"partially written replacement").unwrap();
            file.flush().unwrap();
            file.temp_path().to_path_buf()
            // dropped here without commit
        };

        assert_eq!(std::fs::read(&dst).unwrap(), b"original bytes");
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_temp_file_is_colocated() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("archive.jar");
        let file = AtomicFile::create(&dst).unwrap();
        assert_eq!(file.temp_path().parent(), Some(dir.path()));
        assert_eq!(file.dest(), dst.as_path());
    }

    #[test]
    fn test_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst.bin");
        std::fs::write(&dst, b"keep").unwrap();

        let err = atomic_replace(dir.path().join("nope"), &dst).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(std::fs::read(&dst).unwrap(), b"keep");
    }
}
