//! Zip extraction and repacking.
//!
//! The record session works on an extracted copy of the archive. This module
//! moves data between the zip container and that scratch tree:
//!
//! 1. [`extract_all`] unpacks every entry into a directory
//! 2. [`extract_entry`] pulls one entry out (used to restore from a backup)
//! 3. [`repack`] zips the whole directory back up with deflate and swaps it
//!    over the archive through [`AtomicFile`]
//!
//! Entry names always use `/` separators, and entries whose names would land
//! outside the destination directory are skipped.

use std::fs::{self, File};
use std::io::{self, BufReader, Seek, Write};
use std::path::{Component, Path};

use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::atomic::AtomicFile;
use crate::error::NotFoundKind;
use crate::{Error, Result};

/// Result of extracting an archive.
#[must_use = "extract result should be checked for skipped entries"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractResult {
    /// Number of files written.
    pub files: usize,
    /// Number of directory entries created.
    pub directories: usize,
    /// Entry names that were skipped because they escape the destination.
    pub skipped: Vec<String>,
}

/// Result of repacking a directory.
#[must_use = "repack result should be checked to verify the archive contents"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepackResult {
    /// Number of files written.
    pub files: usize,
    /// Number of directory entries written.
    pub directories: usize,
    /// Uncompressed bytes written.
    pub total_bytes: u64,
}

fn open_zip(path: &Path, missing: NotFoundKind) -> Result<ZipArchive<BufReader<File>>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::not_found(missing, path));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Extracts every entry of `archive` into `dest`.
pub fn extract_all(archive: &Path, dest: &Path) -> Result<ExtractResult> {
    let mut zip = open_zip(archive, NotFoundKind::Archive)?;
    let mut result = ExtractResult::default();
    fs::create_dir_all(dest)?;

    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe archive entry '{}'", entry.name());
            result.skipped.push(entry.name().to_string());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            result.directories += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        result.files += 1;
    }

    log::info!(
        "Extracted {} files from '{}' to '{}'",
        result.files,
        archive.display(),
        dest.display()
    );
    Ok(result)
}

/// Extracts the single entry `name` of `archive` to the file `dest`.
///
/// `dest` is replaced atomically. Fails with [`NotFoundKind::Backup`] if the
/// archive is missing and [`NotFoundKind::BackupEntry`] if it has no such
/// entry; in both cases `dest` is left untouched.
pub fn extract_entry(archive: &Path, name: &str, dest: &Path) -> Result<u64> {
    let mut zip = open_zip(archive, NotFoundKind::Backup)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(Error::not_found(
                NotFoundKind::BackupEntry,
                archive.join(name),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = AtomicFile::create(dest)?;
    let copied = io::copy(&mut entry, &mut out)?;
    out.commit()?;
    Ok(copied)
}

/// Returns `true` if `archive` contains an entry named `name`.
pub fn has_entry(archive: &Path, name: &str) -> Result<bool> {
    let zip = open_zip(archive, NotFoundKind::Backup)?;
    Ok(zip.index_for_name(name).is_some())
}

/// Returns the `/`-separated entry name of `path` relative to `root`.
pub fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Zips the tree under `dir` into `writer` with deflate compression.
///
/// Files are written in sorted path order so the same tree always produces
/// the same entry order.
pub fn write_tree<W: Write + Seek>(dir: &Path, writer: W) -> Result<RepackResult> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut result = RepackResult::default();

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let Some(name) = entry_name(dir, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
            result.directories += 1;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut input = BufReader::new(File::open(entry.path())?);
            result.total_bytes += io::copy(&mut input, &mut zip)?;
            result.files += 1;
        }
    }

    zip.finish()?;
    Ok(result)
}

/// Zips the tree under `dir` and atomically replaces `archive` with it.
pub fn repack(dir: &Path, archive: &Path) -> Result<RepackResult> {
    let mut out = AtomicFile::create(archive)?;
    let result = write_tree(dir, &mut out)?;
    out.commit()?;
    log::info!(
        "Repacked {} files ({} bytes) into '{}'",
        result.files,
        result.total_bytes,
        archive.display()
    );
    Ok(result)
}
