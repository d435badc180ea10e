//! Locating a record type's container inside the scratch tree.

use std::io;
use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use walkdir::WalkDir;

use crate::Result;
use crate::archive::entry_name;
use crate::record::RecordType;

/// Finds the container file for `record_type` under `root`.
///
/// Conventional locations are tried first. Otherwise the tree is searched for
/// a `.dat` file whose name contains the type's stem and which sits somewhere
/// below a `modules` directory. When nothing matches, the conventional
/// `modules/<stem>.dat` path is returned so later errors name a sensible file.
pub(crate) fn resolve_container(root: &Path, record_type: RecordType) -> Result<PathBuf> {
    for relative in record_type.conventional_paths() {
        let candidate = join_entry(root, relative);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let pattern = format!(
        r"(^|/)modules/(.*/)?[^/]*{}[^/]*\.dat$",
        regex::escape(record_type.stem())
    );
    let matcher = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let found = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| {
            entry_name(root, entry.path()).is_some_and(|name| matcher.is_match(&name))
        });

    match found {
        Some(entry) => Ok(entry.into_path()),
        None => {
            let guess = join_entry(root, &format!("modules/{}.dat", record_type.stem()));
            log::warn!(
                "No {} container found, assuming '{}'",
                record_type,
                guess.display()
            );
            Ok(guess)
        }
    }
}

fn join_entry(root: &Path, entry: &str) -> PathBuf {
    entry
        .split('/')
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = join_entry(root, rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_conventional_path_first() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "dot/modules/loadouts.dat");
        let expected = touch(dir.path(), "modules/loadouts.dat");
        assert_eq!(
            resolve_container(dir.path(), RecordType::Loadouts).unwrap(),
            expected
        );
    }

    #[test]
    fn test_secondary_conventional_path() {
        let dir = TempDir::new().unwrap();
        let expected = touch(dir.path(), "dot/modules/loadouts.dat");
        assert_eq!(
            resolve_container(dir.path(), RecordType::Loadouts).unwrap(),
            expected
        );
    }

    #[test]
    fn test_search_below_modules() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "data/Loadouts.dat");
        let expected = touch(dir.path(), "game/Modules/core/PlayerLoadouts_v2.DAT");
        assert_eq!(
            resolve_container(dir.path(), RecordType::Loadouts).unwrap(),
            expected
        );
    }

    #[test]
    fn test_best_guess_when_missing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "modules/items.dat");
        let path = resolve_container(dir.path(), RecordType::Loadouts).unwrap();
        assert_eq!(path, dir.path().join("modules").join("loadouts.dat"));
        assert!(!path.exists());
    }
}
