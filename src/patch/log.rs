//! Append-only patch log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

use super::Patch;
use crate::fingerprint::Fingerprint;
use crate::record::{Record, RecordType};
use crate::{Error, Result};

/// File name of the log inside a profile directory.
pub const PATCH_LOG_FILE: &str = "patches.jsonl";

/// Profile directory used when none is given.
pub const DEFAULT_PROFILE_DIR: &str = "profiles/default";

/// Newline-delimited JSON ledger of patches.
///
/// Lines are only ever appended. Patch timestamps, and with them patch ids,
/// strictly increase within one log even if the clock stalls or steps back.
#[derive(Debug)]
pub struct PatchLog {
    path: PathBuf,
    last_created: Option<DateTime<Utc>>,
}

impl PatchLog {
    /// Opens the log in `profile_dir`, creating the directory if needed.
    pub fn open(profile_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = profile_dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(PATCH_LOG_FILE);
        let last_created = latest_created(&path)?;
        Ok(Self { path, last_created })
    }

    /// Opens the log of the default profile.
    pub fn open_default() -> Result<Self> {
        Self::open(DEFAULT_PROFILE_DIR)
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a patch replacing `key` with `value`.
    pub fn append(
        &mut self,
        record_type: RecordType,
        key: &str,
        value: &Record,
        base_hash: Fingerprint,
    ) -> Result<Patch> {
        let created = self.next_timestamp();
        let patch = Patch::replace(record_type, key, value, base_hash, created);

        let mut line = serde_json::to_string(&patch)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        self.last_created = Some(created);
        log::debug!("Logged patch {}", patch.id);
        Ok(patch)
    }

    /// Reads every patch in log order.
    ///
    /// A missing file is an empty log. Blank lines are ignored; any other
    /// line that does not parse fails the whole load.
    pub fn load_all(&self) -> Result<Vec<Patch>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut patches = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let patch = serde_json::from_str(&line).map_err(|e| Error::PatchLogCorrupt {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            patches.push(patch);
        }
        Ok(patches)
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        match self.last_created {
            Some(last) if last >= now => last + TimeDelta::microseconds(1),
            _ => now,
        }
    }
}

/// Finds the newest creation time already in the log.
///
/// Unparsable lines are skipped here; [`PatchLog::load_all`] reports them.
fn latest_created(path: &Path) -> Result<Option<DateTime<Utc>>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest = None;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(patch) = serde_json::from_str::<Patch>(&line) {
            latest = latest.max(Some(patch.created));
        }
    }
    Ok(latest)
}
