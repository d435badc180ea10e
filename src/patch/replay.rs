//! Replaying logged patches onto a session.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::{Patch, PatchLog};
use crate::bridge::Codec;
use crate::fingerprint::Fingerprint;
use crate::session::ArchiveSession;
use crate::{Error, Result};

/// How to treat records whose base no longer matches the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Skip a patch if the record's current fingerprint is not one the log
    /// knows for that record (a recorded base or a recorded result).
    #[default]
    RejectDrifted,
    /// Apply every patch; the last write wins.
    Overwrite,
}

/// Options for a [`Replayer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// Conflict policy.
    pub policy: ConflictPolicy,
}

impl ReplayOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the conflict policy.
    pub fn policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// A patch that could not be applied.
#[derive(Debug)]
pub struct Conflict {
    /// The patch identifier.
    pub patch_id: String,
    /// The patch target as written, `<type>:<key>`.
    pub key: String,
    /// Why the patch was not applied.
    pub error: Error,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.patch_id, self.key, self.error)
    }
}

/// Outcome of a replay.
#[must_use = "replay report should be checked for conflicts"]
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Number of patches applied.
    pub applied: usize,
    /// Patches that were skipped, in log order.
    pub conflicts: Vec<Conflict>,
}

impl ReplayReport {
    /// Returns `true` if every patch was applied.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Returns the number of patches processed.
    pub fn total(&self) -> usize {
        self.applied + self.conflicts.len()
    }
}

/// Applies a patch log to a session.
///
/// Patches are applied in log order through
/// [`ArchiveSession::update_record`]. A patch that fails is recorded as a
/// [`Conflict`] and the replay moves on.
#[derive(Debug, Clone, Default)]
pub struct Replayer {
    options: ReplayOptions,
}

type KnownFingerprints = HashMap<(String, String), HashSet<Fingerprint>>;

impl Replayer {
    /// Creates a replayer.
    pub fn new(options: ReplayOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Replays every patch in `log` onto `session`.
    ///
    /// Fails only if the log itself cannot be read.
    pub fn apply_all<C: Codec>(
        &self,
        session: &mut ArchiveSession<C>,
        log: &PatchLog,
    ) -> Result<ReplayReport> {
        let patches = log.load_all()?;
        Ok(self.apply_patches(session, &patches))
    }

    /// Replays already loaded patches.
    pub fn apply_patches<C: Codec>(
        &self,
        session: &mut ArchiveSession<C>,
        patches: &[Patch],
    ) -> ReplayReport {
        let known = known_fingerprints(patches);
        let mut report = ReplayReport::default();

        for patch in patches {
            match self.apply_one(session, patch, &known) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    let conflict = Conflict {
                        patch_id: patch.id.clone(),
                        key: format!("{}:{}", patch.target.record_type, patch.target.key),
                        error,
                    };
                    log::warn!("Patch not applied: {}", conflict);
                    report.conflicts.push(conflict);
                }
            }
        }

        log::info!(
            "Replayed {} of {} patches ({} conflicts)",
            report.applied,
            report.total(),
            report.conflicts.len()
        );
        report
    }

    fn apply_one<C: Codec>(
        &self,
        session: &mut ArchiveSession<C>,
        patch: &Patch,
        known: &KnownFingerprints,
    ) -> Result<()> {
        let record_type = patch.record_type()?;
        let value = patch.replacement()?;
        let key = &patch.target.key;

        if self.options.policy == ConflictPolicy::RejectDrifted {
            session.ensure_loaded(record_type)?;
            let live = session.current_fingerprint(record_type, key)?;
            let recognised = known
                .get(&(patch.target.record_type.clone(), key.clone()))
                .is_some_and(|set| set.contains(&live));
            if !recognised {
                return Err(Error::Conflict {
                    key: patch.record_key()?,
                    expected: patch.target.base_hash.clone(),
                    found: live,
                });
            }
        }

        session.update_record(record_type, key, value)
    }
}

/// Replays `log` onto `session` with default options.
pub fn apply_all<C: Codec>(session: &mut ArchiveSession<C>, log: &PatchLog) -> Result<ReplayReport> {
    Replayer::default().apply_all(session, log)
}

fn known_fingerprints(patches: &[Patch]) -> KnownFingerprints {
    let mut known = KnownFingerprints::new();
    for patch in patches {
        let set = known
            .entry((patch.target.record_type.clone(), patch.target.key.clone()))
            .or_default();
        set.insert(patch.target.base_hash.clone());
        set.insert(patch.hash.clone());
    }
    known
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordType};
    use chrono::Utc;
    use serde_json::json;

    fn patch(key: &str, base: &Record, value: &Record) -> Patch {
        Patch::replace(
            RecordType::Loadouts,
            key,
            value,
            base.fingerprint(),
            Utc::now(),
        )
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_known_fingerprints_include_bases_and_results() {
        let v0 = record(json!({"key": "warrior", "power": 5}));
        let v1 = record(json!({"key": "warrior", "power": 6}));
        let v2 = record(json!({"key": "warrior", "power": 7}));
        let patches = vec![patch("warrior", &v0, &v1), patch("warrior", &v0, &v2)];

        let known = known_fingerprints(&patches);
        let set = &known[&("Loadouts".to_string(), "warrior".to_string())];
        assert_eq!(set.len(), 3);
        for v in [&v0, &v1, &v2] {
            assert!(set.contains(&v.fingerprint()));
        }
    }

    #[test]
    fn test_report_counts() {
        let mut report = ReplayReport::default();
        assert!(report.is_clean());
        report.applied = 2;
        report.conflicts.push(Conflict {
            patch_id: "Loadouts:x:2024-01-01T00:00:00.000000Z".into(),
            key: "Loadouts:x".into(),
            error: Error::UnsupportedType("Monsters".into()),
        });
        assert_eq!(report.total(), 3);
        assert!(!report.is_clean());
        assert!(report.conflicts[0].to_string().contains("Loadouts:x"));
    }

    #[test]
    fn test_default_policy_rejects_drift() {
        assert_eq!(ReplayOptions::new().policy, ConflictPolicy::RejectDrifted);
        let replayer = Replayer::new(ReplayOptions::new().policy(ConflictPolicy::Overwrite));
        assert_eq!(replayer.options().policy, ConflictPolicy::Overwrite);
    }
}
