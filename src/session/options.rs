//! Session configuration.

use std::path::PathBuf;

use crate::backup::DEFAULT_PROFILE_ROOT;

/// Default prefix of scratch directory names.
pub const DEFAULT_SCRATCH_PREFIX: &str = "jarpatch_";

/// Default profile name.
pub const DEFAULT_PROFILE: &str = "default";

/// Options for [`ArchiveSession::open_with_options`].
///
/// # Example
///
/// ```rust
/// use jarpatch::SessionOptions;
///
/// let options = SessionOptions::new()
///     .scratch_parent("/var/tmp")
///     .profile_root("state/profiles")
///     .keep_rollbacks(false);
/// assert_eq!(options.profile, "default");
/// ```
///
/// [`ArchiveSession::open_with_options`]: crate::ArchiveSession::open_with_options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory in which the scratch directory is created (system temp if `None`).
    pub scratch_parent: Option<PathBuf>,
    /// Prefix of the scratch directory name.
    pub scratch_prefix: String,
    /// Root of per-profile data (rollback directories).
    pub profile_root: PathBuf,
    /// Profile whose rollback directory receives replaced containers.
    pub profile: String,
    /// Copy the current container aside before restoring a record type.
    pub keep_rollbacks: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            scratch_parent: None,
            scratch_prefix: DEFAULT_SCRATCH_PREFIX.to_string(),
            profile_root: PathBuf::from(DEFAULT_PROFILE_ROOT),
            profile: DEFAULT_PROFILE.to_string(),
            keep_rollbacks: true,
        }
    }
}

impl SessionOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory the scratch directory is created in.
    pub fn scratch_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(dir.into());
        self
    }

    /// Sets the scratch directory name prefix.
    pub fn scratch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scratch_prefix = prefix.into();
        self
    }

    /// Sets the profile root.
    pub fn profile_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.profile_root = root.into();
        self
    }

    /// Sets the profile name.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Enables or disables rollback copies on type restore.
    pub fn keep_rollbacks(mut self, keep: bool) -> Self {
        self.keep_rollbacks = keep;
        self
    }
}
