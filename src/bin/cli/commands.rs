//! Command implementations for the CLI tool.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jarpatch::session::DEFAULT_PROFILE;
use jarpatch::{
    ArchiveSession, BridgeConfig, Codec, ConflictPolicy, JsonFileCodec, PatchLog, ProcessCodec,
    Record, RecordKey, RecordType, ReplayOptions, Replayer, SessionOptions,
};

use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::output::create_formatter;
use crate::{CodecKind, OutputFormat};

/// Settings shared by every command.
pub struct Context {
    pub format: OutputFormat,
    pub profile: PathBuf,
    pub codec: CodecKind,
    pub game_jar: Option<PathBuf>,
    pub timeout: u64,
}

impl Context {
    fn session_options(&self) -> SessionOptions {
        let root = match self.profile.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let profile = self
            .profile
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        SessionOptions::new().profile_root(root).profile(profile)
    }

    fn codec(&self) -> Result<Box<dyn Codec>, ExitCode> {
        match self.codec {
            CodecKind::Json => Ok(Box::new(JsonFileCodec::new())),
            CodecKind::Process => {
                let mut config = BridgeConfig::from_env();
                if let Some(jar) = &self.game_jar {
                    if jar.is_file() {
                        config = config.game_jar(jar);
                    }
                }
                let timeout = (self.timeout > 0).then(|| Duration::from_secs(self.timeout));
                ProcessCodec::new(config.timeout(timeout))
                    .map(|codec| Box::new(codec) as Box<dyn Codec>)
                    .map_err(|e| fail("Error setting up helper", &e))
            }
        }
    }

    fn open_session(&self, archive: &Path) -> Result<ArchiveSession, ExitCode> {
        let codec = self.codec()?;
        ArchiveSession::open_with_options(archive, codec, self.session_options())
            .map_err(|e| fail("Error opening archive", &e))
    }

    fn open_log(&self) -> Result<PatchLog, ExitCode> {
        PatchLog::open(&self.profile).map_err(|e| fail("Error opening patch log", &e))
    }
}

fn fail(context: &str, error: &jarpatch::Error) -> ExitCode {
    eprintln!("{}: {}", context, error);
    error_to_exit_code(error)
}

/// Unwraps a step result or returns its exit code from the command.
macro_rules! step {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(code) => return code,
        }
    };
}

/// List command implementation
pub fn list(ctx: &Context, archive: &Path, record_type: RecordType) -> ExitCode {
    let formatter = create_formatter(ctx.format);
    let mut session = step!(ctx.open_session(archive));

    let keys = step!(
        session
            .list_records(record_type)
            .map_err(|e| fail("Error listing records", &e))
    );

    print!("{}", formatter.format_keys(record_type, &keys));
    ExitCode::Success
}

/// Show command implementation
pub fn show(ctx: &Context, archive: &Path, record_type: RecordType, key: &str) -> ExitCode {
    let formatter = create_formatter(ctx.format);
    let mut session = step!(ctx.open_session(archive));

    step!(
        session
            .list_records(record_type)
            .map_err(|e| fail("Error listing records", &e))
    );
    let record = step!(
        session
            .get_record(record_type, key)
            .map_err(|e| fail("Error reading record", &e))
    );

    print!(
        "{}",
        formatter.format_record(&RecordKey::new(record_type, key), &record)
    );
    ExitCode::Success
}

/// Set command implementation
pub fn set(
    ctx: &Context,
    archive: &Path,
    record_type: RecordType,
    key: &str,
    input: Option<&Path>,
) -> ExitCode {
    let formatter = create_formatter(ctx.format);

    let record = match read_record(input) {
        Ok(record) => record,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::BadArgs;
        }
    };

    let mut log = step!(ctx.open_log());
    let mut session = step!(ctx.open_session(archive));
    let patch = step!(
        session
            .commit_edit(record_type, key, record, &mut log)
            .map_err(|e| fail("Error saving record", &e))
    );

    print!("{}", formatter.format_patch(&patch));
    ExitCode::Success
}

/// Restore command implementation
pub fn restore(ctx: &Context, archive: &Path, record_type: RecordType, key: &str) -> ExitCode {
    let formatter = create_formatter(ctx.format);
    let mut session = step!(ctx.open_session(archive));

    // The archive may already hold edits from earlier runs; the backup does not.
    step!(
        session
            .load_originals_from_backup(record_type)
            .map_err(|e| fail("Error reading backup", &e))
    );
    step!(
        session
            .restore_record(record_type, key)
            .map_err(|e| fail("Error restoring record", &e))
    );

    print!(
        "{}",
        formatter.format_restored(&RecordKey::new(record_type, key).to_string())
    );
    ExitCode::Success
}

/// Restore-type command implementation
pub fn restore_type(ctx: &Context, archive: &Path, record_type: RecordType) -> ExitCode {
    let formatter = create_formatter(ctx.format);
    let mut session = step!(ctx.open_session(archive));

    let keys = step!(
        session
            .restore_object_type(record_type)
            .map_err(|e| fail("Error restoring record type", &e))
    );

    print!("{}", formatter.format_restored(record_type.name()));
    print!("{}", formatter.format_keys(record_type, &keys));
    ExitCode::Success
}

/// Restore-all command implementation
pub fn restore_all(ctx: &Context, archive: &Path) -> ExitCode {
    let formatter = create_formatter(ctx.format);
    let session = step!(ctx.open_session(archive));

    step!(
        session
            .restore_all()
            .map_err(|e| fail("Error restoring archive", &e))
    );

    print!(
        "{}",
        formatter.format_restored(&archive.display().to_string())
    );
    ExitCode::Success
}

/// Reapply command implementation
pub fn reapply(ctx: &Context, archive: &Path, overwrite: bool) -> ExitCode {
    let formatter = create_formatter(ctx.format);
    let log = step!(ctx.open_log());
    let mut session = step!(ctx.open_session(archive));

    let policy = if overwrite {
        ConflictPolicy::Overwrite
    } else {
        ConflictPolicy::RejectDrifted
    };
    let replayer = Replayer::new(ReplayOptions::new().policy(policy));
    let report = step!(
        replayer
            .apply_all(&mut session, &log)
            .map_err(|e| fail("Error reading patch log", &e))
    );

    print!("{}", formatter.format_replay(&report));
    if report.is_clean() {
        ExitCode::Success
    } else {
        ExitCode::Conflicts
    }
}

/// Log command implementation
pub fn show_log(ctx: &Context) -> ExitCode {
    let formatter = create_formatter(ctx.format);
    let log = step!(ctx.open_log());

    let patches = step!(
        log.load_all()
            .map_err(|e| fail("Error reading patch log", &e))
    );

    print!("{}", formatter.format_log(&patches));
    ExitCode::Success
}

/// Reads a replacement record from a file, or stdin for `None` and `-`.
fn read_record(input: Option<&Path>) -> Result<Record, String> {
    let text = match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?,
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| format!("cannot read stdin: {}", e))?;
            text
        }
    };

    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {}", e))?;
    Record::from_value(value).ok_or_else(|| "record must be a JSON object".to_string())
}
