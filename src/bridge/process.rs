//! Subprocess codec driving the external Java helper.
//!
//! The helper classes live in a directory next to the tool and need the
//! game jar on their classpath. Decoding runs
//!
//! ```text
//! java -Dfile.encoding=UTF-8 -cp .<sep><game jar> Dump<Type> <container> true
//! ```
//!
//! in the helper directory and reads a JSON array from stdout. Encoding
//! writes the records to a temporary JSON file and runs
//! `Write<Type> <container> <json file>`.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{
    CONTAINER_PREVIEW_CHARS, Codec, parse_record_array, preview, records_to_json,
};
use crate::error::{BridgeOperation, NotFoundKind};
use crate::record::{Record, RecordType};
use crate::{Error, Result};

/// Environment variable naming the game jar.
pub const GAME_JAR_ENV: &str = "DOT_JAR_PATH";

/// Environment variable overriding the helper class directory.
pub const HELPER_DIR_ENV: &str = "JARPATCH_HELPER_DIR";

/// Environment variable overriding the java executable.
pub const JAVA_ENV: &str = "JARPATCH_JAVA";

/// Game jar location used when [`GAME_JAR_ENV`] is unset or points nowhere.
pub const DEFAULT_GAME_JAR: &str =
    r"C:\Program Files (x86)\Steam\steamapps\common\The Doors of Trithius\DOT.jar";

/// Default helper class directory, relative to the working directory.
pub const DEFAULT_HELPER_DIR: &str = "tools/java";

/// Default limit on a single helper run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Stream header of Java object serialization.
pub const JAVA_SERIALIZATION_MAGIC: [u8; 2] = [0xAC, 0xED];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration for [`ProcessCodec`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use jarpatch::BridgeConfig;
///
/// let config = BridgeConfig::new()
///     .java("/usr/lib/jvm/java-17/bin/java")
///     .game_jar("/games/dot/DOT.jar")
///     .timeout(Some(Duration::from_secs(30)));
/// assert_eq!(config.decode_class_for(jarpatch::RecordType::Loadouts), "DumpLoadouts");
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The java executable.
    pub java: PathBuf,
    /// Options passed to the JVM before the classpath.
    pub jvm_args: Vec<String>,
    /// Directory holding the compiled helper classes; the helper runs here.
    pub helper_dir: PathBuf,
    /// The game jar placed on the classpath.
    pub game_jar: PathBuf,
    /// Limit on a single helper run. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Override for the decode main class (default `Dump<Type>`).
    pub decode_class: Option<String>,
    /// Override for the encode main class (default `Write<Type>`).
    pub encode_class: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
            jvm_args: vec!["-Dfile.encoding=UTF-8".to_string()],
            helper_dir: PathBuf::from(DEFAULT_HELPER_DIR),
            game_jar: PathBuf::from(DEFAULT_GAME_JAR),
            timeout: Some(DEFAULT_TIMEOUT),
            decode_class: None,
            encode_class: None,
        }
    }
}

impl BridgeConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var_os(name))
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// [`GAME_JAR_ENV`] is only honoured if it names an existing file.
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(java) = non_empty(JAVA_ENV) {
            config.java = PathBuf::from(java);
        }
        if let Some(dir) = non_empty(HELPER_DIR_ENV) {
            config.helper_dir = PathBuf::from(dir);
        }
        match non_empty(GAME_JAR_ENV).map(PathBuf::from) {
            Some(jar) if jar.exists() => config.game_jar = jar,
            Some(jar) => log::warn!(
                "{} points at missing '{}', using default game jar",
                GAME_JAR_ENV,
                jar.display()
            ),
            None => {}
        }
        config
    }

    /// Sets the java executable.
    pub fn java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    /// Replaces the JVM options.
    pub fn jvm_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jvm_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the helper class directory.
    pub fn helper_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.helper_dir = dir.into();
        self
    }

    /// Sets the game jar.
    pub fn game_jar(mut self, jar: impl Into<PathBuf>) -> Self {
        self.game_jar = jar.into();
        self
    }

    /// Sets the run timeout.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the decode main class.
    pub fn decode_class(mut self, class: impl Into<String>) -> Self {
        self.decode_class = Some(class.into());
        self
    }

    /// Overrides the encode main class.
    pub fn encode_class(mut self, class: impl Into<String>) -> Self {
        self.encode_class = Some(class.into());
        self
    }

    /// Returns the decode main class for a record type.
    pub fn decode_class_for(&self, record_type: RecordType) -> String {
        self.decode_class
            .clone()
            .unwrap_or_else(|| format!("Dump{}", record_type.name()))
    }

    /// Returns the encode main class for a record type.
    pub fn encode_class_for(&self, record_type: RecordType) -> String {
        self.encode_class
            .clone()
            .unwrap_or_else(|| format!("Write{}", record_type.name()))
    }
}

/// Codec that shells out to the Java helper.
#[derive(Debug, Clone)]
pub struct ProcessCodec {
    config: BridgeConfig,
    game_jar: PathBuf,
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessCodec {
    /// Creates a codec, failing if the game jar does not exist.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        if !config.game_jar.is_file() {
            return Err(Error::not_found(
                NotFoundKind::NativeAsset,
                config.game_jar.clone(),
            ));
        }
        let game_jar = std::path::absolute(&config.game_jar)?;
        Ok(Self { config, game_jar })
    }

    /// Creates a codec configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(BridgeConfig::from_env())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn command(&self, main_class: &str) -> Result<Command> {
        let classpath = std::env::join_paths([Path::new("."), self.game_jar.as_path()])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut cmd = Command::new(&self.config.java);
        cmd.args(&self.config.jvm_args)
            .arg("-cp")
            .arg(classpath)
            .arg(main_class)
            .current_dir(&self.config.helper_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(cmd)
    }

    fn run(&self, mut cmd: Command, operation: BridgeOperation) -> Result<Captured> {
        log::debug!("Running bridge {}: {:?}", operation, cmd);

        let mut child = cmd.spawn().map_err(|e| {
            Error::bridge_failure(
                operation,
                None,
                format!(
                    "failed to start '{}': {}",
                    self.config.java.display(),
                    e
                ),
            )
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.config.timeout {
            None => child.wait()?,
            Some(limit) => match wait_with_timeout(&mut child, limit)? {
                Some(status) => status,
                None => {
                    return Err(Error::bridge_failure(
                        operation,
                        None,
                        format!("helper timed out after {:?} and was killed", limit),
                    ));
                }
            },
        };

        Ok(Captured {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    fn check_status(captured: &Captured, operation: BridgeOperation) -> Result<()> {
        if captured.status.success() {
            Ok(())
        } else {
            Err(Error::bridge_failure(
                operation,
                captured.status.code(),
                decode_output(&captured.stderr),
            ))
        }
    }
}

impl Codec for ProcessCodec {
    fn decode(&self, container: &Path, record_type: RecordType) -> Result<Vec<Record>> {
        let container = std::path::absolute(container)?;
        check_container(&container)?;

        let mut cmd = self.command(&self.config.decode_class_for(record_type))?;
        cmd.arg(&container).arg("true");
        let captured = self.run(cmd, BridgeOperation::Decode)?;
        Self::check_status(&captured, BridgeOperation::Decode)?;

        parse_record_array(&decode_output(&captured.stdout))
    }

    fn encode(&self, container: &Path, record_type: RecordType, records: &[Record]) -> Result<()> {
        let container = std::path::absolute(container)?;
        let mut json = tempfile::Builder::new()
            .prefix("jarpatch_records_")
            .suffix(".json")
            .tempfile()?;
        json.write_all(records_to_json(records)?.as_bytes())?;
        json.flush()?;

        let mut cmd = self.command(&self.config.encode_class_for(record_type))?;
        cmd.arg(&container).arg(json.path());
        let captured = self.run(cmd, BridgeOperation::Encode)?;
        Self::check_status(&captured, BridgeOperation::Encode)?;

        log::debug!(
            "Encoded {} {} records into '{}'",
            records.len(),
            record_type,
            container.display()
        );
        Ok(())
    }
}

/// Rejects containers that are not Java serialization streams.
fn check_container(container: &Path) -> Result<()> {
    let mut file = match File::open(container) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::not_found(NotFoundKind::Container, container));
        }
        Err(e) => return Err(e.into()),
    };

    let mut header = Vec::with_capacity(JAVA_SERIALIZATION_MAGIC.len());
    (&mut file)
        .take(JAVA_SERIALIZATION_MAGIC.len() as u64)
        .read_to_end(&mut header)?;
    if header == JAVA_SERIALIZATION_MAGIC {
        return Ok(());
    }

    let mut rest = Vec::new();
    file.read_to_end(&mut rest)?;
    header.extend_from_slice(&rest);
    Err(Error::UnrecognizedContainer {
        path: container.to_path_buf(),
        preview: preview(&decode_output(&header), CONTAINER_PREVIEW_CHARS),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Waits for `child`, killing it once `limit` has passed.
///
/// Returns `None` if the child was killed.
fn wait_with_timeout(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Decodes helper output as UTF-8, falling back to Windows-1252.
pub(crate) fn decode_output(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            log::debug!("Helper output is not UTF-8, decoding as Windows-1252");
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}
