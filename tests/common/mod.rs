//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use jarpatch::{
    ArchiveSession, BridgeOperation, Codec, Error, JsonFileCodec, PatchLog, Record, RecordType,
    SessionOptions,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Path of the loadouts container inside fixture archives.
pub const LOADOUTS_ENTRY: &str = "modules/loadouts.dat";

/// The loadouts every fixture archive starts with.
pub fn sample_loadouts() -> Value {
    json!([
        {
            "key": "warrior",
            "name": "Warrior",
            "gold": 100,
            "items": ["sword", "shield"],
            "stats": {"hp": 30, "armor": 4}
        },
        {
            "key": "mage",
            "name": "Mage",
            "gold": 80,
            "items": ["staff"],
            "stats": {"hp": 18, "mana": 40}
        },
        {
            "key": "rogue",
            "name": "Rogue",
            "gold": 120,
            "items": ["dagger", "cloak"],
            "stats": {"hp": 22}
        }
    ])
}

/// Builds a zip archive from (name, data) pairs.
pub fn create_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            writer
                .start_file(*name, options)
                .expect("Failed to start zip entry");
            writer.write_all(data).expect("Failed to write zip entry");
        }
        writer.finish().expect("Failed to finish zip");
    }
    cursor.into_inner()
}

/// Builds an archive whose loadouts container holds `loadouts` as JSON.
pub fn create_game_archive(loadouts: &Value) -> Vec<u8> {
    let container = serde_json::to_vec_pretty(loadouts).expect("Failed to encode loadouts");
    create_zip(&[
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
        (LOADOUTS_ENTRY, container.as_slice()),
        ("assets/readme.txt", b"fixture archive"),
    ])
}

/// An archive on disk plus a private profile root, removed on drop.
pub struct Fixture {
    pub dir: TempDir,
    pub archive: PathBuf,
}

impl Fixture {
    /// Creates a fixture with the sample loadouts.
    pub fn new() -> Self {
        Self::with_loadouts(&sample_loadouts())
    }

    /// Creates a fixture whose archive holds `loadouts`.
    pub fn with_loadouts(loadouts: &Value) -> Self {
        Self::with_bytes(&create_game_archive(loadouts))
    }

    /// Creates a fixture from raw archive bytes.
    pub fn with_bytes(bytes: &[u8]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let archive = dir.path().join("DOT.jar");
        std::fs::write(&archive, bytes).expect("Failed to write archive");
        Self { dir, archive }
    }

    /// Root directory for profiles and rollbacks.
    pub fn profile_root(&self) -> PathBuf {
        self.dir.path().join("profiles")
    }

    /// Profile directory holding the patch log.
    pub fn profile_dir(&self) -> PathBuf {
        self.profile_root().join("default")
    }

    /// Session options rooted inside the fixture directory.
    pub fn options(&self) -> SessionOptions {
        SessionOptions::new()
            .scratch_parent(self.dir.path().join("scratch"))
            .profile_root(self.profile_root())
    }

    /// Opens a session with the JSON file codec.
    pub fn open(&self) -> ArchiveSession<JsonFileCodec> {
        self.open_with(JsonFileCodec::new())
    }

    /// Opens a session with a custom codec.
    pub fn open_with<C: Codec>(&self, codec: C) -> ArchiveSession<C> {
        ArchiveSession::open_with_options(&self.archive, codec, self.options())
            .expect("Failed to open session")
    }

    /// Opens the fixture's patch log.
    pub fn patch_log(&self) -> PatchLog {
        PatchLog::open(self.profile_dir()).expect("Failed to open patch log")
    }

    /// Returns the live archive bytes.
    pub fn archive_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.archive).expect("Failed to read archive")
    }

    /// Decodes the loadouts container straight out of the live archive.
    pub fn archived_loadouts(&self) -> Value {
        read_entry_json(&self.archive, LOADOUTS_ENTRY)
    }
}

/// Reads a zip entry and parses it as JSON.
pub fn read_entry_json(archive: &Path, name: &str) -> Value {
    let file = File::open(archive).expect("Failed to open archive");
    let mut zip = zip::ZipArchive::new(file).expect("Failed to read archive");
    let entry = zip.by_name(name).expect("Entry missing from archive");
    serde_json::from_reader(entry).expect("Entry is not JSON")
}

/// Returns the entry names of a zip archive in stored order.
pub fn entry_names(archive: &Path) -> Vec<String> {
    let file = File::open(archive).expect("Failed to open archive");
    let zip = zip::ZipArchive::new(file).expect("Failed to read archive");
    zip.file_names().map(str::to_string).collect()
}

/// Finds the record with `key` in a JSON array of records.
pub fn find_record<'a>(records: &'a Value, key: &str) -> Option<&'a Value> {
    records
        .as_array()?
        .iter()
        .find(|r| r.get("key").and_then(Value::as_str) == Some(key))
}

/// Builds a record from a JSON object literal.
pub fn record(value: Value) -> Record {
    Record::from_value(value).expect("Record must be a JSON object")
}

/// Codec that decodes like [`JsonFileCodec`] but fails every encode.
#[derive(Debug, Default)]
pub struct FailingEncodeCodec {
    inner: JsonFileCodec,
}

impl Codec for FailingEncodeCodec {
    fn decode(&self, container: &Path, record_type: RecordType) -> jarpatch::Result<Vec<Record>> {
        self.inner.decode(container, record_type)
    }

    fn encode(
        &self,
        container: &Path,
        _record_type: RecordType,
        _records: &[Record],
    ) -> jarpatch::Result<()> {
        // Leave a half-written container behind like a crashed helper would.
        std::fs::write(container, b"partial").map_err(Error::from)?;
        Err(Error::bridge_failure(
            BridgeOperation::Encode,
            Some(1),
            "java.io.IOException: disk full",
        ))
    }
}

/// Codec whose decode always fails the way a broken helper does.
#[derive(Debug, Default)]
pub struct FailingDecodeCodec;

impl Codec for FailingDecodeCodec {
    fn decode(&self, _container: &Path, _record_type: RecordType) -> jarpatch::Result<Vec<Record>> {
        Err(Error::bridge_failure(
            BridgeOperation::Decode,
            Some(1),
            "Exception in thread \"main\" java.io.InvalidClassException",
        ))
    }

    fn encode(
        &self,
        _container: &Path,
        _record_type: RecordType,
        _records: &[Record],
    ) -> jarpatch::Result<()> {
        Err(Error::bridge_failure(BridgeOperation::Encode, Some(1), "unused"))
    }
}
