//! In-process codec storing records as a JSON array.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::{Codec, parse_record_array, records_to_json};
use crate::atomic::AtomicFile;
use crate::error::NotFoundKind;
use crate::record::{Record, RecordType};
use crate::{Error, Result};

/// Codec for containers that hold a pretty-printed JSON array of records.
///
/// Used for plain-text modules and as a stand-in for the Java helper in
/// tests. Writes go through [`AtomicFile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileCodec {
    _private: (),
}

impl JsonFileCodec {
    /// Creates a new JSON file codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for JsonFileCodec {
    fn decode(&self, container: &Path, _record_type: RecordType) -> Result<Vec<Record>> {
        let text = match fs::read(container) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::not_found(NotFoundKind::Container, container));
            }
            Err(e) => return Err(e.into()),
        };
        parse_record_array(&text)
    }

    fn encode(&self, container: &Path, _record_type: RecordType, records: &[Record]) -> Result<()> {
        let json = records_to_json(records)?;
        let mut file = AtomicFile::create(container)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.commit()
    }
}
