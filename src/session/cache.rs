//! Per-type record caches.

use std::collections::HashMap;

use crate::record::{Record, RecordType};

/// Decoded records of one type, in container order.
///
/// Every decoded record is kept, including ones without an identifier, so
/// re-encoding writes back exactly what was read plus the edits. Lookup by
/// identifier goes through `index`; the first record with a given
/// identifier wins.
#[derive(Debug, Default)]
pub(crate) struct TypeCache {
    records: Vec<Record>,
    keys: Vec<String>,
    index: HashMap<String, usize>,
    diagnostic: bool,
}

impl TypeCache {
    pub(crate) fn from_records(record_type: RecordType, records: Vec<Record>) -> Self {
        let mut cache = Self::default();
        for (position, record) in records.into_iter().enumerate() {
            match record.identifier() {
                None => log::warn!(
                    "Skipping {} record #{} without an identifier",
                    record_type,
                    position
                ),
                Some(key) if cache.index.contains_key(&key) => log::warn!(
                    "Duplicate {} identifier '{}' at #{}, keeping the first",
                    record_type,
                    key,
                    position
                ),
                Some(key) => {
                    cache.index.insert(key.clone(), cache.records.len());
                    cache.keys.push(key);
                }
            }
            cache.records.push(record);
        }
        cache
    }

    pub(crate) fn diagnostic(key: String, record: Record) -> Self {
        Self {
            records: vec![record],
            index: HashMap::from([(key.clone(), 0)]),
            keys: vec![key],
            diagnostic: true,
        }
    }

    pub(crate) fn is_diagnostic(&self) -> bool {
        self.diagnostic
    }

    /// Identifiers in container order.
    pub(crate) fn keys(&self) -> &[String] {
        &self.keys
    }

    pub(crate) fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Record> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    /// Replaces the record stored under `key`, returning the old value.
    pub(crate) fn replace(&mut self, key: &str, record: Record) -> Option<Record> {
        let slot = self.records.get_mut(*self.index.get(key)?)?;
        Some(std::mem::replace(slot, record))
    }
}
