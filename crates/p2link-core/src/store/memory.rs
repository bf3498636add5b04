//! In-memory record store
//!
//! Keeps telemetry ordered by timestamp and can persist itself as JSON.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::{KeyValueSink, SinkError};

/// A stored telemetry record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Payload as uppercase hex
    pub data: String,
}

/// Keyed-value sink holding records in timestamp order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    records: Vec<StoredRecord>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store saved with [`MemoryStore::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let reader = BufReader::new(File::open(path)?);
        let mut store: Self = serde_json::from_reader(reader)?;
        store.records.sort_by_key(|r| r.timestamp);
        Ok(store)
    }

    /// Save the store as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SinkError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no record
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with `min <= timestamp <= max`; a bound of 0 or less is open
    pub fn range(&self, min: i64, max: i64) -> impl Iterator<Item = &StoredRecord> {
        self.records
            .iter()
            .filter(move |r| min <= 0 || r.timestamp >= min)
            .filter(move |r| max <= 0 || r.timestamp <= max)
    }

    /// Every record, oldest first
    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }

    /// Oldest record
    pub fn first(&self) -> Option<&StoredRecord> {
        self.records.first()
    }

    /// Newest record
    pub fn last(&self) -> Option<&StoredRecord> {
        self.records.last()
    }
}

impl KeyValueSink for MemoryStore {
    fn insert(&mut self, timestamp: i64, hex_data: &str) -> Result<(), SinkError> {
        // Records sharing a timestamp keep their arrival order
        let at = self.records.partition_point(|r| r.timestamp <= timestamp);
        self.records.insert(
            at,
            StoredRecord {
                timestamp,
                data: hex_data.to_string(),
            },
        );
        tracing::debug!(timestamp, "record stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn timestamps<'a>(records: impl Iterator<Item = &'a StoredRecord>) -> Vec<i64> {
        records.map(|r| r.timestamp).collect()
    }

    fn sample() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (ts, data) in [(30, "03"), (10, "01"), (20, "02"), (20, "2B")] {
            store.insert(ts, data).unwrap();
        }
        store
    }

    #[test]
    fn test_ordering() {
        let store = sample();
        assert_eq!(store.len(), 4);
        assert_eq!(timestamps(store.range(0, 0)), vec![10, 20, 20, 30]);
        assert_eq!(store.records()[2].data, "2B");
        assert_eq!(store.first().map(|r| r.timestamp), Some(10));
        assert_eq!(store.last().map(|r| r.timestamp), Some(30));
    }

    #[test]
    fn test_range_bounds() {
        let store = sample();
        assert_eq!(timestamps(store.range(20, 0)), vec![20, 20, 30]);
        assert_eq!(timestamps(store.range(0, 20)), vec![10, 20, 20]);
        assert_eq!(timestamps(store.range(15, 25)), vec![20, 20]);
        assert_eq!(store.range(31, 0).count(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = sample();
        store.save(&path).unwrap();
        assert_eq!(MemoryStore::load(&path).unwrap(), store);
    }

    #[test]
    fn test_empty_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.first().is_none());
        assert!(store.last().is_none());
    }
}
