//! Telemetry storage
//!
//! Sink contracts the data exchange loop writes records to, and the stock
//! sinks implementing them.

mod format;
mod memory;

pub use format::{CsvLog, TextLog};
pub use memory::{MemoryStore, StoredRecord};

use std::fmt;
use std::io;

use thiserror::Error;

use crate::protocol::{hex_string, Frame};

/// Errors raised by a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tag written next to flat-file records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityTag {
    /// Checksum verified
    Valid,
    /// Checksum mismatch
    Invalid,
}

impl ValidityTag {
    /// Text of the tag; empty for valid records
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidityTag::Valid => "",
            ValidityTag::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ValidityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink keyed by timestamp, storing the payload as hex
pub trait KeyValueSink {
    /// Store one record
    fn insert(&mut self, timestamp: i64, hex_data: &str) -> Result<(), SinkError>;
}

/// Append-only text sink
pub trait FlatFileSink {
    /// Append one record
    fn write(&mut self, timestamp: i64, tag: ValidityTag, hex_data: &str) -> Result<(), SinkError>;
}

/// Row-oriented sink: timestamp followed by every payload byte
pub trait TabularSink {
    /// Append one row
    fn write_row(&mut self, row: &[i64]) -> Result<(), SinkError>;
}

/// A sink lent to [`Session::read_data`](crate::protocol::Session::read_data)
pub enum Sink<'a> {
    /// Receives checksum-valid records only
    KeyValue(&'a mut dyn KeyValueSink),
    /// Receives every record, tagged
    FlatFile(&'a mut dyn FlatFileSink),
    /// Receives checksum-valid records only
    Tabular(&'a mut dyn TabularSink),
}

/// One telemetry reply, ready for the sinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Whether the frame checksum verified
    pub valid: bool,
}

impl TelemetryRecord {
    /// Record for a received frame
    pub fn from_frame(timestamp: i64, frame: &Frame) -> Self {
        Self {
            timestamp,
            payload: frame.data().to_vec(),
            valid: frame.is_valid(),
        }
    }

    /// Payload as uppercase hex
    pub fn hex(&self) -> String {
        hex_string(&self.payload)
    }

    /// Validity tag of the record
    pub fn tag(&self) -> ValidityTag {
        if self.valid {
            ValidityTag::Valid
        } else {
            ValidityTag::Invalid
        }
    }

    /// Timestamp followed by the payload bytes
    pub fn row(&self) -> Vec<i64> {
        std::iter::once(self.timestamp)
            .chain(self.payload.iter().map(|&b| i64::from(b)))
            .collect()
    }

    /// Hand the record to every sink that accepts it
    pub fn deliver(&self, sinks: &mut [Sink<'_>]) -> Result<(), SinkError> {
        let hex = self.hex();
        for sink in sinks.iter_mut() {
            match sink {
                Sink::KeyValue(s) if self.valid => s.insert(self.timestamp, &hex)?,
                Sink::Tabular(s) if self.valid => s.write_row(&self.row())?,
                Sink::FlatFile(s) => s.write(self.timestamp, self.tag(), &hex)?,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_from_frame() {
        let frame = Frame::prepared(*b"M1", &[0x01, 0xAB]).unwrap();
        let record = TelemetryRecord::from_frame(1_400_000_000, &frame);
        assert_eq!(record.hex(), "01AB");
        assert_eq!(record.row(), vec![1_400_000_000, 1, 171]);
        assert_eq!(record.tag(), ValidityTag::Valid);
    }

    #[test]
    fn test_delivery_gating() {
        let mut memory = MemoryStore::new();
        let mut text = TextLog::new(Vec::new());
        let mut csv = CsvLog::new(Vec::new());

        let record = TelemetryRecord {
            timestamp: 10,
            payload: vec![0x12],
            valid: false,
        };
        {
            let mut sinks = [
                Sink::KeyValue(&mut memory),
                Sink::FlatFile(&mut text),
                Sink::Tabular(&mut csv),
            ];
            record.deliver(&mut sinks).unwrap();
        }

        assert!(memory.is_empty());
        assert_eq!(String::from_utf8(text.into_inner()).unwrap(), "10 :invalid:12\n");
        assert!(csv.into_inner().is_empty());
    }
}
