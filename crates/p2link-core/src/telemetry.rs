//! Telemetry decoding
//!
//! Turns 'M1' payloads into scaled values and the 'M2' clock into a
//! timestamp.

use byteorder::{BigEndian, ByteOrder};
use chrono::{Local, NaiveDate, TimeZone};
use std::io::Write;
use tracing::warn;

use crate::protocol::parse_hex;
use crate::store::{MemoryStore, SinkError};

/// Length of an 'M1' payload
pub const PAYLOAD_LEN: usize = 48;

/// Number of 16-bit words in an 'M1' payload
pub const WORD_COUNT: usize = PAYLOAD_LEN / 2;

/// Column names of the decoded words
pub const FIELD_NAMES: [&str; WORD_COUNT] = [
    "state",
    "b",
    "c",
    "d",
    "boiler_temp",
    "flue_gas_temp",
    "burnt_gas_temp",
    "power",
    "flow_fan",
    "combustion_fan",
    "feed",
    "residual_o2",
    "o2_regulation",
    "pellets_left_kg",
    "o",
    "outdoor_temp",
    "flow_setpoint_1",
    "flow_temp_1",
    "s",
    "t",
    "starts",
    "run_hours",
    "panel_temp",
    "boiler_setpoint",
];

/// Date format of the first CSV column
pub const DATE_FORMAT: &str = "%Y/%m/%d_%H:%M:%S";

// (word index, factor)
const SCALING: [(usize, f64); 6] = [
    (4, 0.5),
    (11, 0.1),
    (13, 0.0029),
    (14, 0.5),
    (15, 0.5),
    (23, 0.5),
];

/// A decoded 'M1' payload
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    words: [u16; WORD_COUNT],
}

impl Telemetry {
    /// Decode a payload; `None` unless it is exactly [`PAYLOAD_LEN`] bytes
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != PAYLOAD_LEN {
            return None;
        }
        let mut words = [0u16; WORD_COUNT];
        BigEndian::read_u16_into(payload, &mut words);
        Some(Self { words })
    }

    /// Raw words
    pub fn words(&self) -> &[u16; WORD_COUNT] {
        &self.words
    }

    /// Scaled values, in [`FIELD_NAMES`] order
    pub fn values(&self) -> [f64; WORD_COUNT] {
        let mut values = self.words.map(f64::from);
        for (index, factor) in SCALING {
            values[index] *= factor;
        }
        values
    }

    /// Scaled value of a named field
    pub fn get(&self, name: &str) -> Option<f64> {
        let index = FIELD_NAMES.iter().position(|n| *n == name)?;
        Some(self.values()[index])
    }

    /// Boiler temperature in °C
    pub fn boiler_temperature(&self) -> f64 {
        self.values()[4]
    }

    /// Residual oxygen in %
    pub fn residual_o2(&self) -> f64 {
        self.values()[11]
    }

    /// Pellets left in kg
    pub fn pellets_left(&self) -> f64 {
        self.values()[13]
    }

    /// Outdoor temperature in °C
    pub fn outdoor_temperature(&self) -> f64 {
        self.values()[15]
    }
}

/// Timestamp carried by an 'M2' payload.
///
/// Layout is `[year - 2000, weekday, month, day, hour, minute, second]`,
/// read as local time. `None` for short payloads and impossible dates.
pub fn furnace_timestamp(data: &[u8]) -> Option<i64> {
    let &[year, _weekday, month, day, hour, minute, second, ..] = data else {
        return None;
    };
    let naive = NaiveDate::from_ymd_opt(2000 + i32::from(year), month.into(), day.into())?
        .and_hms_opt(hour.into(), minute.into(), second.into())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Write the whole store as CSV; returns the number of rows written.
///
/// Records that do not decode are logged and skipped.
pub fn csv_dump<W: Write>(
    store: &MemoryStore,
    mut writer: W,
    header: bool,
    separator: &str,
) -> Result<usize, SinkError> {
    if header {
        let names: Vec<&str> = std::iter::once("date").chain(FIELD_NAMES).collect();
        writeln!(writer, "{}", names.join(separator))?;
    }

    let mut rows = 0;
    for record in store.records() {
        let telemetry = parse_hex("data", &record.data)
            .ok()
            .and_then(|payload| Telemetry::decode(&payload));
        let Some(telemetry) = telemetry else {
            warn!(
                timestamp = record.timestamp,
                data = %record.data,
                "bad data length, record skipped"
            );
            continue;
        };

        let date = Local
            .timestamp_opt(record.timestamp, 0)
            .earliest()
            .map(|dt| dt.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| record.timestamp.to_string());

        let mut fields = vec![date];
        fields.extend(telemetry.values().iter().map(|v| v.to_string()));
        writeln!(writer, "{}", fields.join(separator))?;
        rows += 1;
    }

    writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::hex_string;
    use crate::store::KeyValueSink;
    use pretty_assertions::assert_eq;

    fn payload() -> Vec<u8> {
        let mut words = [0u16; WORD_COUNT];
        words[0] = 3;
        words[4] = 150; // 75.0 °C
        words[11] = 85; // 8.5 %
        words[13] = 10_000; // 29 kg
        words[15] = 0xFFF6; // wraps, read unsigned
        words[23] = 160;
        let mut bytes = vec![0u8; PAYLOAD_LEN];
        BigEndian::write_u16_into(&words, &mut bytes);
        bytes
    }

    #[test]
    fn test_decode_scaling() {
        let telemetry = Telemetry::decode(&payload()).unwrap();
        assert_eq!(telemetry.words()[0], 3);
        assert_eq!(telemetry.boiler_temperature(), 75.0);
        assert_eq!(telemetry.residual_o2(), 8.5);
        assert!((telemetry.pellets_left() - 29.0).abs() < 1e-9);
        assert_eq!(telemetry.outdoor_temperature(), 32763.0);
        assert_eq!(telemetry.get("boiler_setpoint"), Some(80.0));
        assert_eq!(telemetry.get("state"), Some(3.0));
        assert_eq!(telemetry.get("unknown"), None);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(Telemetry::decode(&[0u8; 47]).is_none());
        assert!(Telemetry::decode(&[0u8; 50]).is_none());
    }

    #[test]
    fn test_furnace_timestamp() {
        let data = [14, 3, 2, 27, 18, 30, 5];
        let expected = Local
            .with_ymd_and_hms(2014, 2, 27, 18, 30, 5)
            .earliest()
            .map(|dt| dt.timestamp());
        assert_eq!(furnace_timestamp(&data), expected);

        assert_eq!(furnace_timestamp(&[14, 3, 2, 30, 18, 30, 5]), None);
        assert_eq!(furnace_timestamp(&[14, 3, 2]), None);
    }

    #[test]
    fn test_csv_dump() {
        let mut store = MemoryStore::new();
        store.insert(1_400_000_000, &hex_string(&payload())).unwrap();
        store.insert(1_400_000_001, "0102").unwrap();

        let mut out = Vec::new();
        let rows = csv_dump(&store, &mut out, true, "; ").unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("date; state; b; c; d; boiler_temp"));

        let fields: Vec<&str> = lines[1].split("; ").collect();
        assert_eq!(fields.len(), WORD_COUNT + 1);
        assert_eq!(fields[1], "3");
        assert_eq!(fields[5], "75");
    }
}
