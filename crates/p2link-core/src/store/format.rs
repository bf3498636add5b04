//! Log file formats
//!
//! Line-oriented sinks writing to any [`Write`].

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{FlatFileSink, SinkError, TabularSink, ValidityTag};

/// Flat-file sink writing `<ts> :<tag>:<HEX>` lines
pub struct TextLog<W: Write> {
    writer: W,
}

impl<W: Write> TextLog<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl TextLog<BufWriter<File>> {
    /// Append to the file at `path`, creating it when missing
    pub fn append<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FlatFileSink for TextLog<W> {
    fn write(&mut self, timestamp: i64, tag: ValidityTag, hex_data: &str) -> Result<(), SinkError> {
        writeln!(self.writer, "{} :{}:{}", timestamp, tag, hex_data)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Tabular sink writing comma-separated rows
pub struct CsvLog<W: Write> {
    writer: W,
}

impl<W: Write> CsvLog<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl CsvLog<BufWriter<File>> {
    /// Create (or truncate) the file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> TabularSink for CsvLog<W> {
    fn write_row(&mut self, row: &[i64]) -> Result<(), SinkError> {
        let line = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}
