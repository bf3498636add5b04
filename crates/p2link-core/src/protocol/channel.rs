//! Channel abstraction
//!
//! The byte pipe the transport reads from and writes to.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::ProtocolError;

/// Abstraction for the byte pipe under the transport
pub trait Channel: Read + Write + Send {
    /// Set timeout for blocking reads
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Get number of bytes available to read
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Clear input buffers
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Opens (and reopens) the channel a transport talks through
pub trait Connector: Send {
    /// Open a fresh channel
    fn open(&mut self) -> Result<Box<dyn Channel>, ProtocolError>;

    /// Name of the endpoint, for logs
    fn describe(&self) -> String;
}

/// Serial port wrapper implementing Channel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Channel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
