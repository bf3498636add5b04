//! Serial Protocol Communication
//!
//! Implements the P2 furnace serial protocol: a binary frame with an additive
//! checksum, exchanged strictly half-duplex over a 9600 baud 8N1 line.
//!
//! Layers, from the wire up:
//! - [`Channel`]: the byte pipe (a serial port in production)
//! - [`Transport`]: frame writing and deadline-bounded frame assembly
//! - [`Session`]: authentication, initialisation handshake and data exchange

pub mod channel;
pub mod commands;
mod error;
mod frame;
pub mod serial;
mod session;
mod transport;

pub use channel::{Channel, Connector};
pub use commands::{Command, User};
pub use error::{CommunicationError, ErrorCode, FrameError, ProtocolError};
pub use frame::{hex_string, parse_hex, Format, Frame, FrameValue, Repr};
pub use serial::{list_ports, open_port, PortInfo, SerialConnector};
pub use session::{
    ExchangeOptions, ExchangeSummary, InitSummary, InitTiming, Session, Stage,
};
pub use transport::{Transport, TransportConfig};

/// Baud rate of the furnace serial line
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Global budget for receiving one reply, in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Read granularity (inter-byte gap ending a reply), in milliseconds
pub const DEFAULT_READ_GRANULARITY_MS: u64 = 10;

/// Byte terminating every outgoing frame
pub const FRAME_END: u8 = 0x0D;

/// Header length in bytes
pub const HEADER_LEN: usize = 2;

/// Maximum number of bytes collected for one reply
pub const MAX_FRAME_SIZE: usize = 1024;
