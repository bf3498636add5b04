//! Protocol errors

use std::fmt;

use thiserror::Error;

use super::frame::Frame;
use super::session::Stage;
use crate::store::SinkError;

/// Contract violations raised by [`Frame`] setters and accessors.
///
/// These describe a caller handing the codec something it can never accept.
/// Malformed frame *content* never produces one of these; it only clears the
/// frame's validity flag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("{field} does not accept {got} representation")]
    TypeMismatch {
        field: &'static str,
        got: &'static str,
    },

    #[error("invalid hex digits for {field}: {value:?}")]
    InvalidHex { field: &'static str, value: String },

    #[error("{field} value {value} out of range")]
    ValueOutOfRange { field: &'static str, value: u64 },

    #[error("data size {declared} does not match data length {actual}")]
    SizeMismatch { declared: u8, actual: usize },
}

/// Wire-level failure codes reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Checksum did not match the received frame
    ChecksumMismatch,
    /// No byte received before the global deadline
    GlobalTimeout,
    /// Incomplete header
    Header,
    /// Data size byte received but nothing after it
    DataSize,
    /// Incomplete data
    Data,
    /// Incomplete checksum
    ChecksumRecv,
}

impl ErrorCode {
    /// Numeric code as used in logs by the furnace tooling
    pub fn as_u8(self) -> u8 {
        match self {
            ErrorCode::ChecksumMismatch => 2,
            ErrorCode::GlobalTimeout => 9,
            ErrorCode::Header => 10,
            ErrorCode::DataSize => 11,
            ErrorCode::Data => 12,
            ErrorCode::ChecksumRecv => 13,
        }
    }

    /// Look up a code by its numeric value
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            2 => Some(ErrorCode::ChecksumMismatch),
            9 => Some(ErrorCode::GlobalTimeout),
            10 => Some(ErrorCode::Header),
            11 => Some(ErrorCode::DataSize),
            12 => Some(ErrorCode::Data),
            13 => Some(ErrorCode::ChecksumRecv),
            _ => None,
        }
    }

    /// Short description of the failure
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::ChecksumMismatch => "invalid checksum",
            ErrorCode::GlobalTimeout => "global timeout, no frame received",
            ErrorCode::Header => "incomplete or timed out header",
            ErrorCode::DataSize => "timeout on data size",
            ErrorCode::Data => "incomplete or timed out data",
            ErrorCode::ChecksumRecv => "incomplete message or timeout on checksum",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// A failed read, carrying whatever part of the frame was assembled.
#[derive(Error, Debug, Clone)]
#[error("communication error {code}: {}", .code.description())]
pub struct CommunicationError {
    /// What went wrong
    pub code: ErrorCode,
    /// The partially parsed frame, `None` when nothing was received
    pub frame: Option<Frame>,
}

impl CommunicationError {
    /// Create a new communication error
    pub fn new(code: ErrorCode, frame: Option<Frame>) -> Self {
        Self { code, frame }
    }

    /// True for the global timeout (nothing at all was received)
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::GlobalTimeout
    }
}

/// Errors that can occur while talking to the furnace
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("{stage} stage failed after {attempts} attempt(s): {source}")]
    StageFailed {
        stage: Stage,
        attempts: u32,
        #[source]
        source: CommunicationError,
    },

    #[error("{0} stage interrupted")]
    Interrupted(Stage),

    #[error("Not connected to furnace")]
    NotConnected,

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProtocolError {
    /// The wire-level error behind this failure, if any
    pub fn communication(&self) -> Option<&CommunicationError> {
        match self {
            ProtocolError::Communication(e) => Some(e),
            ProtocolError::StageFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The stage that gave up, if this is a terminal stage failure
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            ProtocolError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
