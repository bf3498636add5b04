//! Frame transport
//!
//! Writes terminated frames and assembles replies under a global deadline.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, Span};

use super::channel::{Channel, Connector};
use super::{
    CommunicationError, ErrorCode, Frame, ProtocolError, DEFAULT_READ_GRANULARITY_MS,
    DEFAULT_READ_TIMEOUT_MS, FRAME_END, MAX_FRAME_SIZE,
};

/// Transport timing and validation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Global budget for receiving one reply, in milliseconds
    pub read_timeout_ms: u64,
    /// Quiet time on the line that ends a reply, in milliseconds
    pub read_granularity_ms: u64,
    /// Reject replies whose checksum does not match (error code 2)
    /// instead of returning them flagged invalid
    pub strict_checksum: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            read_granularity_ms: DEFAULT_READ_GRANULARITY_MS,
            strict_checksum: false,
        }
    }
}

impl TransportConfig {
    /// Global read budget
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Read granularity
    pub fn read_granularity(&self) -> Duration {
        Duration::from_millis(self.read_granularity_ms)
    }
}

/// Frame-level reader/writer over a [`Channel`]
pub struct Transport {
    connector: Box<dyn Connector>,
    channel: Option<Box<dyn Channel>>,
    config: TransportConfig,
    span: Span,
}

impl Transport {
    /// Open a channel through `connector`; events are emitted inside `span`
    pub fn open(
        mut connector: Box<dyn Connector>,
        config: TransportConfig,
        span: Span,
    ) -> Result<Self, ProtocolError> {
        let channel = connector.open()?;
        info!(parent: &span, endpoint = %connector.describe(), "channel opened");
        Ok(Self {
            connector,
            channel: Some(channel),
            config,
            span,
        })
    }

    /// Current settings
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Whether a channel is currently held
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    fn channel(&mut self) -> Result<&mut Box<dyn Channel>, ProtocolError> {
        self.channel.as_mut().ok_or(ProtocolError::NotConnected)
    }

    /// Send a frame followed by the frame terminator
    pub fn write(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let mut bytes = frame.get_raw();
        bytes.push(FRAME_END);

        let channel = self.channel()?;
        channel.write_all(&bytes)?;
        channel.flush()?;

        debug!(parent: &self.span, frame = %frame.to_hex(), "sent");
        Ok(())
    }

    /// Receive one reply and decode it.
    ///
    /// Fails with error code 9 when nothing at all arrived before the
    /// deadline, and with codes 10 to 13 when the reply was cut short.
    pub fn read(&mut self) -> Result<Frame, ProtocolError> {
        let deadline = Instant::now() + self.config.read_timeout();
        debug!(parent: &self.span, "waiting for data on channel");

        let bytes = self.receive(deadline)?;
        if bytes.is_empty() {
            debug!(parent: &self.span, "no reply before deadline");
            return Err(CommunicationError::new(ErrorCode::GlobalTimeout, None).into());
        }

        let frame = match Frame::from_bytes(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    parent: &self.span,
                    code = e.code.as_u8(),
                    received = bytes.len(),
                    "incomplete reply"
                );
                return Err(e.into());
            }
        };

        if self.config.strict_checksum && frame.failed() {
            return Err(CommunicationError::new(ErrorCode::ChecksumMismatch, Some(frame)).into());
        }

        debug!(parent: &self.span, frame = %frame.to_hex(), valid = frame.is_valid(), "received");
        Ok(frame)
    }

    fn receive(&mut self, deadline: Instant) -> Result<Vec<u8>, ProtocolError> {
        let granularity = self.config.read_granularity();
        let channel = self.channel()?;

        let mut received = Vec::new();
        let mut buffer = [0u8; MAX_FRAME_SIZE];

        loop {
            let now = Instant::now();
            if now >= deadline || received.len() >= MAX_FRAME_SIZE {
                break;
            }
            let remaining = deadline - now;

            // Until the first byte the whole remaining budget is one read;
            // afterwards a quiet line for `granularity` ends the reply
            let wait = if received.is_empty() {
                remaining
            } else {
                granularity.min(remaining)
            };
            channel.set_timeout(wait)?;

            let room = MAX_FRAME_SIZE - received.len();
            match channel.read(&mut buffer[..room]) {
                Ok(0) if received.is_empty() => std::thread::sleep(granularity.min(remaining)),
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&buffer[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if !received.is_empty() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    /// Number of bytes waiting on the line, without blocking
    pub fn bytes_waiting(&mut self) -> Result<usize, ProtocolError> {
        Ok(self.channel()?.bytes_to_read()? as usize)
    }

    /// Close the channel and open a fresh one
    pub fn reopen(&mut self) -> Result<(), ProtocolError> {
        self.close();
        let channel = self.connector.open()?;
        self.channel = Some(channel);
        info!(parent: &self.span, endpoint = %self.connector.describe(), "channel reopened");
        Ok(())
    }

    /// Release the channel. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            debug!(parent: &self.span, "channel closed");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}
