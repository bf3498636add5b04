#![allow(dead_code)]

use p2link_core::protocol::{
    Channel, Connector, Frame, InitTiming, ProtocolError, Session, TransportConfig,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock furnace does after one write
#[derive(Debug, Clone)]
pub enum Reply {
    Bytes(Vec<u8>),
    Silence,
}

/// Wire bytes of a furnace reply (no terminator)
pub fn reply(header: [u8; 2], data: &[u8]) -> Reply {
    Reply::Bytes(Frame::prepared(header, data).unwrap().get_raw())
}

/// Reply whose checksum does not match
pub fn corrupted(header: [u8; 2], data: &[u8]) -> Reply {
    let mut bytes = Frame::prepared(header, data).unwrap().get_raw();
    if let Some(last) = bytes.last_mut() {
        *last ^= 0xFF;
    }
    Reply::Bytes(bytes)
}

#[derive(Debug, Default)]
pub struct MockState {
    script: VecDeque<Reply>,
    pending: VecDeque<u8>,
    pub sent: Vec<Vec<u8>>,
    pub opens: usize,
    /// Open attempts, refused ones included
    pub open_attempts: usize,
    /// 1-based open attempts that fail
    pub refused_opens: Vec<usize>,
}

impl MockState {
    /// Headers of every frame written so far
    pub fn sent_headers(&self) -> Vec<[u8; 2]> {
        self.sent.iter().map(|f| [f[0], f[1]]).collect()
    }
}

pub type Shared = Arc<Mutex<MockState>>;

/// Channel answering each write with the next scripted reply
pub struct MockChannel {
    state: Shared,
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            drop(state);
            std::thread::sleep(Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(buf.to_vec());
        if let Some(Reply::Bytes(bytes)) = state.script.pop_front() {
            state.pending.extend(bytes);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for MockChannel {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.state.lock().unwrap().pending.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().pending.clear();
        Ok(())
    }
}

pub struct MockConnector {
    state: Shared,
}

impl Connector for MockConnector {
    fn open(&mut self) -> Result<Box<dyn Channel>, ProtocolError> {
        {
            let mut state = self.state.lock().unwrap();
            state.open_attempts += 1;
            if state.refused_opens.contains(&state.open_attempts) {
                return Err(ProtocolError::SerialError("mock: device gone".to_string()));
            }
        }
        let mut channel = MockChannel {
            state: self.state.clone(),
        };
        channel.clear_input_buffer()?;
        self.state.lock().unwrap().opens += 1;
        Ok(Box::new(channel))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Connector plus a handle on its state
pub fn connector(script: Vec<Reply>) -> (Box<dyn Connector>, Shared) {
    let state = Arc::new(Mutex::new(MockState {
        script: script.into(),
        ..MockState::default()
    }));
    let connector = MockConnector {
        state: state.clone(),
    };
    (Box::new(connector), state)
}

pub fn fast_transport() -> TransportConfig {
    TransportConfig {
        read_timeout_ms: 40,
        read_granularity_ms: 5,
        strict_checksum: false,
    }
}

pub fn fast_timing() -> InitTiming {
    InitTiming {
        burst_count: 3,
        burst_spacing_ms: 0,
        settle_delay_ms: 0,
        final_attempts: 4,
    }
}

pub fn session(script: Vec<Reply>) -> (Session, Shared) {
    init_tracing();
    let (connector, state) = connector(script);
    let session = Session::open(
        connector,
        fast_transport(),
        fast_timing(),
        tracing::info_span!("furnace"),
    )
    .unwrap();
    (session, state)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
