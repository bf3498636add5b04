//! Furnace session
//!
//! Sequences the protocol stages over one transport:
//! authentication, the four-phase initialisation handshake, then the
//! steady-state telemetry exchange.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Span};

use super::channel::Connector;
use super::commands::{Command, User};
use super::transport::{Transport, TransportConfig};
use super::{Frame, ProtocolError, Repr, HEADER_LEN};
use crate::store::{Sink, TelemetryRecord};
use crate::telemetry;

/// Session stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Not started (or stopped)
    PreInit,
    /// Authenticating
    Login,
    /// Initialisation handshake loop
    Init,
    /// Initialisation bursts and acknowledgements
    PostInit,
    /// Steady-state data exchange
    Xchg,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PreInit => "PREINIT",
            Stage::Login => "LOGIN",
            Stage::Init => "INIT",
            Stage::PostInit => "POST_INIT",
            Stage::Xchg => "XCHG",
        };
        f.write_str(name)
    }
}

/// Timings and counts of the initialisation phases after the handshake loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitTiming {
    /// Number of 'M2' probes in the polling burst
    pub burst_count: u32,
    /// Spacing between burst probes, in milliseconds
    pub burst_spacing_ms: u64,
    /// Pause before the final handshake, in milliseconds
    pub settle_delay_ms: u64,
    /// Attempts of the final 'M2' handshake
    pub final_attempts: u32,
}

impl Default for InitTiming {
    fn default() -> Self {
        Self {
            burst_count: 33,
            burst_spacing_ms: 150,
            settle_delay_ms: 3000,
            final_attempts: 20,
        }
    }
}

impl InitTiming {
    /// No pauses at all; for tests and simulated furnaces
    pub fn immediate() -> Self {
        Self {
            burst_spacing_ms: 0,
            settle_delay_ms: 0,
            ..Self::default()
        }
    }
}

/// Outcome of [`Session::run_init`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitSummary {
    /// Probe/reply exchanges of the handshake loop
    pub exchanges: u32,
    /// Replies collected during the polling burst
    pub burst_replies: u32,
    /// Whether the 'Rb' request was answered
    pub acknowledged: bool,
    /// Attempts spent on the final handshake
    pub final_attempts: u32,
    /// Whether the final handshake got a reply
    pub final_acknowledged: bool,
}

/// Settings of the data exchange loop
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    /// Pause between two requests
    pub poll_interval: Duration,
    /// Timestamp telemetry with the furnace clock ('M2' replies) instead of
    /// the local clock
    pub use_furnace_clock: bool,
    /// Return after this many telemetry records were delivered
    pub max_records: Option<u64>,
    /// Return after this much time in the loop
    pub max_duration: Option<Duration>,
    /// Return once this flag is raised
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            use_furnace_clock: false,
            max_records: None,
            max_duration: None,
            cancel: None,
        }
    }
}

fn raised(flag: Option<&Arc<AtomicBool>>) -> bool {
    flag.is_some_and(|flag| flag.load(Ordering::SeqCst))
}

impl ExchangeOptions {
    fn finished(
        &self,
        summary: &ExchangeSummary,
        started: Instant,
        interrupt: Option<&Arc<AtomicBool>>,
    ) -> bool {
        if raised(self.cancel.as_ref()) || raised(interrupt) {
            info!("data exchange cancelled");
            return true;
        }
        if self.max_records.is_some_and(|max| summary.records >= max) {
            info!(records = summary.records, "record limit reached");
            return true;
        }
        if self
            .max_duration
            .is_some_and(|max| started.elapsed() >= max)
        {
            info!(elapsed = ?started.elapsed(), "time limit reached");
            return true;
        }
        false
    }
}

/// Outcome of [`Session::read_data`] when a caller limit ended it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeSummary {
    /// Request/reply cycles run
    pub cycles: u64,
    /// Telemetry records handed to the sinks
    pub records: u64,
    /// Records whose checksum did not validate
    pub invalid_records: u64,
}

/// A connection to one furnace
pub struct Session {
    transport: Option<Transport>,
    stage: Stage,
    timing: InitTiming,
    interrupt: Option<Arc<AtomicBool>>,
    span: Span,
}

impl Session {
    /// Create a session over an already opened transport
    pub fn new(transport: Transport, timing: InitTiming, span: Span) -> Self {
        Self {
            transport: Some(transport),
            stage: Stage::PreInit,
            timing,
            interrupt: None,
            span,
        }
    }

    /// Watch `flag` between exchanges of every stage.
    ///
    /// Once raised, authentication and initialisation give up with
    /// [`ProtocolError::Interrupted`] and the data exchange returns its
    /// summary.
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    fn check_interrupt(&self) -> Result<(), ProtocolError> {
        if raised(self.interrupt.as_ref()) {
            warn!(stage = %self.stage, "interrupted");
            return Err(ProtocolError::Interrupted(self.stage));
        }
        Ok(())
    }

    /// Open the channel through `connector` and create a session
    pub fn open(
        connector: Box<dyn Connector>,
        config: TransportConfig,
        timing: InitTiming,
        span: Span,
    ) -> Result<Self, ProtocolError> {
        let transport_span = tracing::debug_span!(parent: &span, "transport");
        let transport = Transport::open(connector, config, transport_span)?;
        Ok(Self::new(transport, timing, span))
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether the session holds an open transport
    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_open)
    }

    fn transport(&mut self) -> Result<&mut Transport, ProtocolError> {
        self.transport
            .as_mut()
            .filter(|t| t.is_open())
            .ok_or(ProtocolError::NotConnected)
    }

    fn reopen(&mut self) -> Result<(), ProtocolError> {
        match self.transport.as_mut() {
            Some(transport) => transport.reopen(),
            None => Err(ProtocolError::NotConnected),
        }
    }

    fn exchange(&mut self, frame: &Frame) -> Result<Frame, ProtocolError> {
        let transport = self.transport()?;
        transport.write(frame)?;
        transport.read()
    }

    /// Log in to the furnace.
    ///
    /// Any structurally complete reply counts as success. After a failed
    /// read the session waits `retry_wait`, reopens the transport and tries
    /// again, up to `max_retry` times. A reopen that fails uses up a retry;
    /// if the channel is still gone once retries run out the session is
    /// stopped.
    pub fn run_auth(
        &mut self,
        user: User,
        max_retry: u32,
        retry_wait: Duration,
    ) -> Result<(), ProtocolError> {
        let _entered = self.span.clone().entered();
        info!(%user, "entering authentication stage");
        self.transport()?;
        self.stage = Stage::Login;

        let login = user.frame()?;
        let mut retries = 0;
        loop {
            self.check_interrupt()?;
            debug!("sending user id, waiting for reply");
            let failure = match self.exchange(&login) {
                Ok(reply) => {
                    debug!(reply = %reply, "answer received");
                    return Ok(());
                }
                Err(ProtocolError::Communication(e)) => e,
                Err(e) => return Err(e),
            };
            warn!(
                code = failure.code.as_u8(),
                retry_in = ?retry_wait,
                "no authentication acknowledge"
            );

            loop {
                if retries >= max_retry {
                    error!(attempts = retries + 1, "authentication failed");
                    if !self.is_connected() {
                        self.stop();
                    }
                    return Err(ProtocolError::StageFailed {
                        stage: Stage::Login,
                        attempts: retries + 1,
                        source: failure,
                    });
                }
                std::thread::sleep(retry_wait);
                self.check_interrupt()?;
                retries += 1;
                match self.reopen() {
                    Ok(()) => break,
                    Err(ProtocolError::NotConnected) => return Err(ProtocolError::NotConnected),
                    Err(e) => warn!(error = %e, attempt = retries + 1, "reopening the channel failed"),
                }
            }
        }
    }

    /// Run the initialisation handshake.
    ///
    /// Only a global timeout during the handshake loop is fatal; the
    /// following phases log their failures and carry on.
    pub fn run_init(&mut self) -> Result<InitSummary, ProtocolError> {
        let _entered = self.span.clone().entered();
        info!("entering initialisation stage");
        self.transport()?;
        self.stage = Stage::Init;

        let mut summary = InitSummary::default();
        self.handshake_loop(&mut summary)?;
        info!(exchanges = summary.exchanges, "handshake loop terminated");

        self.polling_burst(&mut summary)?;
        self.acknowledge_request(&mut summary)?;
        self.final_handshake(&mut summary)?;

        self.stage = Stage::Xchg;
        info!("initialisation terminated");
        Ok(summary)
    }

    /// Echo every reply header back until the furnace answers 'M3x'
    fn handshake_loop(&mut self, summary: &mut InitSummary) -> Result<(), ProtocolError> {
        let mut probe = Command::InitProbe.frame()?;

        while self.stage == Stage::Init {
            self.check_interrupt()?;
            summary.exchanges += 1;
            debug!(exchange = summary.exchanges, "init message exchange");

            let header = match self.exchange(&probe) {
                Ok(reply) => {
                    debug!(reply = %reply.describe(), "init reply");
                    reply.header().to_vec()
                }
                Err(ProtocolError::Communication(e)) if e.is_timeout() => {
                    error!(exchanges = summary.exchanges, "no reply during initialisation");
                    return Err(ProtocolError::StageFailed {
                        stage: Stage::Init,
                        attempts: summary.exchanges,
                        source: e,
                    });
                }
                Err(ProtocolError::Communication(e)) => {
                    let partial = e.frame.as_ref().map(Frame::to_hex).unwrap_or_default();
                    warn!(code = e.code.as_u8(), %partial, "init reply failure, salvaging header");
                    e.frame.map(|f| f.header().to_vec()).unwrap_or_default()
                }
                Err(e) => return Err(e),
            };

            if header.len() != HEADER_LEN {
                warn!("no usable header in reply, repeating probe");
                continue;
            }

            if header[0] == 0x4D && header[1] & 0xF0 == 0x30 {
                self.stage = Stage::PostInit;
            } else {
                probe.prepare(Some(Repr::RawBytes(header)), None)?;
            }
        }
        Ok(())
    }

    fn polling_burst(&mut self, summary: &mut InitSummary) -> Result<(), ProtocolError> {
        let status = Command::Status.frame()?;
        let spacing = Duration::from_millis(self.timing.burst_spacing_ms);
        let count = self.timing.burst_count;

        for sent in 1..=count {
            self.check_interrupt()?;
            self.transport()?.write(&status)?;
            std::thread::sleep(spacing);

            if self.transport()?.bytes_waiting()? > 0 {
                match self.transport()?.read() {
                    Ok(reply) => {
                        summary.burst_replies += 1;
                        debug!(reply = %reply, "burst reply received");
                    }
                    Err(ProtocolError::Communication(e)) => {
                        warn!(code = e.code.as_u8(), "unreadable burst reply");
                    }
                    Err(e) => return Err(e),
                }
            } else {
                debug!("no message");
            }
            debug!(left = count - sent, "burst messages left");
        }
        info!(replies = summary.burst_replies, "polling burst done");
        Ok(())
    }

    fn acknowledge_request(&mut self, summary: &mut InitSummary) -> Result<(), ProtocolError> {
        info!("sending Rb request");
        match self.exchange(&Command::Acknowledge.frame()?) {
            Ok(reply) => {
                summary.acknowledged = true;
                info!(reply = %reply, "Rb acknowledge received");
            }
            Err(ProtocolError::Communication(e)) => {
                error!(code = e.code.as_u8(), "no Rb acknowledge");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn final_handshake(&mut self, summary: &mut InitSummary) -> Result<(), ProtocolError> {
        let delay = Duration::from_millis(self.timing.settle_delay_ms);
        info!(?delay, "waiting before the first M2 request");
        std::thread::sleep(delay);

        let status = Command::Status.frame()?;
        while summary.final_attempts < self.timing.final_attempts {
            self.check_interrupt()?;
            summary.final_attempts += 1;
            match self.exchange(&status) {
                Ok(_) => {
                    summary.final_acknowledged = true;
                    debug!(attempt = summary.final_attempts, "M2 acknowledge received");
                    break;
                }
                Err(ProtocolError::Communication(e)) => {
                    warn!(
                        attempt = summary.final_attempts,
                        code = e.code.as_u8(),
                        "no acknowledge for final M2 request, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if !summary.final_acknowledged {
            // The furnace usually starts answering anyway
            warn!(
                attempts = summary.final_attempts,
                "final M2 request never acknowledged, entering data exchange regardless"
            );
        }
        Ok(())
    }

    /// Poll telemetry and hand every record to `sinks`.
    ///
    /// Requests alternate between 'M1' and 'M2'; an 'M3' reply is echoed
    /// once before alternation resumes. Without limits in `options` this only
    /// returns on error.
    pub fn read_data(
        &mut self,
        options: &ExchangeOptions,
        sinks: &mut [Sink<'_>],
    ) -> Result<ExchangeSummary, ProtocolError> {
        let _entered = self.span.clone().entered();
        info!("entering data exchange mode");
        self.transport()?;
        self.stage = Stage::Xchg;

        let started = Instant::now();
        let mut summary = ExchangeSummary::default();
        let mut last_header = Vec::new();
        let mut send_telemetry = true;
        let mut timestamp: Option<i64> = None;

        let interrupt = self.interrupt.clone();
        while !options.finished(&summary, started, interrupt.as_ref()) {
            if summary.cycles > 0 {
                std::thread::sleep(options.poll_interval);
                if options.finished(&summary, started, interrupt.as_ref()) {
                    break;
                }
            }
            summary.cycles += 1;

            let command = if last_header == Command::Continuation.header() {
                info!("M3 message received");
                Command::Continuation
            } else if send_telemetry {
                send_telemetry = false;
                Command::Telemetry
            } else {
                send_telemetry = true;
                Command::Status
            };
            debug!(?command, "sending request");

            let reply = match self.exchange(&command.frame()?) {
                Ok(reply) => reply,
                Err(ProtocolError::Communication(e)) => {
                    error!(cycle = summary.cycles, code = e.code.as_u8(), "data exchange failed");
                    return Err(ProtocolError::StageFailed {
                        stage: Stage::Xchg,
                        attempts: u32::try_from(summary.cycles).unwrap_or(u32::MAX),
                        source: e,
                    });
                }
                Err(e) => return Err(e),
            };
            debug!(reply = %reply, "received message");

            if reply.header_is(Command::Telemetry.header()) {
                if !options.use_furnace_clock {
                    timestamp = Some(chrono::Local::now().timestamp());
                }
                match timestamp {
                    Some(ts) => {
                        let record = TelemetryRecord::from_frame(ts, &reply);
                        record.deliver(sinks)?;
                        summary.records += 1;
                        if !record.valid {
                            summary.invalid_records += 1;
                        }
                    }
                    None => debug!("furnace clock unknown yet, telemetry dropped"),
                }
            } else if options.use_furnace_clock && reply.header_is(Command::Status.header()) {
                match telemetry::furnace_timestamp(reply.data()) {
                    Some(ts) => {
                        debug!(ts, "furnace clock updated");
                        timestamp = Some(ts);
                    }
                    None => warn!(data = %reply, "undecodable furnace clock"),
                }
            }

            last_header = reply.header().to_vec();
        }

        info!(
            cycles = summary.cycles,
            records = summary.records,
            "leaving data exchange mode"
        );
        Ok(summary)
    }

    /// Go back to PREINIT and release the transport. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.stage = Stage::PreInit;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!(parent: &self.span, "session stopped");
        }
    }
}
