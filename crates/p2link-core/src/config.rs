//! Monitor configuration
//!
//! JSON settings for a monitoring run. Every field has a default, so a
//! file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::monitor::{RunOptions, StagePlan};
use crate::protocol::{
    ExchangeOptions, InitTiming, ProtocolError, SerialConnector, TransportConfig, User,
    DEFAULT_BAUD_RATE,
};

/// Authentication settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Login identity
    pub user: User,
    /// Retries after the first failed attempt
    pub max_retry: u32,
    /// Pause between attempts, in milliseconds
    pub retry_wait_ms: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            user: User::Service,
            max_retry: 3,
            retry_wait_ms: 10_000,
        }
    }
}

/// Data exchange settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// Pause between requests, in milliseconds
    pub poll_interval_ms: u64,
    /// Timestamp records with the furnace clock
    pub use_furnace_clock: bool,
    /// Stop after this many records
    pub max_records: Option<u64>,
    /// Stop after this many seconds
    pub max_duration_secs: Option<u64>,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            use_furnace_clock: false,
            max_records: None,
            max_duration_secs: None,
        }
    }
}

impl ExchangeSettings {
    /// Options for [`Session::read_data`](crate::protocol::Session::read_data)
    pub fn options(&self) -> ExchangeOptions {
        ExchangeOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            use_furnace_clock: self.use_furnace_clock,
            max_records: self.max_records,
            max_duration: self.max_duration_secs.map(Duration::from_secs),
            cancel: None,
        }
    }
}

/// Settings of a monitoring run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Serial port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timing and checksum policy
    pub transport: TransportConfig,
    /// Authentication
    pub auth: AuthSettings,
    /// Initialisation timings
    pub init: InitTiming,
    /// Data exchange
    pub exchange: ExchangeSettings,
    /// Reruns allowed for a failed init or data stage
    pub max_stage_retry: u32,
    /// Stage names to run, in order
    pub stages: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            transport: TransportConfig::default(),
            auth: AuthSettings::default(),
            init: InitTiming::default(),
            exchange: ExchangeSettings::default(),
            max_stage_retry: 3,
            stages: vec!["all".to_string()],
        }
    }
}

impl MonitorConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::Config(e.to_string()))
    }

    /// Save as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProtocolError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProtocolError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Connector for the configured port
    pub fn connector(&self) -> SerialConnector {
        SerialConnector::new(&self.port).with_baud_rate(self.baud_rate)
    }

    /// Parsed stage list
    pub fn plan(&self) -> Result<StagePlan, ProtocolError> {
        StagePlan::parse(&self.stages)
    }

    /// Options for [`run_stages`](crate::monitor::run_stages)
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            user: self.auth.user,
            max_retry: self.auth.max_retry,
            retry_wait: Duration::from_millis(self.auth.retry_wait_ms),
            exchange: self.exchange.options(),
            max_stage_retry: self.max_stage_retry,
        }
    }
}
