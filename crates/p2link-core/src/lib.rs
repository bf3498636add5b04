//! # p2link Core Library
//!
//! Core functionality for monitoring P2 pellet furnaces over their serial
//! service port.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The P2 frame codec with its additive checksum
//! - A deadline-bounded frame transport over a serial line
//! - The session state machine (login, initialisation, data exchange)
//! - Telemetry decoding and record sinks
//!
//! ## Example
//!
//! ```rust,ignore
//! use p2link_core::prelude::*;
//!
//! let config = MonitorConfig::from_file("p2link.json")?;
//! let mut session = Session::open(
//!     Box::new(config.connector()),
//!     config.transport.clone(),
//!     config.init.clone(),
//!     tracing::info_span!("furnace"),
//! )?;
//!
//! let mut store = MemoryStore::new();
//! run_stages(
//!     &mut session,
//!     &config.plan()?,
//!     &config.run_options(),
//!     &mut [Sink::KeyValue(&mut store)],
//! )?;
//! session.stop();
//! ```

pub mod config;
pub mod monitor;
pub mod protocol;
pub mod store;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::MonitorConfig;
    pub use crate::monitor::{run_stages, RunOptions, StagePlan};
    pub use crate::protocol::{
        Command, ExchangeOptions, Frame, ProtocolError, SerialConnector, Session, Stage, User,
    };
    pub use crate::store::{CsvLog, MemoryStore, Sink, TextLog};
    pub use crate::telemetry::Telemetry;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
