//! Stage runner
//!
//! Runs a chosen list of session stages, retrying the ones that can
//! recover from a communication failure.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::protocol::{
    ExchangeOptions, ExchangeSummary, InitSummary, ProtocolError, Session, User,
};
use crate::store::Sink;

/// A step of a [`StagePlan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// [`Session::run_auth`]
    Auth,
    /// [`Session::run_init`]
    Init,
    /// [`Session::read_data`]
    Data,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Auth => "auth",
            Step::Init => "init",
            Step::Data => "data",
        })
    }
}

/// Ordered list of steps to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    steps: Vec<Step>,
}

impl Default for StagePlan {
    fn default() -> Self {
        Self {
            steps: vec![Step::Auth, Step::Init, Step::Data],
        }
    }
}

impl StagePlan {
    /// Plan from stage names (`auth`, `init`, `data`, `all`)
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, ProtocolError> {
        let mut steps = Vec::new();
        for name in names {
            match name.as_ref().trim().to_ascii_lowercase().as_str() {
                "auth" => steps.push(Step::Auth),
                "init" => steps.push(Step::Init),
                "data" => steps.push(Step::Data),
                "all" => steps.extend([Step::Auth, Step::Init, Step::Data]),
                other => {
                    return Err(ProtocolError::Config(format!("unknown stage '{}'", other)));
                }
            }
        }
        if steps.is_empty() {
            return Err(ProtocolError::Config("no stage to run".to_string()));
        }
        Ok(Self { steps })
    }

    /// Steps in run order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl FromStr for StagePlan {
    type Err = ProtocolError;

    /// Comma-separated stage names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s.split(',').filter(|n| !n.trim().is_empty()).collect();
        Self::parse(&names)
    }
}

/// Parameters of [`run_stages`]
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Login identity
    pub user: User,
    /// Authentication retries
    pub max_retry: u32,
    /// Pause between authentication attempts
    pub retry_wait: Duration,
    /// Data exchange settings
    pub exchange: ExchangeOptions,
    /// Reruns allowed for a failed init or data stage
    pub max_stage_retry: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            user: User::default(),
            max_retry: 3,
            retry_wait: Duration::from_secs(10),
            exchange: ExchangeOptions::default(),
            max_stage_retry: 3,
        }
    }
}

/// What the executed steps returned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Result of the last successful init step
    pub init: Option<InitSummary>,
    /// Result of the last successful data step
    pub exchange: Option<ExchangeSummary>,
    /// Stage reruns spent
    pub stage_retries: u32,
}

/// Run every step of `plan` on `session`.
///
/// The session is left open; stopping it is up to the caller.
pub fn run_stages(
    session: &mut Session,
    plan: &StagePlan,
    options: &RunOptions,
    sinks: &mut [Sink<'_>],
) -> Result<RunReport, ProtocolError> {
    let mut report = RunReport::default();

    for &step in plan.steps() {
        info!(%step, "running stage");
        let mut retries = 0;
        loop {
            let result = match step {
                Step::Auth => session.run_auth(options.user, options.max_retry, options.retry_wait),
                Step::Init => session.run_init().map(|summary| {
                    report.init = Some(summary);
                }),
                Step::Data => session.read_data(&options.exchange, sinks).map(|summary| {
                    report.exchange = Some(summary);
                }),
            };

            match result {
                Ok(()) => break,
                Err(e) if step != Step::Auth && e.communication().is_some() => {
                    if retries >= options.max_stage_retry {
                        error!(%step, attempts = retries + 1, "stage failed again, giving up");
                        return Err(e);
                    }
                    retries += 1;
                    report.stage_retries += 1;
                    warn!(%step, error = %e, retry = retries, "stage failed, running it again");
                }
                Err(e) => {
                    error!(%step, error = %e, "stage failed");
                    return Err(e);
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plan_parsing() {
        assert_eq!(StagePlan::parse(&["all"]).unwrap(), StagePlan::default());
        assert_eq!(
            "init, data".parse::<StagePlan>().unwrap().steps(),
            &[Step::Init, Step::Data]
        );
        assert_eq!(
            StagePlan::parse(&["Auth", "data"]).unwrap().steps(),
            &[Step::Auth, Step::Data]
        );
    }

    #[test]
    fn test_plan_rejects_unknown_and_empty() {
        assert!(matches!(
            StagePlan::parse(&["auth", "flush"]),
            Err(ProtocolError::Config(_))
        ));
        assert!(matches!("".parse::<StagePlan>(), Err(ProtocolError::Config(_))));
    }
}
