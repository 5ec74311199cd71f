pub mod bridge;
pub mod channel;
pub mod config;
pub mod coverage;
pub mod error;
pub mod execution;
pub mod scaffold;
pub mod shmem;
pub mod standalone;
pub mod trace;

pub use bridge::{ParentEndpoints, ProtocolBridge, SessionEnd, SessionReport};
pub use channel::FaultStatus;
pub use config::{BridgeSettings, FuzzbridgeConfig};
pub use coverage::{CoverageMap, MAP_SIZE, PrivateCoverage};
pub use error::BridgeError;
pub use scaffold::{cleanup, initialize, with_scaffold};
pub use shmem::DEFAULT_BUFFER_SIZE;
pub use standalone::{StandaloneOutcome, run_standalone};
pub use trace::{TraceCollector, record_edge};

use std::path::Path;

/// How a call to [`run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Session(SessionReport),
    Standalone(StandaloneOutcome),
}

/// Drives `action` with test cases.
///
/// Under an engine this connects to it and serves test cases until a fault or
/// disconnect. Otherwise the first command-line argument is replayed once.
pub fn run<F>(action: F) -> Result<RunOutcome, BridgeError>
where
    F: FnMut(&[u8]),
{
    run_with_settings(&BridgeSettings::default(), action)
}

pub fn run_with_settings<F>(settings: &BridgeSettings, action: F) -> Result<RunOutcome, BridgeError>
where
    F: FnMut(&[u8]),
{
    match ParentEndpoints::from_env(settings) {
        Some(endpoints) => {
            let mut bridge = ProtocolBridge::connect(&endpoints).inspect_err(|e| {
                tracing::error!(error = %e, "failed to connect to fuzzing engine");
            })?;
            let report = bridge.run(action).inspect_err(|e| {
                tracing::error!(error = %e, "fuzzing session aborted");
            })?;
            tracing::info!(end = ?report.end, executions = report.executions, "session finished");
            Ok(RunOutcome::Session(report))
        }
        None => {
            tracing::debug!("no engine in the environment, running standalone");
            let input = std::env::args_os().nth(1);
            let outcome = run_standalone(input.as_deref().map(Path::new), action)?;
            Ok(RunOutcome::Standalone(outcome))
        }
    }
}
