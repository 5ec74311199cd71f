//! The engine-driven execution loop.
//!
//! A harness process spawned by the engine finds three identifiers in its
//! environment: the shared segment and the two pipes. [`ProtocolBridge`]
//! attaches to them once and then serves test cases until the harness faults or
//! the engine goes away.

use crate::channel::{ControlChannel, FaultStatus, StatusChannel, connect_pipes};
use crate::config::BridgeSettings;
use crate::coverage::CoverageMap;
use crate::error::BridgeError;
use crate::execution::{Execution, execute_guarded};
use crate::shmem::{PayloadBuffer, SharedRegion};
use crate::trace::TraceCollector;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Locations of the engine's resources, as announced through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentEndpoints {
    pub segment: PathBuf,
    pub control_pipe: PathBuf,
    pub status_pipe: PathBuf,
}

impl ParentEndpoints {
    /// Reads the endpoints from the process environment.
    ///
    /// Returns `None` unless all three variables are set, which means the
    /// harness was not started by an engine.
    pub fn from_env(settings: &BridgeSettings) -> Option<Self> {
        Self::lookup(settings, |key| std::env::var(key).ok())
    }

    pub fn lookup<F>(settings: &BridgeSettings, get: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let segment = get(&settings.shm_env_var)?;
        let control_pipe = get(&settings.control_pipe_env_var)?;
        let status_pipe = get(&settings.status_pipe_env_var)?;
        Some(Self {
            segment: settings.resolve_segment(&segment),
            control_pipe: settings.resolve_pipe(&control_pipe),
            status_pipe: settings.resolve_pipe(&status_pipe),
        })
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The harness faulted and `Crash` was reported.
    Crashed,
    /// A pipe failed, normally because the engine exited or killed us.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub executions: u64,
}

/// A live connection to the engine: the mapped segment plus both pipes.
///
/// Fields drop in declaration order, so a bridge that fails halfway through
/// `connect` or finishes its session releases every handle it acquired.
#[derive(Debug)]
pub struct ProtocolBridge {
    control: ControlChannel<File>,
    status: StatusChannel<File>,
    region: SharedRegion,
}

impl ProtocolBridge {
    pub fn connect(endpoints: &ParentEndpoints) -> Result<Self, BridgeError> {
        let region = SharedRegion::open(&endpoints.segment)?;
        let (status, control) = connect_pipes(&endpoints.status_pipe, &endpoints.control_pipe)?;
        tracing::info!(
            segment = %endpoints.segment.display(),
            control = %endpoints.control_pipe.display(),
            status = %endpoints.status_pipe.display(),
            "connected to fuzzing engine"
        );
        Ok(Self {
            control,
            status,
            region,
        })
    }

    /// Serves test cases until the harness faults or the engine hangs up.
    pub fn run<F>(&mut self, action: F) -> Result<SessionReport, BridgeError>
    where
        F: FnMut(&[u8]),
    {
        let (coverage, payload) = self.region.split();
        run_session(
            coverage,
            &payload,
            &mut self.control,
            &mut self.status,
            action,
        )
    }
}

/// The handshake and request/response loop, over any pair of byte streams.
///
/// Exactly one status is written per length read. Pipe failures end the
/// session as [`SessionEnd::Disconnected`]; a length outside the payload area
/// is a protocol violation and is returned as an error without a status.
pub fn run_session<R, W, F>(
    coverage: CoverageMap<'_>,
    payload: &PayloadBuffer<'_>,
    control: &mut ControlChannel<R>,
    status: &mut StatusChannel<W>,
    action: F,
) -> Result<SessionReport, BridgeError>
where
    R: Read,
    W: Write,
    F: FnMut(&[u8]),
{
    TraceCollector::scoped(coverage, |collector| {
        serve(collector, payload, control, status, action)
    })?
}

fn serve<R, W, F>(
    collector: &TraceCollector<'_>,
    payload: &PayloadBuffer<'_>,
    control: &mut ControlChannel<R>,
    status: &mut StatusChannel<W>,
    mut action: F,
) -> Result<SessionReport, BridgeError>
where
    R: Read,
    W: Write,
    F: FnMut(&[u8]),
{
    let mut executions = 0u64;

    if let Err(e) = status.write_handshake() {
        return Ok(disconnected(e, executions));
    }

    loop {
        collector.reset();

        let len = match control.read_len() {
            Ok(len) => len,
            Err(e) => return Ok(disconnected(e, executions)),
        };
        let input = payload.view(len).inspect_err(|_| {
            tracing::error!(len, executions, "engine announced a payload outside the shared buffer");
        })?;

        let execution = execute_guarded(&mut action, input);
        executions += 1;
        if let Execution::Faulted(details) = &execution {
            tracing::error!(executions, len = input.len(), %details, "harness fault");
        }

        let fault = execution.status();
        if let Err(e) = status.write_status(fault) {
            return Ok(disconnected(e, executions));
        }
        if fault == FaultStatus::Crash {
            tracing::info!(executions, "reported crash to engine, ending session");
            return Ok(SessionReport {
                end: SessionEnd::Crashed,
                executions,
            });
        }
    }
}

fn disconnected(err: BridgeError, executions: u64) -> SessionReport {
    tracing::debug!(error = %err, hung_up = err.is_disconnect(), executions, "engine channel closed");
    SessionReport {
        end: SessionEnd::Disconnected,
        executions,
    }
}
