//! Coverage for code that runs outside any test case.
//!
//! Harness setup and teardown are often instrumented too. Running them with no
//! target installed is already safe, but wrapping them in a scaffold gives their
//! edges somewhere to go and keeps them out of the engine's map.

use crate::coverage::PrivateCoverage;
use crate::error::BridgeError;
use crate::trace::TraceCollector;

/// Runs `action` with a throwaway coverage buffer installed.
///
/// The buffer is uninstalled when `action` returns or unwinds. Fails with
/// [`BridgeError::TargetInstalled`] if called inside a session or another
/// scaffold.
pub fn with_scaffold<T, F>(action: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> T,
{
    let mut scratch = PrivateCoverage::new();
    TraceCollector::scoped(scratch.map(), |collector| {
        let value = action();
        tracing::trace!(hit_edges = collector.count_hit_edges(), "scaffold finished");
        value
    })
}

/// Runs harness setup under a scaffold.
pub fn initialize<T, F>(action: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> T,
{
    tracing::debug!("running harness initialization");
    with_scaffold(action)
}

/// Runs harness teardown under a scaffold.
pub fn cleanup<T, F>(action: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> T,
{
    tracing::debug!("running harness cleanup");
    with_scaffold(action)
}
