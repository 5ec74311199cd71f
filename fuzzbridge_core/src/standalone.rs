use crate::coverage::PrivateCoverage;
use crate::error::BridgeError;
use crate::trace::TraceCollector;
use std::path::Path;

pub const USAGE: &str = "You must specify the input path as the first command line argument \
when not running under libFuzzer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandaloneOutcome {
    /// No input path was given; usage was printed and the action never ran.
    MissingInput,
    Executed { input_len: usize, hit_edges: usize },
}

/// Replays one input file through `action` without an engine.
///
/// Coverage goes to a private buffer so instrumented code behaves the same as
/// under a bridge session. A panic in `action` propagates to the caller; this
/// mode is used to reproduce crashes, so the process should die with it.
pub fn run_standalone<F>(input_path: Option<&Path>, mut action: F) -> Result<StandaloneOutcome, BridgeError>
where
    F: FnMut(&[u8]),
{
    let Some(path) = input_path else {
        eprintln!("{USAGE}");
        return Ok(StandaloneOutcome::MissingInput);
    };

    let input = std::fs::read(path)?;
    tracing::info!(
        path = %path.display(),
        len = input.len(),
        md5 = %format!("{:x}", md5::compute(&input)),
        "replaying input"
    );

    let mut coverage = PrivateCoverage::new();
    let hit_edges = TraceCollector::scoped(coverage.map(), |collector| {
        action(&input);
        collector.count_hit_edges()
    })?;
    tracing::debug!(hit_edges, "standalone run finished");

    Ok(StandaloneOutcome::Executed {
        input_len: input.len(),
        hit_edges,
    })
}
