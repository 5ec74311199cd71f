use crate::channel::FaultStatus;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Result of running the harness action on one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Completed,
    Faulted(String),
}

impl Execution {
    pub fn status(&self) -> FaultStatus {
        match self {
            Execution::Completed => FaultStatus::None,
            Execution::Faulted(_) => FaultStatus::Crash,
        }
    }
}

/// Runs `action` on `input`, turning a panic into `Execution::Faulted`.
pub fn execute_guarded<F>(action: &mut F, input: &[u8]) -> Execution
where
    F: FnMut(&[u8]),
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        action(input);
    }));

    match result {
        Ok(()) => Execution::Completed,
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic type".to_string()
            };
            Execution::Faulted(msg)
        }
    }
}
