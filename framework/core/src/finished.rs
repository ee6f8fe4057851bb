use serde::{Deserialize, Serialize};

/// Exit code the process wrapper records for a process stopped by an interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResult {
    #[display("SUCCESS")]
    Success,
    #[display("ABORTED")]
    Aborted,
    #[display("FAILURE")]
    Failure,
}

/// Aggregate outcome of all nodes in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Every node exited with code 0.
    pub passed: bool,
    /// At least one node was stopped by an interrupt.
    pub aborted: bool,
    /// The sidecar was terminated before every node reported completion, so this outcome was not
    /// derived from a complete set of exit codes.
    pub interrupted: bool,
}

impl RunOutcome {
    /// The outcome recorded when the sidecar is told to terminate before all nodes finished.
    pub fn interrupted() -> Self {
        Self {
            passed: false,
            aborted: false,
            interrupted: true,
        }
    }

    pub fn result(&self) -> RunResult {
        if self.passed {
            RunResult::Success
        } else if self.interrupted {
            RunResult::Aborted
        } else {
            RunResult::Failure
        }
    }
}

/// The record uploaded once a run is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRecord {
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    pub passed: bool,
    pub result: RunResult,
    #[serde(default)]
    pub aborted: bool,
}

impl FinishRecord {
    pub fn new(outcome: &RunOutcome) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            passed: outcome.passed,
            result: outcome.result(),
            aborted: outcome.aborted,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}
