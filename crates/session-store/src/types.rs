//! Persisted session and run records.

use model::{Artifact, SessionState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O error: {0}")]
    Io(String),

    /// Document could not be (de)serialized.
    #[error("store format error: {0}")]
    Format(String),

    /// Run violates an append invariant.
    #[error("invalid run: {0}")]
    InvalidRun(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

/// Terminal status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// All stages completed.
    Ok,
    /// A stage failed; remaining stages were skipped.
    Failed,
    /// One or more tolerant stages failed and were skipped.
    Partial,
    /// A gating stage short-circuited the run. Not a failure.
    Halted,
}

impl RunStatus {
    /// Whether the run completed without error (gated runs count).
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Partial | Self::Halted)
    }
}

/// One stage's recorded output within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Declared stage name.
    pub name: String,
    /// The artifact the stage produced (`Null` for tolerated failures).
    pub artifact: Artifact,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
}

/// One invocation of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    /// Workflow input record.
    pub input: String,
    /// Final stage output, when the run got that far.
    pub output: Option<Artifact>,
    /// Ordered stage outputs.
    pub step_outputs: Vec<StepRecord>,
    /// Session state as persisted at run end.
    pub state_snapshot: SessionState,
    pub status: RunStatus,
    /// Failure detail for FAILED runs.
    pub error: Option<String>,
}

impl WorkflowRun {
    /// Output of a named step, if the run recorded one.
    pub fn step_output(&self, name: &str) -> Option<&Artifact> {
        self.step_outputs
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.artifact)
    }
}

/// The durable record for one (workflow, session_id) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub workflow_name: String,
    /// Trading date, `YYYY-MM-DD`.
    pub session_id: String,
    /// Runs in append order.
    pub runs: Vec<WorkflowRun>,
    /// Latest committed session state.
    pub session_state: SessionState,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl WorkflowSession {
    /// Fresh session with no runs.
    pub fn new(workflow_name: impl Into<String>, session_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            session_id: session_id.into(),
            runs: Vec::new(),
            session_state: SessionState::new(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// The most recent run, if any.
    pub fn last_run(&self) -> Option<&WorkflowRun> {
        self.runs.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_success() {
        assert!(RunStatus::Ok.is_success());
        assert!(RunStatus::Partial.is_success());
        assert!(RunStatus::Halted.is_success());
        assert!(!RunStatus::Failed.is_success());
    }

    #[test]
    fn test_step_output_lookup() {
        let run = WorkflowRun {
            run_id: "r1".into(),
            started_at_ms: 0,
            ended_at_ms: 1,
            input: "input".into(),
            output: None,
            step_outputs: vec![StepRecord {
                name: "regime".into(),
                artifact: Artifact::Report("calm".into()),
                started_at_ms: 0,
                ended_at_ms: 1,
            }],
            state_snapshot: SessionState::new(),
            status: RunStatus::Ok,
            error: None,
        };
        assert!(run.step_output("regime").is_some());
        assert!(run.step_output("missing").is_none());
    }
}
