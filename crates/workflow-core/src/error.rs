//! Runtime error types.

use thiserror::Error;

/// Failures inside one stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// An analyst failed to produce its artifact.
    #[error("analyst {analyst_id} failed: {message}")]
    Analyst {
        /// Failing analyst.
        analyst_id: String,
        /// Failure detail.
        message: String,
    },

    /// A broker port call failed beyond its retry budget.
    #[error("broker port: {0}")]
    Broker(#[from] broker_core::BrokerError),

    /// An artifact violated its construction invariants.
    #[error("invalid artifact: {0}")]
    Validation(#[from] model::ValidationError),

    /// Session store access failed.
    #[error("session store: {0}")]
    Store(#[from] session_store::StoreError),

    /// The stage exceeded its deadline.
    #[error("stage deadline exceeded")]
    DeadlineExceeded,

    /// The run was cancelled at a stage boundary or port wait.
    #[error("run cancelled")]
    Cancelled,

    /// A required prior stage output was missing.
    #[error("missing step output: {0}")]
    MissingStep(String),

    /// Any other stage-level failure.
    #[error("{0}")]
    Other(String),
}

/// Failures at the run level.
#[derive(Debug, Error)]
pub enum RunError {
    /// Another run of this workflow is already in flight; the trigger is
    /// dropped, not queued.
    #[error("workflow {0} already has a run in flight")]
    Overlap(String),

    /// No workflow with this name is registered.
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// Persisting the run failed.
    #[error("session store: {0}")]
    Store(#[from] session_store::StoreError),
}
