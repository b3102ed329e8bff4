//! Scheduler-to-runtime dispatch.

use crate::workflows::{default_input, WorkflowSet};
use async_trait::async_trait;
use auth::TokenManager;
use metrics::SharedMetrics;
use scheduler::{DispatchResult, WorkflowDispatcher};
use session_store::RunStatus;
use std::sync::Arc;
use tracing::{error, info, warn};
use workflow_core::{RunError, RunOutcome, WorkflowRuntime};

/// Starts workflow runs for the scheduler and the CLI.
///
/// Scheduled dispatch is fire-and-forget: the run owns a worker task for
/// its lifetime and the scheduler keeps the clock. The CLI path blocks on
/// the outcome instead.
pub struct RunDispatcher {
    runtime: Arc<WorkflowRuntime>,
    workflows: Arc<WorkflowSet>,
    metrics: SharedMetrics,
    /// Token lifecycle gating dispatch; `None` in paper mode.
    token_gate: Option<Arc<TokenManager>>,
}

impl RunDispatcher {
    /// Dispatcher over the runtime and built workflows.
    pub fn new(
        runtime: Arc<WorkflowRuntime>,
        workflows: Arc<WorkflowSet>,
        metrics: SharedMetrics,
        token_gate: Option<Arc<TokenManager>>,
    ) -> Self {
        Self {
            runtime,
            workflows,
            metrics,
            token_gate,
        }
    }

    /// One-shot manual run, honouring the non-overlap rule.
    pub async fn run_now(&self, name: &str, session_id: &str) -> Result<RunOutcome, RunError> {
        let workflow = self
            .workflows
            .by_name(name)
            .ok_or_else(|| RunError::UnknownWorkflow(name.to_string()))?;
        self.metrics.inc_runs_started();
        let outcome = self
            .runtime
            .run(
                workflow,
                session_id,
                &default_input(name, session_id),
                WorkflowRuntime::never_cancelled(),
            )
            .await?;
        self.count_outcome(&outcome);
        Ok(outcome)
    }

    fn count_outcome(&self, outcome: &RunOutcome) {
        match outcome.status {
            RunStatus::Ok | RunStatus::Partial => self.metrics.inc_runs_ok(),
            RunStatus::Halted => self.metrics.inc_runs_halted(),
            RunStatus::Failed => self.metrics.inc_runs_failed(),
        }
    }
}

#[async_trait]
impl WorkflowDispatcher for RunDispatcher {
    async fn dispatch(&self, workflow: &str, session_id: &str) -> DispatchResult {
        let Some(definition) = self.workflows.by_name(workflow) else {
            error!(workflow, "unknown workflow in trigger table");
            return DispatchResult::Failed;
        };
        if self.runtime.is_in_flight(workflow) {
            self.metrics.inc_triggers_dropped();
            return DispatchResult::Overlap;
        }

        // The workflow set lives as long as the process, so hand the task
        // owned handles and let the run own its worker.
        let runtime = self.runtime.clone();
        let workflows = self.workflows.clone();
        let metrics = self.metrics.clone();
        let name = definition.name.clone();
        let session_id = session_id.to_string();
        metrics.inc_runs_started();
        self.metrics.inc_triggers_fired();

        tokio::spawn(async move {
            let Some(workflow) = workflows.by_name(&name) else {
                return;
            };
            let input = default_input(&name, &session_id);
            match runtime
                .run(workflow, &session_id, &input, WorkflowRuntime::never_cancelled())
                .await
            {
                Ok(outcome) => {
                    info!(workflow = %name, status = ?outcome.status, "scheduled run finished");
                    match outcome.status {
                        RunStatus::Ok | RunStatus::Partial => metrics.inc_runs_ok(),
                        RunStatus::Halted => metrics.inc_runs_halted(),
                        RunStatus::Failed => metrics.inc_runs_failed(),
                    }
                }
                Err(RunError::Overlap(_)) => {
                    warn!(workflow = %name, "run refused: already in flight");
                    metrics.inc_triggers_dropped();
                }
                Err(e) => {
                    error!(workflow = %name, error = %e, "scheduled run failed to persist");
                    metrics.inc_runs_failed();
                }
            }
        });

        DispatchResult::Started
    }

    async fn token_valid(&self) -> bool {
        match &self.token_gate {
            None => true,
            Some(manager) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                manager.is_valid(now_ms).await
            }
        }
    }
}
