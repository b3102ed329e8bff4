//! Workflow definitions and the run executor.

use crate::stage::{FnStage, DEFAULT_STAGE_DEADLINE};
use crate::{
    AgentStage, FunctionStage, Ports, QuorumPolicy, RunError, Stage, StageContext, StageError,
    StageFlow,
};
use dashmap::DashMap;
use model::{Artifact, SessionState};
use session_store::{RunStatus, SessionStore, StepRecord, WorkflowRun};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A named ordered sequence of stages.
pub struct Workflow {
    pub name: String,
    stages: Vec<Stage>,
}

impl Workflow {
    /// Empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append an agent stage.
    pub fn agent(mut self, stage: AgentStage) -> Self {
        self.stages.push(Stage::Agent(stage));
        self
    }

    /// Append a parallel group with the fan-out cap defaulting to the
    /// group size.
    pub fn parallel(
        mut self,
        name: impl Into<String>,
        members: Vec<AgentStage>,
        quorum: QuorumPolicy,
    ) -> Self {
        let max_concurrency = members.len().max(1);
        self.stages.push(Stage::Parallel {
            name: name.into(),
            members,
            quorum,
            max_concurrency,
        });
        self
    }

    /// Append a function stage from a closure.
    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&StageContext<'_>, &mut SessionState) -> Result<StageFlow, StageError>
            + Send
            + Sync
            + 'static,
    {
        self.stages.push(Stage::Function {
            name: name.into(),
            f: Arc::new(FnStage(f)),
            deadline: DEFAULT_STAGE_DEADLINE,
        });
        self
    }

    /// Append a function stage from a trait object.
    pub fn function_stage(
        mut self,
        name: impl Into<String>,
        f: Arc<dyn FunctionStage>,
    ) -> Self {
        self.stages.push(Stage::Function {
            name: name.into(),
            f,
            deadline: DEFAULT_STAGE_DEADLINE,
        });
        self
    }

    /// Declared stage names, in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// Runtime tunables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How many prior runs `workflow_history` exposes by default.
    pub history_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { history_depth: 5 }
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// Final stage output.
    pub output: Option<Artifact>,
    /// Failure detail for FAILED runs.
    pub error: Option<String>,
}

/// Executes workflows against the session store and the ports.
pub struct WorkflowRuntime {
    store: Arc<SessionStore>,
    ports: Ports,
    config: RuntimeConfig,
    in_flight: DashMap<String, ()>,
}

/// Removes the in-flight marker when the run finishes, however it exits.
struct InFlightGuard<'a> {
    runtime: &'a WorkflowRuntime,
    workflow: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.runtime.in_flight.remove(&self.workflow);
    }
}

impl WorkflowRuntime {
    /// Runtime over a store and port bundle.
    pub fn new(store: Arc<SessionStore>, ports: Ports) -> Self {
        Self::with_config(store, ports, RuntimeConfig::default())
    }

    /// Runtime with explicit config.
    pub fn with_config(store: Arc<SessionStore>, ports: Ports, config: RuntimeConfig) -> Self {
        Self {
            store,
            ports,
            config,
            in_flight: DashMap::new(),
        }
    }

    /// The underlying session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// A cancellation receiver that never fires.
    pub fn never_cancelled() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the life of the process.
        std::mem::forget(tx);
        rx
    }

    /// Whether a run of the workflow is currently in flight.
    pub fn is_in_flight(&self, workflow: &str) -> bool {
        self.in_flight.contains_key(workflow)
    }

    /// Execute one run of `workflow` for `session_id`.
    ///
    /// At most one run per workflow may be in flight; a second request is
    /// refused with [`RunError::Overlap`] and must be audited by the
    /// caller, never queued.
    pub async fn run(
        &self,
        workflow: &Workflow,
        session_id: &str,
        input: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunOutcome, RunError> {
        if self
            .in_flight
            .insert(workflow.name.clone(), ())
            .is_some()
        {
            return Err(RunError::Overlap(workflow.name.clone()));
        }
        let _guard = InFlightGuard {
            runtime: self,
            workflow: workflow.name.clone(),
        };

        let run_id = Uuid::new_v4().to_string();
        let started_at_ms = now_ms();
        let mut state = self.store.session_state(&workflow.name, session_id)?;
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut run_error: Option<String> = None;
        let mut halted = false;
        let mut partial = false;

        info!(workflow = %workflow.name, session_id, run_id = %run_id, "run started");

        for stage in &workflow.stages {
            if *cancel.borrow() {
                run_error = Some("cancelled".into());
                break;
            }

            let stage_started = now_ms();
            let stage_name = stage.name().to_string();

            let outcome = match stage {
                Stage::Agent(agent) => self
                    .run_agent(agent, workflow, session_id, &run_id, input, &steps, &state, &mut cancel)
                    .await
                    .map(StageFlow::Continue),
                Stage::Parallel {
                    members,
                    quorum,
                    max_concurrency,
                    ..
                } => self
                    .run_group(
                        members,
                        *quorum,
                        *max_concurrency,
                        workflow,
                        session_id,
                        &run_id,
                        input,
                        &steps,
                        &state,
                        &cancel,
                    )
                    .await
                    .map(StageFlow::Continue),
                Stage::Function { f, deadline, .. } => {
                    self.run_function(
                        f.as_ref(),
                        *deadline,
                        workflow,
                        session_id,
                        &run_id,
                        input,
                        &steps,
                        &mut state,
                        &mut cancel,
                    )
                    .await
                }
            };

            match outcome {
                Ok(StageFlow::Continue(artifact)) => {
                    steps.push(StepRecord {
                        name: stage_name,
                        artifact,
                        started_at_ms: stage_started,
                        ended_at_ms: now_ms(),
                    });
                }
                Ok(StageFlow::Halt(artifact)) => {
                    info!(workflow = %workflow.name, stage = %stage_name, "run halted by gate");
                    steps.push(StepRecord {
                        name: stage_name,
                        artifact,
                        started_at_ms: stage_started,
                        ended_at_ms: now_ms(),
                    });
                    halted = true;
                    break;
                }
                Err(e) => {
                    let tolerant = matches!(stage, Stage::Agent(a) if a.tolerant);
                    if tolerant {
                        warn!(
                            workflow = %workflow.name,
                            stage = %stage_name,
                            error = %e,
                            "tolerant stage failed, continuing with null artifact"
                        );
                        partial = true;
                        steps.push(StepRecord {
                            name: stage_name,
                            artifact: Artifact::Null,
                            started_at_ms: stage_started,
                            ended_at_ms: now_ms(),
                        });
                    } else {
                        error!(
                            workflow = %workflow.name,
                            stage = %stage_name,
                            error = %e,
                            "stage failed, skipping remaining stages"
                        );
                        run_error = Some(format!("{stage_name}: {e}"));
                        break;
                    }
                }
            }
        }

        let status = if run_error.is_some() {
            RunStatus::Failed
        } else if halted {
            RunStatus::Halted
        } else if partial {
            RunStatus::Partial
        } else {
            RunStatus::Ok
        };
        let output = steps.last().map(|s| s.artifact.clone());

        let run = WorkflowRun {
            run_id: run_id.clone(),
            started_at_ms,
            ended_at_ms: now_ms(),
            input: input.to_string(),
            output: output.clone(),
            step_outputs: steps,
            state_snapshot: state.clone(),
            status,
            error: run_error.clone(),
        };
        self.store
            .append_run(&workflow.name, session_id, run, state, now_ms())?;

        info!(
            workflow = %workflow.name,
            run_id = %run_id,
            status = ?status,
            "run persisted"
        );
        Ok(RunOutcome {
            run_id,
            status,
            output,
            error: run_error,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_agent(
        &self,
        agent: &AgentStage,
        workflow: &Workflow,
        session_id: &str,
        run_id: &str,
        input: &str,
        steps: &[StepRecord],
        state: &SessionState,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Artifact, StageError> {
        let ctx = self.context(workflow, session_id, run_id, input, steps, state);
        let work = tokio::time::timeout(agent.deadline, agent.analyst.analyze(&ctx));
        tokio::select! {
            res = work => match res {
                Ok(inner) => inner,
                Err(_) => Err(StageError::DeadlineExceeded),
            },
            _ = cancelled(cancel.clone()) => Err(StageError::Cancelled),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_group(
        &self,
        members: &[AgentStage],
        quorum: QuorumPolicy,
        max_concurrency: usize,
        workflow: &Workflow,
        session_id: &str,
        run_id: &str,
        input: &str,
        steps: &[StepRecord],
        state: &SessionState,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Artifact, StageError> {
        // Members see the state as of the group start and cannot write it;
        // a following function stage merges the group output.
        let ctx = self.context(workflow, session_id, run_id, input, steps, state);
        let semaphore = Semaphore::new(max_concurrency.max(1));

        let futures = members.iter().map(|member| {
            let ctx = &ctx;
            let semaphore = &semaphore;
            let cancel = cancel.clone();
            async move {
                let _permit = semaphore.acquire().await;
                let work = tokio::time::timeout(member.deadline, member.analyst.analyze(ctx));
                let result = tokio::select! {
                    res = work => match res {
                        Ok(inner) => inner,
                        Err(_) => Err(StageError::DeadlineExceeded),
                    },
                    _ = cancelled(cancel) => Err(StageError::Cancelled),
                };
                (member.name.clone(), result)
            }
        });

        let results = futures::future::join_all(futures).await;

        let successes = results.iter().filter(|(_, r)| r.is_ok()).count();
        let required = match quorum {
            QuorumPolicy::All => members.len(),
            QuorumPolicy::AtLeast(n) => n.min(members.len()),
        };
        if successes < required {
            let detail: Vec<String> = results
                .iter()
                .filter_map(|(name, r)| r.as_ref().err().map(|e| format!("{name}: {e}")))
                .collect();
            return Err(StageError::Other(format!(
                "parallel group quorum not met ({successes}/{required}): {}",
                detail.join("; ")
            )));
        }

        let mut map = BTreeMap::new();
        for (name, result) in results {
            map.insert(name, result.unwrap_or(Artifact::Null));
        }
        Ok(Artifact::Group(map))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_function(
        &self,
        f: &dyn FunctionStage,
        deadline: Duration,
        workflow: &Workflow,
        session_id: &str,
        run_id: &str,
        input: &str,
        steps: &[StepRecord],
        state: &mut SessionState,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<StageFlow, StageError> {
        if *cancel.borrow() {
            return Err(StageError::Cancelled);
        }
        let snapshot = state.clone();
        let ctx = self.context(workflow, session_id, run_id, input, steps, &snapshot);
        match tokio::time::timeout(deadline, f.execute(&ctx, state)).await {
            Ok(inner) => inner,
            Err(_) => Err(StageError::DeadlineExceeded),
        }
    }

    fn context<'a>(
        &'a self,
        workflow: &'a Workflow,
        session_id: &'a str,
        run_id: &'a str,
        input: &'a str,
        steps: &'a [StepRecord],
        state: &'a SessionState,
    ) -> StageContext<'a> {
        StageContext {
            workflow: &workflow.name,
            session_id,
            run_id,
            input,
            previous: steps.last().map(|s| &s.artifact),
            state,
            ports: &self.ports,
            now_ms: now_ms(),
            steps,
            store: &self.store,
        }
    }

    /// Default history depth for consumers building inputs.
    pub fn history_depth(&self) -> usize {
        self.config.history_depth
    }
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without signalling: never cancel.
            std::future::pending::<()>().await;
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
