//! Stage forms.

use crate::{SharedAnalyst, StageContext, StageError};
use async_trait::async_trait;
use model::{Artifact, SessionState};
use std::sync::Arc;
use std::time::Duration;

/// Default per-stage deadline.
pub(crate) const DEFAULT_STAGE_DEADLINE: Duration = Duration::from_secs(120);

/// Control flow returned by function stages.
#[derive(Debug)]
pub enum StageFlow {
    /// Record the artifact and continue with the next stage.
    Continue(Artifact),
    /// Record the artifact and short-circuit the remaining stages. The run
    /// terminates with `Halted`, which is a success, not a failure.
    Halt(Artifact),
}

/// Deterministic code run as a stage: gating, aggregation, persistence.
///
/// Function stages are the only stages allowed to mutate the shared
/// session state.
#[async_trait]
pub trait FunctionStage: Send + Sync {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError>;
}

/// Success policy for a parallel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumPolicy {
    /// Every member must succeed (strict).
    All,
    /// At least this many members must succeed; the rest record `Null`.
    AtLeast(usize),
}

/// One agent invocation.
#[derive(Clone)]
pub struct AgentStage {
    pub name: String,
    pub analyst: SharedAnalyst,
    /// A tolerant stage that fails records `Null` and lets the run
    /// continue with status `Partial`.
    pub tolerant: bool,
    pub deadline: Duration,
}

impl AgentStage {
    /// Agent stage with the default deadline.
    pub fn new(name: impl Into<String>, analyst: SharedAnalyst) -> Self {
        Self {
            name: name.into(),
            analyst,
            tolerant: false,
            deadline: DEFAULT_STAGE_DEADLINE,
        }
    }

    /// Mark the stage tolerant.
    pub fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }

    /// Override the stage deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// A stage in a workflow.
pub enum Stage {
    /// Single analyst invocation.
    Agent(AgentStage),
    /// Concurrent agent stages; output is a map member name -> artifact.
    /// Members get a read-only state snapshot and no cross-member
    /// visibility until the group closes.
    Parallel {
        name: String,
        members: Vec<AgentStage>,
        quorum: QuorumPolicy,
        /// Fan-out cap; defaults to the group size.
        max_concurrency: usize,
    },
    /// Deterministic function stage.
    Function {
        name: String,
        f: Arc<dyn FunctionStage>,
        deadline: Duration,
    },
}

impl Stage {
    /// Declared stage name.
    pub fn name(&self) -> &str {
        match self {
            Self::Agent(a) => &a.name,
            Self::Parallel { name, .. } => name,
            Self::Function { name, .. } => name,
        }
    }
}

/// Adapter so plain async closures can serve as function stages.
pub(crate) struct FnStage<F>(pub F);

#[async_trait]
impl<F> FunctionStage for FnStage<F>
where
    F: Fn(&StageContext<'_>, &mut SessionState) -> Result<StageFlow, StageError> + Send + Sync,
{
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        (self.0)(ctx, state)
    }
}
