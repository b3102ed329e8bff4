//! Per-stage invocation context.

use crate::StageError;
use broker_core::SharedBroker;
use market_data::SharedMarketData;
use model::{Artifact, SessionState};
use session_store::{SessionStore, StepRecord, WorkflowSession};
use std::sync::Arc;

/// Port handles available to every stage.
#[derive(Clone)]
pub struct Ports {
    pub broker: SharedBroker,
    pub market: SharedMarketData,
}

/// Everything a stage may read during its invocation.
///
/// The state field is a snapshot taken at the stage boundary; mutations by
/// earlier stages in the same run are already visible, and function stages
/// receive the live state separately.
pub struct StageContext<'a> {
    /// Workflow name.
    pub workflow: &'a str,
    /// Session (trading date) the run belongs to.
    pub session_id: &'a str,
    /// Current run id.
    pub run_id: &'a str,
    /// Workflow input record.
    pub input: &'a str,
    /// The immediately prior stage's output, if any stage ran yet.
    pub previous: Option<&'a Artifact>,
    /// Read view of the shared session state.
    pub state: &'a SessionState,
    /// Broker and market-data ports.
    pub ports: &'a Ports,
    /// Wall-clock at stage start (ms).
    pub now_ms: i64,
    pub(crate) steps: &'a [StepRecord],
    pub(crate) store: &'a Arc<SessionStore>,
}

impl<'a> StageContext<'a> {
    /// Any prior named stage's output. Top-level stage names win over
    /// parallel-group member names.
    pub fn step_content(&self, name: &str) -> Option<&Artifact> {
        if let Some(found) = self.steps.iter().find(|s| s.name == name) {
            return Some(&found.artifact);
        }
        // Fall back to group members, in declared order.
        self.steps.iter().find_map(|s| match &s.artifact {
            Artifact::Group(members) => members.get(name),
            _ => None,
        })
    }

    /// Last `n` committed runs of this workflow as (input, output) pairs in
    /// chronological order. The in-progress run is not included.
    pub fn workflow_history(
        &self,
        n: usize,
    ) -> Result<Vec<(String, Option<Artifact>)>, StageError> {
        let runs = self.store.last_runs(self.workflow, n)?;
        Ok(runs.into_iter().map(|r| (r.input, r.output)).collect())
    }

    /// Last `n` committed runs of another workflow, in chronological
    /// order. The post-trade analyst uses this to score the analysis
    /// workflow's past inputs and outputs.
    pub fn history_of(
        &self,
        workflow: &str,
        n: usize,
    ) -> Result<Vec<(String, Option<Artifact>)>, StageError> {
        let runs = self.store.last_runs(workflow, n)?;
        Ok(runs.into_iter().map(|r| (r.input, r.output)).collect())
    }

    /// Read-only handle on another workflow's session for the same (or any)
    /// trading date. Only committed state is visible.
    pub fn cross_session(
        &self,
        workflow: &str,
        session_id: &str,
    ) -> Result<Option<WorkflowSession>, StageError> {
        Ok(self.store.get_session(workflow, session_id)?)
    }

    /// Committed session state of another workflow at this trading date,
    /// empty when that workflow has not run yet.
    pub fn cross_state(&self, workflow: &str) -> Result<SessionState, StageError> {
        Ok(self.store.session_state(workflow, self.session_id)?)
    }
}
