//! Workflow runtime.
//!
//! A workflow is a named ordered sequence of stages running over a shared
//! session state. Agent stages call pluggable analysts, parallel groups fan
//! agent stages out concurrently, and function stages run deterministic
//! code that may gate or aggregate. Every run is persisted to the session
//! store together with the resulting state.

mod analyst;
mod context;
mod error;
mod runtime;
mod stage;

pub use analyst::{Analyst, SharedAnalyst};
pub use context::{Ports, StageContext};
pub use error::{RunError, StageError};
pub use runtime::{RunOutcome, RuntimeConfig, Workflow, WorkflowRuntime};
pub use stage::{AgentStage, FunctionStage, QuorumPolicy, Stage, StageFlow};
