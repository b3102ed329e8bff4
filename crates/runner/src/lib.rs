//! Orchestrator wiring: configuration, analysts, the five workflow
//! definitions, the scheduler dispatcher and the read model the API layer
//! queries.

pub mod analysts;
pub mod config;
pub mod dispatch;
pub mod paper;
pub mod read_model;
pub mod stages;
pub mod workflows;

pub use config::AppConfig;
pub use dispatch::RunDispatcher;
pub use workflows::{build_workflows, WorkflowSet};
