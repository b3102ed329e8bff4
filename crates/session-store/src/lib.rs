//! Durable per-workflow-per-session-id run store.
//!
//! One JSON document per (workflow_name, session_id) holding the ordered
//! run list and the latest session state. Appends are atomic: write to a
//! temp file, fsync, rename. A crash mid-run leaves the previous document
//! intact, and a reload reproduces the session state byte-for-byte.

mod store;
mod types;

pub use store::SessionStore;
pub use types::{RunStatus, StepRecord, StoreError, WorkflowRun, WorkflowSession};
