//! The analyst port.

use crate::{StageContext, StageError};
use async_trait::async_trait;
use model::Artifact;
use std::sync::Arc;

/// An external analyst invoked by an agent stage.
///
/// The reasoning body is pluggable (rule-based, remote model, replay); the
/// runtime only depends on the typed artifact coming back. Analysts read
/// the stage context (input, prior outputs, session state, history, ports)
/// and must never mutate shared state directly.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Stable analyst identifier, used for attribution.
    fn id(&self) -> &str;

    /// Produce this stage's artifact.
    async fn analyze(&self, ctx: &StageContext<'_>) -> Result<Artifact, StageError>;
}

/// Shared analyst handle.
pub type SharedAnalyst = Arc<dyn Analyst>;
