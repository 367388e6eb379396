//! Inbound port. Trigger surface (timer or on-demand) calls into the application.

use crate::domain::DomainError;
use serde::Serialize;

/// Zero-effect summaries are normal: no drivers or no pending requests is a
/// no-op run, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub groups_formed: usize,
    pub proposals_generated: usize,
    pub offers_created: usize,
    /// Requests returned to the intake pool by the dispatcher's leftover pass.
    pub requests_reset: usize,
    /// True when an overlapping invocation held the run guard and this one
    /// backed off without touching the store.
    pub skipped: bool,
}

impl RunSummary {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Trigger port: runs one Aggregator -> Generator -> Dispatcher batch.
#[async_trait::async_trait]
pub trait TriggerPort: Send + Sync {
    async fn run_pipeline(&self) -> Result<RunSummary, DomainError>;
}
