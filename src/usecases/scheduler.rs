//! Periodic trigger: an explicitly owned, cancellable background task that
//! runs the pipeline at a fixed cadence.
//!
//! Shutdown is a watch-channel signal; it takes effect between runs (a run in
//! flight completes or fails as a whole, never mid-group).

use crate::ports::TriggerPort;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Handle to the running scheduler. Stopping consumes it.
pub struct Scheduler {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    /// Spawn the periodic loop. The first run happens after one full
    /// interval, not at start.
    pub fn start(pipeline: Arc<dyn TriggerPort>, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "scheduler started");
            loop {
                tokio::select! {
                    _ = rx.changed() => {
                        info!("scheduler shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        match pipeline.run_pipeline().await {
                            Ok(summary) => info!(
                                groups = summary.groups_formed,
                                proposals = summary.proposals_generated,
                                offers = summary.offers_created,
                                skipped = summary.skipped,
                                "scheduled pipeline run finished"
                            ),
                            Err(e) => error!(error = %e, "scheduled pipeline run failed"),
                        }
                    }
                }
            }
        });
        Self { handle, shutdown }
    }

    /// Signal shutdown and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::ports::RunSummary;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTrigger {
        runs: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TriggerPort for CountingTrigger {
        async fn run_pipeline(&self) -> Result<RunSummary, DomainError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(RunSummary::default())
        }
    }

    #[tokio::test]
    async fn runs_periodically_until_stopped() {
        let trigger = Arc::new(CountingTrigger {
            runs: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::start(Arc::clone(&trigger) as _, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.stop().await;
        let runs = trigger.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected at least two runs, got {runs}");

        // No further runs after stop.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(trigger.runs.load(Ordering::SeqCst), runs);
    }
}
