//! Pipeline orchestration: Aggregator -> Generator -> Dispatcher, each stage
//! committing before the next reads.
//!
//! A process-wide run guard serializes overlapping invocations (periodic
//! timer vs. on-demand trigger): the second invocation backs off with a
//! skipped summary instead of racing on the same groups.

use crate::domain::{DomainError, GroupState};
use crate::ports::{RunSummary, StorePort, TriggerPort};
use crate::usecases::{CombinationGenerator, RequestAggregator, TripDispatcher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Pipeline service. Owns the three stages and the run guard.
pub struct PipelineService {
    store: Arc<dyn StorePort>,
    aggregator: RequestAggregator,
    generator: CombinationGenerator,
    dispatcher: TripDispatcher,
    run_guard: Mutex<()>,
}

impl PipelineService {
    pub fn new(
        store: Arc<dyn StorePort>,
        aggregator: RequestAggregator,
        generator: CombinationGenerator,
        dispatcher: TripDispatcher,
    ) -> Self {
        Self {
            store,
            aggregator,
            generator,
            dispatcher,
            run_guard: Mutex::new(()),
        }
    }

    /// Run one batch. Generation and optimization only run when a group in
    /// state `new` exists (freshly formed or left over from a failed run).
    pub async fn run(&self) -> Result<RunSummary, DomainError> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            warn!("pipeline run already in progress; skipping this invocation");
            return Ok(RunSummary::skipped());
        };

        let mut summary = RunSummary::default();

        let agg = self.aggregator.aggregate().await?;
        summary.groups_formed = agg.groups_formed;

        let has_new_groups = !self.store.groups_in_state(GroupState::New).await?.is_empty();
        if has_new_groups {
            let generated = self.generator.generate().await?;
            summary.proposals_generated = generated.proposals_generated;

            let opt = self.dispatcher.optimize().await?;
            summary.offers_created = opt.offers_created;
            summary.requests_reset = opt.requests_reset;
        }

        info!(
            groups = summary.groups_formed,
            proposals = summary.proposals_generated,
            offers = summary.offers_created,
            reset = summary.requests_reset,
            "pipeline run complete"
        );
        Ok(summary)
    }
}

#[async_trait::async_trait]
impl TriggerPort for PipelineService {
    async fn run_pipeline(&self) -> Result<RunSummary, DomainError> {
        self.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::MemoryStore;
    use crate::domain::Coordinates;
    use crate::usecases::DispatchConfig;

    fn pipeline(store: &MemoryStore) -> PipelineService {
        let arc: Arc<dyn StorePort> = Arc::new(store.clone());
        PipelineService::new(
            Arc::clone(&arc),
            RequestAggregator::new(Arc::clone(&arc)),
            CombinationGenerator::new(Arc::clone(&arc), 16),
            TripDispatcher::new(Arc::clone(&arc), DispatchConfig::default()),
        )
    }

    #[tokio::test]
    async fn empty_store_yields_a_zero_summary() {
        let store = MemoryStore::new();
        let summary = pipeline(&store).run().await.unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn full_run_forms_groups_and_creates_offers() {
        let store = MemoryStore::new();
        store.add_driver(3);
        store.add_driver(4);
        let point = store.add_point(Coordinates::new(4.60, -74.08), "north");
        for i in 0..5 {
            store.add_request(
                Coordinates::new(4.60, -74.08),
                Coordinates::new(4.605 + i as f64 * 0.004, -74.08),
                Some(point),
                None,
            );
        }

        let summary = pipeline(&store).run().await.unwrap();

        assert_eq!(summary.groups_formed, 1);
        assert_eq!(summary.proposals_generated, 15);
        assert_eq!(summary.offers_created, 1);
        assert_eq!(summary.requests_reset, 1);
        assert!(!summary.skipped);
    }

    #[tokio::test]
    async fn second_run_without_new_work_is_a_noop() {
        let store = MemoryStore::new();
        store.add_driver(4);
        let point = store.add_point(Coordinates::new(4.60, -74.08), "north");
        for i in 0..4 {
            store.add_request(
                Coordinates::new(4.60, -74.08),
                Coordinates::new(4.605 + i as f64 * 0.004, -74.08),
                Some(point),
                None,
            );
        }

        let p = pipeline(&store);
        let first = p.run().await.unwrap();
        assert_eq!(first.offers_created, 1);

        let second = p.run().await.unwrap();
        assert_eq!(second.groups_formed, 0);
        assert_eq!(second.offers_created, 0);
    }
}
