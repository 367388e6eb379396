//! Request aggregation: bucket pending requests by (concentration point,
//! direction) and persist candidate groups that clear the fleet minimum.
//!
//! A request whose origin and destination are both concentration points
//! qualifies for two buckets, but the first group actually created consumes
//! it; later buckets re-filter to still-pending members so a request never
//! joins two active groups.

use crate::domain::DomainError;
use crate::ports::StorePort;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Aggregation service. Reads fleet bounds and pending requests, writes
/// candidate groups.
pub struct RequestAggregator {
    store: Arc<dyn StorePort>,
}

/// Result of one aggregation pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregateStats {
    pub groups_formed: usize,
    pub requests_grouped: usize,
}

impl RequestAggregator {
    pub fn new(store: Arc<dyn StorePort>) -> Self {
        Self { store }
    }

    /// Run one aggregation pass. No available drivers or no pending requests
    /// is a logged no-op, not an error.
    pub async fn aggregate(&self) -> Result<AggregateStats, DomainError> {
        let capacities = self.store.available_capacities().await?;
        let Some(min_capacity) = capacities.iter().min().copied() else {
            info!("no available drivers; skipping aggregation");
            return Ok(AggregateStats::default());
        };

        let pending = self.store.pending_requests().await?;
        if pending.is_empty() {
            info!("no pending requests; skipping aggregation");
            return Ok(AggregateStats::default());
        }

        // Buckets keyed by (point id, point-is-origin); BTreeMap keeps the
        // creation order deterministic across runs.
        let mut buckets: BTreeMap<(i64, bool), Vec<i64>> = BTreeMap::new();
        for req in &pending {
            if let Some(point_id) = req.origin_point_id {
                buckets.entry((point_id, true)).or_default().push(req.id);
            }
            if let Some(point_id) = req.destination_point_id {
                buckets.entry((point_id, false)).or_default().push(req.id);
            }
        }

        let mut stats = AggregateStats::default();
        let mut consumed: HashSet<i64> = HashSet::new();

        for ((point_id, point_is_origin), members) in buckets {
            let free: Vec<i64> = members
                .into_iter()
                .filter(|id| !consumed.contains(id))
                .collect();

            if (free.len() as u32) < min_capacity {
                debug!(
                    point_id,
                    point_is_origin,
                    size = free.len(),
                    min_capacity,
                    "bucket below fleet minimum; requests stay pending"
                );
                continue;
            }

            let group_id = self
                .store
                .create_group(point_id, point_is_origin, &free)
                .await?;
            info!(
                group_id,
                point_id,
                point_is_origin,
                members = free.len(),
                "candidate group created"
            );
            stats.groups_formed += 1;
            stats.requests_grouped += free.len();
            consumed.extend(free);
        }

        info!(
            groups = stats.groups_formed,
            requests = stats.requests_grouped,
            "aggregation complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::MemoryStore;
    use crate::domain::{Coordinates, GroupState, RequestState};

    fn coords(lat: f64) -> Coordinates {
        Coordinates::new(lat, -74.08)
    }

    fn seed_point_origin_requests(store: &MemoryStore, point_id: i64, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                store.add_request(
                    coords(4.60),
                    coords(4.62 + i as f64 * 0.01),
                    Some(point_id),
                    None,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn no_drivers_is_a_noop() {
        let store = MemoryStore::new();
        let point = store.add_point(coords(4.60), "north");
        let ids = seed_point_origin_requests(&store, point, 4);

        let stats = RequestAggregator::new(Arc::new(store.clone()))
            .aggregate()
            .await
            .unwrap();

        assert_eq!(stats.groups_formed, 0);
        for id in ids {
            assert_eq!(store.request(id).unwrap().state, RequestState::Pending);
        }
    }

    #[tokio::test]
    async fn bucket_below_minimum_stays_pending() {
        let store = MemoryStore::new();
        store.add_driver(4);
        let point = store.add_point(coords(4.60), "north");
        let ids = seed_point_origin_requests(&store, point, 3);

        let stats = RequestAggregator::new(Arc::new(store.clone()))
            .aggregate()
            .await
            .unwrap();

        assert_eq!(stats.groups_formed, 0);
        for id in ids {
            assert_eq!(store.request(id).unwrap().state, RequestState::Pending);
        }
    }

    #[tokio::test]
    async fn qualifying_bucket_becomes_a_new_group() {
        let store = MemoryStore::new();
        store.add_driver(3);
        store.add_driver(4);
        let point = store.add_point(coords(4.60), "north");
        let ids = seed_point_origin_requests(&store, point, 4);

        let agg = RequestAggregator::new(Arc::new(store.clone()));
        let stats = agg.aggregate().await.unwrap();

        assert_eq!(stats.groups_formed, 1);
        assert_eq!(stats.requests_grouped, 4);
        let groups = store.groups_in_state(GroupState::New).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].point_is_origin);
        for id in ids {
            assert_eq!(store.request(id).unwrap().state, RequestState::Grouped);
        }
    }

    #[tokio::test]
    async fn requests_split_into_per_point_and_direction_buckets() {
        let store = MemoryStore::new();
        store.add_driver(3);
        let north = store.add_point(coords(4.60), "north");
        let south = store.add_point(coords(4.50), "south");
        seed_point_origin_requests(&store, north, 3);
        // Destination-anchored bucket at the other point.
        for i in 0..3 {
            store.add_request(coords(4.55 + i as f64 * 0.01), coords(4.50), None, Some(south));
        }

        let stats = RequestAggregator::new(Arc::new(store.clone()))
            .aggregate()
            .await
            .unwrap();

        assert_eq!(stats.groups_formed, 2);
        let groups = store.groups_in_state(GroupState::New).await.unwrap();
        let directions: Vec<bool> = groups.iter().map(|g| g.point_is_origin).collect();
        assert!(directions.contains(&true) && directions.contains(&false));
    }

    #[tokio::test]
    async fn request_with_two_point_endpoints_joins_only_one_group() {
        let store = MemoryStore::new();
        store.add_driver(3);
        let north = store.add_point(coords(4.60), "north");
        let south = store.add_point(coords(4.50), "south");

        // Bridges both buckets: origin at south, destination at north.
        let bridge = store.add_request(coords(4.50), coords(4.60), Some(south), Some(north));
        // Two more for each bucket so both reach the minimum of 3.
        for i in 0..2 {
            store.add_request(coords(4.50), coords(4.62 + i as f64 * 0.01), Some(south), None);
            store.add_request(coords(4.55 + i as f64 * 0.01), coords(4.60), None, Some(north));
        }

        let stats = RequestAggregator::new(Arc::new(store.clone()))
            .aggregate()
            .await
            .unwrap();

        // The bridge request is consumed by the first bucket created; the
        // other bucket drops to 2 members and stays below the minimum.
        assert_eq!(stats.groups_formed, 1);
        assert_eq!(store.request(bridge).unwrap().state, RequestState::Grouped);
        let groups = store.groups_in_state(GroupState::New).await.unwrap();
        let members = store.group_member_ids(groups[0].id).await.unwrap();
        assert_eq!(members.iter().filter(|&&id| id == bridge).count(), 1);
    }
}
