//! Combination generation: enumerate every passenger subset of each new
//! candidate group whose size fits the fleet capacity range, and persist the
//! subsets as pending proposals.
//!
//! Enumeration is exponential in group size (sum of C(n,k) for k in
//! [min, max]); `max_group_size` caps the members considered, and the surplus
//! is recovered by the dispatcher's leftover pass.

use crate::domain::{DomainError, GroupState};
use crate::ports::StorePort;
use std::sync::Arc;
use tracing::{info, warn};

/// Generation service. Consumes groups in state `new`.
pub struct CombinationGenerator {
    store: Arc<dyn StorePort>,
    max_group_size: usize,
}

/// Result of one generation pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenerateStats {
    pub groups_processed: usize,
    pub proposals_generated: usize,
}

impl CombinationGenerator {
    pub fn new(store: Arc<dyn StorePort>, max_group_size: usize) -> Self {
        Self {
            store,
            max_group_size,
        }
    }

    /// Process every group in state `new`. A group always advances to
    /// `combinations_generated`, even when it yields zero proposals, so it is
    /// never reprocessed.
    pub async fn generate(&self) -> Result<GenerateStats, DomainError> {
        let groups = self.store.groups_in_state(GroupState::New).await?;
        if groups.is_empty() {
            info!("no new groups; skipping combination generation");
            return Ok(GenerateStats::default());
        }

        let capacities = self.store.available_capacities().await?;
        let (Some(min), Some(max)) = (
            capacities.iter().min().copied(),
            capacities.iter().max().copied(),
        ) else {
            info!("no available drivers; skipping combination generation");
            return Ok(GenerateStats::default());
        };

        let mut stats = GenerateStats::default();
        for group in groups {
            let mut members = self.store.group_member_ids(group.id).await?;
            members.sort_unstable(); // oldest first: ids are monotonic

            if members.len() > self.max_group_size {
                warn!(
                    group_id = group.id,
                    members = members.len(),
                    cap = self.max_group_size,
                    "group exceeds enumeration cap; truncating to oldest members"
                );
                members.truncate(self.max_group_size);
            }

            let subsets = subsets_in_range(&members, min as usize, max as usize);
            let inserted = if subsets.is_empty() {
                0
            } else {
                self.store.insert_proposals(group.id, &subsets).await?
            };

            self.store
                .set_group_state(group.id, GroupState::CombinationsGenerated)
                .await?;

            info!(
                group_id = group.id,
                proposals = inserted,
                "combinations generated"
            );
            stats.groups_processed += 1;
            stats.proposals_generated += inserted;
        }

        Ok(stats)
    }
}

/// All subsets of `ids` with size in [min, max], order-insensitive, no
/// repetition. Backtracking enumeration; total count is sum of C(n,k).
fn subsets_in_range(ids: &[i64], min: usize, max: usize) -> Vec<Vec<i64>> {
    let mut out = Vec::new();
    let mut combo = Vec::new();
    for k in min.max(1)..=max {
        if k > ids.len() {
            break;
        }
        backtrack(ids, 0, k, &mut combo, &mut out);
    }
    out
}

fn backtrack(ids: &[i64], start: usize, size: usize, combo: &mut Vec<i64>, out: &mut Vec<Vec<i64>>) {
    if combo.len() == size {
        out.push(combo.clone());
        return;
    }
    for i in start..ids.len() {
        combo.push(ids[i]);
        backtrack(ids, i + 1, size, combo, out);
        combo.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::MemoryStore;
    use crate::domain::Coordinates;

    async fn seed_group(store: &MemoryStore, n: usize) -> i64 {
        let point = store.add_point(Coordinates::new(4.60, -74.08), "north");
        let ids: Vec<i64> = (0..n)
            .map(|i| {
                store.add_request(
                    Coordinates::new(4.60, -74.08),
                    Coordinates::new(4.62 + i as f64 * 0.01, -74.08),
                    Some(point),
                    None,
                )
            })
            .collect();
        store.create_group(point, true, &ids).await.unwrap()
    }

    #[test]
    fn subset_counts_match_binomials() {
        let ids: Vec<i64> = (1..=5).collect();
        // C(5,3) + C(5,4) = 10 + 5
        assert_eq!(subsets_in_range(&ids, 3, 4).len(), 15);
        // C(5,3) + C(5,4) + C(5,5) = 16
        assert_eq!(subsets_in_range(&ids, 3, 5).len(), 16);
        // min > n yields nothing
        assert!(subsets_in_range(&ids, 6, 8).is_empty());
    }

    #[test]
    fn subsets_are_distinct_and_sized() {
        let ids: Vec<i64> = (1..=5).collect();
        let subsets = subsets_in_range(&ids, 3, 4);
        for s in &subsets {
            assert!(s.len() == 3 || s.len() == 4);
        }
        let unique: std::collections::HashSet<Vec<i64>> = subsets.iter().cloned().collect();
        assert_eq!(unique.len(), subsets.len());
    }

    #[tokio::test]
    async fn five_members_with_bounds_three_four_yield_fifteen_proposals() {
        let store = MemoryStore::new();
        store.add_driver(3);
        store.add_driver(4);
        let group_id = seed_group(&store, 5).await;

        let stats = CombinationGenerator::new(Arc::new(store.clone()), 16)
            .generate()
            .await
            .unwrap();

        assert_eq!(stats.proposals_generated, 15);
        assert_eq!(store.pending_proposals(group_id).await.unwrap().len(), 15);
        assert_eq!(
            store.group(group_id).unwrap().state,
            GroupState::CombinationsGenerated
        );
    }

    #[tokio::test]
    async fn undersized_group_advances_with_zero_proposals() {
        let store = MemoryStore::new();
        let group_id = seed_group(&store, 2).await;
        // Drivers arrive after the group was formed; minimum seats 4.
        store.add_driver(4);

        let stats = CombinationGenerator::new(Arc::new(store.clone()), 16)
            .generate()
            .await
            .unwrap();

        assert_eq!(stats.groups_processed, 1);
        assert_eq!(stats.proposals_generated, 0);
        assert_eq!(
            store.group(group_id).unwrap().state,
            GroupState::CombinationsGenerated
        );
    }

    #[tokio::test]
    async fn oversized_group_is_capped_to_oldest_members() {
        let store = MemoryStore::new();
        store.add_driver(3);
        let group_id = seed_group(&store, 5).await;

        let stats = CombinationGenerator::new(Arc::new(store.clone()), 3)
            .generate()
            .await
            .unwrap();

        // Only C(3,3) = 1 proposal over the three oldest members.
        assert_eq!(stats.proposals_generated, 1);
        let proposals = store.pending_proposals(group_id).await.unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].passenger_count, 3);
    }

    #[tokio::test]
    async fn no_new_groups_is_a_noop() {
        let store = MemoryStore::new();
        store.add_driver(3);
        let stats = CombinationGenerator::new(Arc::new(store), 16)
            .generate()
            .await
            .unwrap();
        assert_eq!(stats.groups_processed, 0);
    }
}
