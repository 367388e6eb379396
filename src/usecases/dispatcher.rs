//! Trip optimization and dispatch: evaluate every pending proposal of a
//! group, iteratively select the best viable non-overlapping one, and
//! materialize it as a trip offer.
//!
//! Each group runs inside one store transaction. A failure rolls back that
//! group only; previously committed groups are untouched and the run
//! continues with the next group.

use crate::domain::routing::{plan_route, RoutePlan};
use crate::domain::{
    estimator, CandidateGroup, ConcentrationPoint, DomainError, GroupState, ProposalState,
    RequestState, TripRequest,
};
use crate::ports::{NewAssignment, NewTripOffer, StorePort, StoreTx};
use crate::shared::config::{
    DispatchStrategy, DEFAULT_MAX_DISTANCE_KM, DEFAULT_MAX_DURATION_MIN, DEFAULT_MIN_PASSENGERS,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Viability thresholds and dispatch strategy.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub max_distance_km: f64,
    pub max_duration_min: u32,
    pub min_passengers: u32,
    pub strategy: DispatchStrategy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            max_duration_min: DEFAULT_MAX_DURATION_MIN,
            min_passengers: DEFAULT_MIN_PASSENGERS,
            strategy: DispatchStrategy::default(),
        }
    }
}

/// Result of one optimization pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizeStats {
    pub groups_processed: usize,
    pub groups_failed: usize,
    pub offers_created: usize,
    pub requests_reset: usize,
}

/// Dispatch service. Consumes pending proposals, produces trip offers.
pub struct TripDispatcher {
    store: Arc<dyn StorePort>,
    config: DispatchConfig,
}

/// One proposal scored against the group's concentration point.
struct EvaluatedProposal {
    id: i64,
    passenger_count: u32,
    member_ids: Vec<i64>,
    plan: RoutePlan,
    duration_min: u32,
    /// (request id, fare) per passenger, from each request's direct distance.
    fares: Vec<(i64, i64)>,
    revenue: i64,
    viable: bool,
}

impl TripDispatcher {
    pub fn new(store: Arc<dyn StorePort>, config: DispatchConfig) -> Self {
        Self { store, config }
    }

    /// Process every group that has at least one pending proposal. Failures
    /// are isolated per group.
    pub async fn optimize(&self) -> Result<OptimizeStats, DomainError> {
        let groups = self.store.groups_with_pending_proposals().await?;
        if groups.is_empty() {
            info!("no groups with pending proposals; skipping optimization");
            return Ok(OptimizeStats::default());
        }

        let mut stats = OptimizeStats::default();
        for group in groups {
            match self.process_group(&group).await {
                Ok((offers, resets)) => {
                    stats.groups_processed += 1;
                    stats.offers_created += offers;
                    stats.requests_reset += resets;
                    info!(
                        group_id = group.id,
                        offers, resets, "group optimization committed"
                    );
                }
                Err(e) => {
                    stats.groups_failed += 1;
                    error!(group_id = group.id, error = %e, "group optimization failed; rolled back");
                    if let Err(mark_err) =
                        self.store.mark_pending_proposals_error(group.id).await
                    {
                        error!(group_id = group.id, error = %mark_err, "failed to flag proposals as error");
                    }
                    if let Err(state_err) =
                        self.store.set_group_state(group.id, GroupState::Error).await
                    {
                        error!(group_id = group.id, error = %state_err, "failed to flag group as error");
                    }
                }
            }
        }

        Ok(stats)
    }

    /// One group, one transaction. Returns (offers created, requests reset).
    async fn process_group(&self, group: &CandidateGroup) -> Result<(usize, usize), DomainError> {
        // Driver availability is dynamic: re-read the fleet minimum per group.
        let capacities = self.store.available_capacities().await?;
        let min_capacity = capacities
            .iter()
            .min()
            .copied()
            .unwrap_or(self.config.min_passengers);

        let point = self
            .store
            .concentration_point(group.point_id)
            .await?
            .ok_or(DomainError::PointNotFound(group.point_id))?;

        let proposals = self.store.pending_proposals(group.id).await?;
        if proposals.is_empty() {
            return Ok((0, 0));
        }

        self.store
            .set_group_state(group.id, GroupState::Optimizing)
            .await?;

        let mut proposal_members: HashMap<i64, Vec<i64>> = HashMap::new();
        for p in &proposals {
            proposal_members.insert(p.id, self.store.proposal_member_ids(p.id).await?);
        }

        let member_ids = self.store.group_member_ids(group.id).await?;
        let requests: HashMap<i64, TripRequest> = self
            .store
            .requests_by_ids(&member_ids)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let mut tx = self.store.begin_group_tx().await?;
        let result = self
            .dispatch_group(
                &mut tx,
                group,
                &point,
                min_capacity,
                &proposals,
                &proposal_members,
                &member_ids,
                &requests,
            )
            .await;

        match result {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(group_id = group.id, error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_group(
        &self,
        tx: &mut Box<dyn StoreTx>,
        group: &CandidateGroup,
        point: &ConcentrationPoint,
        min_capacity: u32,
        proposals: &[crate::domain::CombinationProposal],
        proposal_members: &HashMap<i64, Vec<i64>>,
        member_ids: &[i64],
        requests: &HashMap<i64, TripRequest>,
    ) -> Result<(usize, usize), DomainError> {
        // Requests already offered by an earlier run count as taken from the
        // start; new selections must stay disjoint from them too.
        let mut assigned: HashSet<i64> = requests
            .values()
            .filter(|r| r.state == RequestState::Offered)
            .map(|r| r.id)
            .collect();
        let mut selected: HashSet<i64> = HashSet::new();
        let mut offers_created = 0usize;

        loop {
            let eligible: Vec<&crate::domain::CombinationProposal> = proposals
                .iter()
                .filter(|p| !selected.contains(&p.id))
                .filter(|p| {
                    proposal_members
                        .get(&p.id)
                        .is_some_and(|m| m.iter().all(|id| !assigned.contains(id)))
                })
                .collect();
            if eligible.is_empty() {
                break;
            }

            let mut viable = Vec::new();
            for p in eligible {
                let members = &proposal_members[&p.id];
                let evaluated = self.evaluate(p, members, point, group.point_is_origin, requests)?;
                if evaluated.viable {
                    viable.push(evaluated);
                }
            }
            if viable.is_empty() {
                break;
            }

            let best = select_optimal(viable);
            self.materialize(tx, group, &best).await?;
            offers_created += 1;

            assigned.extend(best.member_ids.iter().copied());
            selected.insert(best.id);

            if self.config.strategy == DispatchStrategy::SingleOffer {
                break;
            }

            let remaining = member_ids.iter().filter(|id| !assigned.contains(id)).count();
            if (remaining as u32) < min_capacity {
                break;
            }
        }

        // Leftovers go back to the intake pool for the next aggregation run.
        let leftovers: Vec<i64> = member_ids
            .iter()
            .filter(|id| !assigned.contains(id))
            .copied()
            .collect();
        if !leftovers.is_empty() {
            tx.set_request_states(&leftovers, RequestState::Pending).await?;
        }

        let untouched: Vec<i64> = proposals
            .iter()
            .filter(|p| !selected.contains(&p.id))
            .map(|p| p.id)
            .collect();
        if !untouched.is_empty() {
            tx.set_proposal_states(&untouched, ProposalState::Discarded).await?;
        }

        tx.set_group_state(group.id, GroupState::Done).await?;

        Ok((offers_created, leftovers.len()))
    }

    fn evaluate(
        &self,
        proposal: &crate::domain::CombinationProposal,
        member_ids: &[i64],
        point: &ConcentrationPoint,
        point_is_origin: bool,
        requests: &HashMap<i64, TripRequest>,
    ) -> Result<EvaluatedProposal, DomainError> {
        let members: Vec<TripRequest> = member_ids
            .iter()
            .map(|id| {
                requests
                    .get(id)
                    .cloned()
                    .ok_or_else(|| DomainError::Store(format!("request {id} missing from group")))
            })
            .collect::<Result<_, _>>()?;

        let plan = plan_route(point, point_is_origin, &members);
        let duration_min = estimator::route_duration_min(plan.distance_km);

        // Fares use each passenger's own direct distance, not the shared
        // route; the driver's take excludes the platform commission.
        let fares: Vec<(i64, i64)> = members
            .iter()
            .map(|r| {
                let direct = estimator::haversine_km(r.origin, r.destination);
                (r.id, estimator::fare(direct, proposal.passenger_count).shared_fare)
            })
            .collect();
        let revenue = fares.iter().map(|(_, f)| f).sum();

        let viable = plan.distance_km <= self.config.max_distance_km
            && duration_min <= self.config.max_duration_min
            && proposal.passenger_count >= self.config.min_passengers;

        Ok(EvaluatedProposal {
            id: proposal.id,
            passenger_count: proposal.passenger_count,
            member_ids: member_ids.to_vec(),
            plan,
            duration_min,
            fares,
            revenue,
            viable,
        })
    }

    async fn materialize(
        &self,
        tx: &mut Box<dyn StoreTx>,
        group: &CandidateGroup,
        best: &EvaluatedProposal,
    ) -> Result<(), DomainError> {
        let route_json = serde_json::to_string(&best.plan.geometry())
            .map_err(|e| DomainError::Store(e.to_string()))?;

        let offer = NewTripOffer {
            point_id: group.point_id,
            point_is_origin: group.point_is_origin,
            route_json,
            distance_km: best.plan.distance_km,
            duration_min: best.duration_min,
            estimated_revenue: best.revenue,
            passenger_count: best.passenger_count,
            source_proposal_id: best.id,
        };

        let assignments: Vec<NewAssignment> = best
            .fares
            .iter()
            .map(|&(request_id, fare)| {
                let order = best
                    .plan
                    .order_for(request_id)
                    .ok_or_else(|| DomainError::Store(format!("request {request_id} not routed")))?;
                Ok(NewAssignment {
                    request_id,
                    pickup_order: order.pickup_order,
                    dropoff_order: order.dropoff_order,
                    fare,
                })
            })
            .collect::<Result<_, DomainError>>()?;

        let trip_id = tx.create_offer(&offer, &assignments).await?;
        tx.set_request_states(&best.member_ids, RequestState::Offered).await?;
        tx.set_proposal_states(&[best.id], ProposalState::Optimized).await?;

        info!(
            trip_id,
            proposal_id = best.id,
            passengers = best.passenger_count,
            distance_km = best.plan.distance_km,
            duration_min = best.duration_min,
            revenue = best.revenue,
            "trip offer created"
        );
        Ok(())
    }
}

/// Total order over viable proposals: most passengers, then shortest route,
/// then highest estimated revenue.
fn select_optimal(mut viable: Vec<EvaluatedProposal>) -> EvaluatedProposal {
    viable.sort_by(|a, b| {
        b.passenger_count
            .cmp(&a.passenger_count)
            .then(
                a.plan
                    .distance_km
                    .partial_cmp(&b.plan.distance_km)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(b.revenue.cmp(&a.revenue))
    });
    viable.remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::MemoryStore;
    use crate::domain::Coordinates;
    use crate::usecases::CombinationGenerator;

    const POINT: Coordinates = Coordinates { lat: 4.60, lon: -74.08 };

    /// Seed a point-as-origin group of `n` requests with nearby destinations,
    /// then generate proposals with the given fleet capacities.
    async fn seed(store: &MemoryStore, n: usize, capacities: &[u32]) -> i64 {
        for &c in capacities {
            store.add_driver(c);
        }
        let point = store.add_point(POINT, "north");
        let ids: Vec<i64> = (0..n)
            .map(|i| {
                store.add_request(
                    POINT,
                    Coordinates::new(4.605 + i as f64 * 0.004, -74.08),
                    Some(point),
                    None,
                )
            })
            .collect();
        let group_id = store.create_group(point, true, &ids).await.unwrap();
        CombinationGenerator::new(Arc::new(store.clone()), 16)
            .generate()
            .await
            .unwrap();
        group_id
    }

    fn dispatcher(store: &MemoryStore) -> TripDispatcher {
        TripDispatcher::new(Arc::new(store.clone()), DispatchConfig::default())
    }

    #[tokio::test]
    async fn best_offer_consumes_four_and_resets_the_leftover() {
        let store = MemoryStore::new();
        // Fleet bounds [3,4] over 5 requests: 15 proposals (scenario A).
        let group_id = seed(&store, 5, &[3, 4]).await;
        assert_eq!(store.pending_proposals(group_id).await.unwrap().len(), 15);

        let stats = dispatcher(&store).optimize().await.unwrap();

        // The 4-passenger proposal wins; the 1 leftover is below min 3.
        assert_eq!(stats.offers_created, 1);
        assert_eq!(stats.requests_reset, 1);
        let offers = store.offers();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].passenger_count, 4);

        // 14 untouched proposals discarded, 1 optimized.
        assert_eq!(store.proposals_in_state(ProposalState::Discarded).len(), 14);
        assert_eq!(store.proposals_in_state(ProposalState::Optimized).len(), 1);

        // Every member ends offered or pending; nothing stays grouped.
        let members = store.group_member_ids(group_id).await.unwrap();
        let mut offered = 0;
        let mut pending = 0;
        for id in members {
            match store.request(id).unwrap().state {
                RequestState::Offered => offered += 1,
                RequestState::Pending => pending += 1,
                other => panic!("request {id} left in {other:?}"),
            }
        }
        assert_eq!((offered, pending), (4, 1));
        assert_eq!(store.group(group_id).unwrap().state, GroupState::Done);
    }

    #[tokio::test]
    async fn offers_within_one_group_are_disjoint() {
        let store = MemoryStore::new();
        // Bounds [3,3] over 6 requests: two disjoint trips can be carved.
        let group_id = seed(&store, 6, &[3]).await;

        let stats = dispatcher(&store).optimize().await.unwrap();

        assert_eq!(stats.offers_created, 2);
        let offers = store.offers();
        let mut seen = HashSet::new();
        for offer in &offers {
            for a in store.assignments_for(offer.id) {
                assert!(seen.insert(a.request_id), "request double-booked");
            }
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(stats.requests_reset, 0);
        let _ = group_id;
    }

    #[tokio::test]
    async fn single_offer_strategy_stops_after_the_first_trip() {
        let store = MemoryStore::new();
        seed(&store, 6, &[3]).await;

        let config = DispatchConfig {
            strategy: DispatchStrategy::SingleOffer,
            ..DispatchConfig::default()
        };
        let stats = TripDispatcher::new(Arc::new(store.clone()), config)
            .optimize()
            .await
            .unwrap();

        assert_eq!(stats.offers_created, 1);
        // The three unassigned requests return to the pool.
        assert_eq!(stats.requests_reset, 3);
    }

    #[tokio::test]
    async fn unviable_routes_produce_no_offer() {
        let store = MemoryStore::new();
        store.add_driver(3);
        let point = store.add_point(POINT, "north");
        // Destinations ~55 km away: route exceeds the 30 km ceiling.
        let ids: Vec<i64> = (0..3)
            .map(|i| {
                store.add_request(
                    POINT,
                    Coordinates::new(5.10 + i as f64 * 0.01, -74.08),
                    Some(point),
                    None,
                )
            })
            .collect();
        let group_id = store.create_group(point, true, &ids).await.unwrap();
        CombinationGenerator::new(Arc::new(store.clone()), 16)
            .generate()
            .await
            .unwrap();

        let stats = dispatcher(&store).optimize().await.unwrap();

        assert_eq!(stats.offers_created, 0);
        assert!(store.offers().is_empty());
        // All proposals discarded, all requests back to pending.
        assert!(store.pending_proposals(group_id).await.unwrap().is_empty());
        for id in ids {
            assert_eq!(store.request(id).unwrap().state, RequestState::Pending);
        }
    }

    #[tokio::test]
    async fn optimize_without_pending_proposals_is_idempotent() {
        let store = MemoryStore::new();
        seed(&store, 5, &[3, 4]).await;
        let d = dispatcher(&store);
        d.optimize().await.unwrap();
        let offers_before = store.offers().len();

        let stats = d.optimize().await.unwrap();

        assert_eq!(stats.groups_processed, 0);
        assert_eq!(stats.offers_created, 0);
        assert_eq!(store.offers().len(), offers_before);
    }

    #[tokio::test]
    async fn failing_group_rolls_back_and_spares_the_next() {
        let store = MemoryStore::new();
        store.add_driver(3);
        let north = store.add_point(POINT, "north");
        let south = store.add_point(Coordinates::new(4.50, -74.10), "south");

        let north_ids: Vec<i64> = (0..3)
            .map(|i| {
                store.add_request(
                    POINT,
                    Coordinates::new(4.605 + i as f64 * 0.004, -74.08),
                    Some(north),
                    None,
                )
            })
            .collect();
        let south_ids: Vec<i64> = (0..3)
            .map(|i| {
                store.add_request(
                    Coordinates::new(4.50, -74.10),
                    Coordinates::new(4.505 + i as f64 * 0.004, -74.10),
                    Some(south),
                    None,
                )
            })
            .collect();
        let failing = store.create_group(north, true, &north_ids).await.unwrap();
        let healthy = store.create_group(south, true, &south_ids).await.unwrap();
        CombinationGenerator::new(Arc::new(store.clone()), 16)
            .generate()
            .await
            .unwrap();
        store.fail_offers_for_group(failing);

        let stats = dispatcher(&store).optimize().await.unwrap();

        assert_eq!(stats.groups_failed, 1);
        assert_eq!(stats.groups_processed, 1);
        assert_eq!(stats.offers_created, 1);

        // Rolled-back group: no offer, proposals flagged error, group error.
        assert_eq!(store.group(failing).unwrap().state, GroupState::Error);
        assert!(store.pending_proposals(failing).await.unwrap().is_empty());
        assert!(!store.proposals_in_state(ProposalState::Error).is_empty());
        for id in &north_ids {
            assert_eq!(store.request(*id).unwrap().state, RequestState::Grouped);
        }

        // Healthy group committed normally.
        assert_eq!(store.group(healthy).unwrap().state, GroupState::Done);
        for id in &south_ids {
            assert_eq!(store.request(*id).unwrap().state, RequestState::Offered);
        }
    }

    #[test]
    fn selection_prefers_passengers_then_distance_then_revenue() {
        let mk = |id, passengers, distance, revenue| EvaluatedProposal {
            id,
            passenger_count: passengers,
            member_ids: vec![],
            plan: RoutePlan {
                stops: vec![],
                orders: vec![],
                distance_km: distance,
            },
            duration_min: 10,
            fares: vec![],
            revenue,
            viable: true,
        };

        let best = select_optimal(vec![mk(1, 3, 5.0, 100), mk(2, 4, 9.0, 50)]);
        assert_eq!(best.id, 2, "more passengers wins");

        let best = select_optimal(vec![mk(1, 4, 9.0, 100), mk(2, 4, 5.0, 50)]);
        assert_eq!(best.id, 2, "shorter route breaks the tie");

        let best = select_optimal(vec![mk(1, 4, 5.0, 100), mk(2, 4, 5.0, 50)]);
        assert_eq!(best.id, 1, "higher revenue breaks the final tie");
    }
}
