//! In-memory store with snapshot transactions.
//!
//! Backs unit and integration tests without SQLite I/O, and doubles as a
//! fault-injection harness: offers can be made to fail for chosen groups to
//! exercise the dispatcher's per-group rollback path.

use crate::domain::{
    CandidateGroup, CombinationProposal, ConcentrationPoint, Coordinates, DomainError,
    DriverAvailability, GroupState, OfferState, ProposalState, RequestState, TripOffer,
    TripPassengerAssignment, TripRequest,
};
use crate::ports::{NewAssignment, NewTripOffer, StorePort, StoreTx};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    next_id: i64,
    drivers: Vec<DriverAvailability>,
    points: HashMap<i64, ConcentrationPoint>,
    requests: BTreeMap<i64, TripRequest>,
    groups: BTreeMap<i64, CandidateGroup>,
    group_members: Vec<(i64, i64)>,
    proposals: BTreeMap<i64, CombinationProposal>,
    proposal_members: Vec<(i64, i64)>,
    offers: BTreeMap<i64, TripOffer>,
    assignments: Vec<TripPassengerAssignment>,
    /// Groups whose offer creation fails (fault injection).
    fail_offer_groups: HashSet<i64>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared in-memory state; safe to clone across services.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── seeding helpers ──────────────────────────────────────────────────

    pub fn add_driver(&self, capacity: u32) {
        let mut s = self.lock();
        let id = s.next_id();
        s.drivers.push(DriverAvailability {
            driver_id: id,
            location: Coordinates::new(0.0, 0.0),
            capacity,
            available: true,
            session_expires_at: i64::MAX,
        });
    }

    pub fn clear_drivers(&self) {
        self.lock().drivers.clear();
    }

    pub fn add_point(&self, location: Coordinates, name: &str) -> i64 {
        let mut s = self.lock();
        let id = s.next_id();
        s.points.insert(
            id,
            ConcentrationPoint {
                id,
                location,
                name: name.to_string(),
            },
        );
        id
    }

    pub fn add_request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        origin_point_id: Option<i64>,
        destination_point_id: Option<i64>,
    ) -> i64 {
        let mut s = self.lock();
        let id = s.next_id();
        s.requests.insert(
            id,
            TripRequest {
                id,
                passenger_id: id,
                origin,
                destination,
                origin_point_id,
                destination_point_id,
                state: RequestState::Pending,
                created_at: id,
                updated_at: id,
            },
        );
        id
    }

    /// Make `create_offer` fail for any proposal of this group.
    pub fn fail_offers_for_group(&self, group_id: i64) {
        self.lock().fail_offer_groups.insert(group_id);
    }

    // ── inspection helpers ───────────────────────────────────────────────

    pub fn request(&self, id: i64) -> Option<TripRequest> {
        self.lock().requests.get(&id).cloned()
    }

    pub fn group(&self, id: i64) -> Option<CandidateGroup> {
        self.lock().groups.get(&id).cloned()
    }

    pub fn offers(&self) -> Vec<TripOffer> {
        self.lock().offers.values().cloned().collect()
    }

    pub fn assignments_for(&self, trip_id: i64) -> Vec<TripPassengerAssignment> {
        self.lock()
            .assignments
            .iter()
            .filter(|a| a.trip_id == trip_id)
            .cloned()
            .collect()
    }

    pub fn proposals_in_state(&self, state: ProposalState) -> Vec<CombinationProposal> {
        self.lock()
            .proposals
            .values()
            .filter(|p| p.state == state)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl StorePort for MemoryStore {
    async fn available_capacities(&self) -> Result<Vec<u32>, DomainError> {
        let now = chrono::Utc::now().timestamp();
        Ok(self
            .lock()
            .drivers
            .iter()
            .filter(|d| d.available && d.session_expires_at > now)
            .map(|d| d.capacity)
            .collect())
    }

    async fn pending_requests(&self) -> Result<Vec<TripRequest>, DomainError> {
        Ok(self
            .lock()
            .requests
            .values()
            .filter(|r| r.state == RequestState::Pending)
            .cloned()
            .collect())
    }

    async fn requests_by_ids(&self, ids: &[i64]) -> Result<Vec<TripRequest>, DomainError> {
        let s = self.lock();
        Ok(ids.iter().filter_map(|id| s.requests.get(id).cloned()).collect())
    }

    async fn concentration_point(
        &self,
        id: i64,
    ) -> Result<Option<ConcentrationPoint>, DomainError> {
        Ok(self.lock().points.get(&id).cloned())
    }

    async fn create_group(
        &self,
        point_id: i64,
        point_is_origin: bool,
        member_ids: &[i64],
    ) -> Result<i64, DomainError> {
        let mut s = self.lock();
        let id = s.next_id();
        s.groups.insert(
            id,
            CandidateGroup {
                id,
                point_id,
                point_is_origin,
                state: GroupState::New,
                created_at: id,
                updated_at: id,
            },
        );
        for &rid in member_ids {
            s.group_members.push((id, rid));
            if let Some(r) = s.requests.get_mut(&rid) {
                r.state = RequestState::Grouped;
            }
        }
        Ok(id)
    }

    async fn groups_in_state(
        &self,
        state: GroupState,
    ) -> Result<Vec<CandidateGroup>, DomainError> {
        Ok(self
            .lock()
            .groups
            .values()
            .filter(|g| g.state == state)
            .cloned()
            .collect())
    }

    async fn group_member_ids(&self, group_id: i64) -> Result<Vec<i64>, DomainError> {
        Ok(self
            .lock()
            .group_members
            .iter()
            .filter(|(g, _)| *g == group_id)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn set_group_state(
        &self,
        group_id: i64,
        state: GroupState,
    ) -> Result<(), DomainError> {
        let mut s = self.lock();
        if let Some(g) = s.groups.get_mut(&group_id) {
            g.state = state;
        }
        Ok(())
    }

    async fn insert_proposals(
        &self,
        group_id: i64,
        subsets: &[Vec<i64>],
    ) -> Result<usize, DomainError> {
        let mut s = self.lock();
        for subset in subsets {
            let id = s.next_id();
            s.proposals.insert(
                id,
                CombinationProposal {
                    id,
                    group_id,
                    passenger_count: subset.len() as u32,
                    state: ProposalState::Pending,
                },
            );
            for &rid in subset {
                s.proposal_members.push((id, rid));
            }
        }
        Ok(subsets.len())
    }

    async fn groups_with_pending_proposals(&self) -> Result<Vec<CandidateGroup>, DomainError> {
        let s = self.lock();
        let with_pending: HashSet<i64> = s
            .proposals
            .values()
            .filter(|p| p.state == ProposalState::Pending)
            .map(|p| p.group_id)
            .collect();
        Ok(s.groups
            .values()
            .filter(|g| with_pending.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn pending_proposals(
        &self,
        group_id: i64,
    ) -> Result<Vec<CombinationProposal>, DomainError> {
        Ok(self
            .lock()
            .proposals
            .values()
            .filter(|p| p.group_id == group_id && p.state == ProposalState::Pending)
            .cloned()
            .collect())
    }

    async fn proposal_member_ids(&self, proposal_id: i64) -> Result<Vec<i64>, DomainError> {
        Ok(self
            .lock()
            .proposal_members
            .iter()
            .filter(|(p, _)| *p == proposal_id)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn mark_pending_proposals_error(&self, group_id: i64) -> Result<(), DomainError> {
        let mut s = self.lock();
        for p in s.proposals.values_mut() {
            if p.group_id == group_id && p.state == ProposalState::Pending {
                p.state = ProposalState::Error;
            }
        }
        Ok(())
    }

    async fn begin_group_tx(&self) -> Result<Box<dyn StoreTx>, DomainError> {
        let working = self.lock().clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.state),
            working,
        }))
    }
}

/// Snapshot transaction: mutates a clone, commit swaps it back in.
struct MemoryTx {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
}

#[async_trait::async_trait]
impl StoreTx for MemoryTx {
    async fn create_offer(
        &mut self,
        offer: &NewTripOffer,
        assignments: &[NewAssignment],
    ) -> Result<i64, DomainError> {
        let group_id = self
            .working
            .proposals
            .get(&offer.source_proposal_id)
            .map(|p| p.group_id);
        if let Some(gid) = group_id {
            if self.working.fail_offer_groups.contains(&gid) {
                return Err(DomainError::Store("injected offer failure".to_string()));
            }
        }

        let id = self.working.next_id();
        self.working.offers.insert(
            id,
            TripOffer {
                id,
                point_id: offer.point_id,
                point_is_origin: offer.point_is_origin,
                route_json: offer.route_json.clone(),
                distance_km: offer.distance_km,
                duration_min: offer.duration_min,
                estimated_revenue: offer.estimated_revenue,
                passenger_count: offer.passenger_count,
                state: OfferState::Available,
                source_proposal_id: offer.source_proposal_id,
            },
        );
        for a in assignments {
            self.working.assignments.push(TripPassengerAssignment {
                trip_id: id,
                request_id: a.request_id,
                pickup_order: a.pickup_order,
                dropoff_order: a.dropoff_order,
                fare: a.fare,
            });
        }
        Ok(id)
    }

    async fn set_request_states(
        &mut self,
        ids: &[i64],
        state: RequestState,
    ) -> Result<(), DomainError> {
        for id in ids {
            if let Some(r) = self.working.requests.get_mut(id) {
                r.state = state;
            }
        }
        Ok(())
    }

    async fn set_proposal_states(
        &mut self,
        ids: &[i64],
        state: ProposalState,
    ) -> Result<(), DomainError> {
        for id in ids {
            if let Some(p) = self.working.proposals.get_mut(id) {
                p.state = state;
            }
        }
        Ok(())
    }

    async fn set_group_state(
        &mut self,
        group_id: i64,
        state: GroupState,
    ) -> Result<(), DomainError> {
        if let Some(g) = self.working.groups.get_mut(&group_id) {
            g.state = state;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let mut s = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        *s = self.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        // Snapshot never touched shared state; dropping it is the rollback.
        Ok(())
    }
}
