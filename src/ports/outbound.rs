//! Outbound store port. Application calls into persistence.
//!
//! Implemented by adapters; all queries are parameterized there and
//! infrastructure errors are mapped into DomainError.

use crate::domain::{
    CandidateGroup, CombinationProposal, ConcentrationPoint, DomainError, GroupState,
    ProposalState, RequestState, TripRequest,
};

/// Row data for a trip offer about to be materialized.
#[derive(Debug, Clone)]
pub struct NewTripOffer {
    pub point_id: i64,
    pub point_is_origin: bool,
    /// GeoJSON LineString, serialized.
    pub route_json: String,
    pub distance_km: f64,
    pub duration_min: u32,
    pub estimated_revenue: i64,
    pub passenger_count: u32,
    pub source_proposal_id: i64,
}

/// Passenger placement row, created atomically with the offer.
#[derive(Debug, Clone, Copy)]
pub struct NewAssignment {
    pub request_id: i64,
    pub pickup_order: u32,
    pub dropoff_order: u32,
    pub fare: i64,
}

/// Relational store port. Reads are auto-committed; writes that must be
/// atomic per group go through [`StoreTx`].
#[async_trait::async_trait]
pub trait StorePort: Send + Sync {
    /// Seat capacities of currently available drivers (unexpired sessions).
    /// Empty when no driver is available.
    async fn available_capacities(&self) -> Result<Vec<u32>, DomainError>;

    async fn pending_requests(&self) -> Result<Vec<TripRequest>, DomainError>;

    async fn requests_by_ids(&self, ids: &[i64]) -> Result<Vec<TripRequest>, DomainError>;

    async fn concentration_point(
        &self,
        id: i64,
    ) -> Result<Option<ConcentrationPoint>, DomainError>;

    /// Create a candidate group in state `new`, link the members, and
    /// transition them to `grouped` — one transaction. Returns the group id.
    async fn create_group(
        &self,
        point_id: i64,
        point_is_origin: bool,
        member_ids: &[i64],
    ) -> Result<i64, DomainError>;

    async fn groups_in_state(&self, state: GroupState)
        -> Result<Vec<CandidateGroup>, DomainError>;

    async fn group_member_ids(&self, group_id: i64) -> Result<Vec<i64>, DomainError>;

    async fn set_group_state(&self, group_id: i64, state: GroupState)
        -> Result<(), DomainError>;

    /// Persist one proposal (state `pending`) plus membership rows per subset,
    /// in one transaction. Returns how many proposals were inserted.
    async fn insert_proposals(
        &self,
        group_id: i64,
        subsets: &[Vec<i64>],
    ) -> Result<usize, DomainError>;

    /// Groups that still have at least one `pending` proposal.
    async fn groups_with_pending_proposals(&self) -> Result<Vec<CandidateGroup>, DomainError>;

    async fn pending_proposals(
        &self,
        group_id: i64,
    ) -> Result<Vec<CombinationProposal>, DomainError>;

    async fn proposal_member_ids(&self, proposal_id: i64) -> Result<Vec<i64>, DomainError>;

    /// Post-rollback cleanup: flag the group's still-pending proposals as
    /// `error`. Runs outside the rolled-back transaction.
    async fn mark_pending_proposals_error(&self, group_id: i64) -> Result<(), DomainError>;

    /// Open the per-group atomic transaction used by the dispatcher.
    async fn begin_group_tx(&self) -> Result<Box<dyn StoreTx>, DomainError>;
}

/// Atomic write unit for one group's dispatch. Dropping without commit must
/// roll back.
#[async_trait::async_trait]
pub trait StoreTx: Send {
    /// Insert the offer and its assignment rows. Returns the trip id.
    async fn create_offer(
        &mut self,
        offer: &NewTripOffer,
        assignments: &[NewAssignment],
    ) -> Result<i64, DomainError>;

    async fn set_request_states(
        &mut self,
        ids: &[i64],
        state: RequestState,
    ) -> Result<(), DomainError>;

    async fn set_proposal_states(
        &mut self,
        ids: &[i64],
        state: ProposalState,
    ) -> Result<(), DomainError>;

    async fn set_group_state(&mut self, group_id: i64, state: GroupState)
        -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
