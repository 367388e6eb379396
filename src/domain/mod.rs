//! Core domain layer. No external I/O dependencies.
//!
//! Entities, state machines, and pure geo/fare math live here. Dependencies
//! flow inward.

pub mod entities;
pub mod errors;
pub mod estimator;
pub mod routing;

pub use entities::{
    CandidateGroup, CombinationProposal, ConcentrationPoint, Coordinates, DriverAvailability,
    GroupState, OfferState, ProposalState, RequestState, TripOffer, TripPassengerAssignment,
    TripRequest,
};
pub use errors::DomainError;
