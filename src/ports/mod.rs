//! Port traits. API boundaries for the hexagon.
//!
//! - Inbound: trigger surface calls into the application
//! - Outbound: application calls into the store

pub mod inbound;
pub mod outbound;

pub use inbound::{RunSummary, TriggerPort};
pub use outbound::{NewAssignment, NewTripOffer, StorePort, StoreTx};
