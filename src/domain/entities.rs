//! Domain entities. Pure data structures for the matching core.
//!
//! State enums round-trip through `as_str`/`parse` at the persistence
//! boundary; free-form strings never leak past the adapters.

use crate::domain::DomainError;
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Lifecycle of a trip request. This core only drives
/// pending -> grouped -> offered (and the explicit reset back to pending);
/// the later states belong to the external trip-lifecycle surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Grouped,
    Offered,
    Accepted,
    InProgress,
    Completed,
    Canceled,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Grouped => "grouped",
            Self::Offered => "offered",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(Self::Pending),
            "grouped" => Ok(Self::Grouped),
            "offered" => Ok(Self::Offered),
            "accepted" => Ok(Self::Accepted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(DomainError::InvalidState {
                entity: "request",
                value: s.to_string(),
            }),
        }
    }
}

/// A passenger's point-to-point transportation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRequest {
    pub id: i64,
    pub passenger_id: i64,
    pub origin: Coordinates,
    pub destination: Coordinates,
    /// Set when the origin is a concentration point.
    pub origin_point_id: Option<i64>,
    /// Set when the destination is a concentration point.
    pub destination_point_id: Option<i64>,
    pub state: RequestState,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TripRequest {
    pub fn origin_is_point(&self) -> bool {
        self.origin_point_id.is_some()
    }

    pub fn destination_is_point(&self) -> bool {
        self.destination_point_id.is_some()
    }
}

/// Fixed shared pickup/drop-off location. Read-only reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationPoint {
    pub id: i64,
    pub location: Coordinates,
    pub name: String,
}

/// Processing state of a candidate group. Advances forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    New,
    CombinationsGenerated,
    Optimizing,
    Done,
    Error,
}

impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::CombinationsGenerated => "combinations_generated",
            Self::Optimizing => "optimizing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "new" => Ok(Self::New),
            "combinations_generated" => Ok(Self::CombinationsGenerated),
            "optimizing" => Ok(Self::Optimizing),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            _ => Err(DomainError::InvalidState {
                entity: "group",
                value: s.to_string(),
            }),
        }
    }
}

/// Pending requests sharing a concentration point and direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateGroup {
    pub id: i64,
    pub point_id: i64,
    /// true: the point is where the group departs from; false: where it arrives.
    pub point_is_origin: bool,
    pub state: GroupState,
    pub created_at: i64,
    pub updated_at: i64,
}

/// State of a combination proposal. Consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Pending,
    Optimized,
    Discarded,
    Error,
}

impl ProposalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Optimized => "optimized",
            Self::Discarded => "discarded",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(Self::Pending),
            "optimized" => Ok(Self::Optimized),
            "discarded" => Ok(Self::Discarded),
            "error" => Ok(Self::Error),
            _ => Err(DomainError::InvalidState {
                entity: "proposal",
                value: s.to_string(),
            }),
        }
    }
}

/// One candidate subset of a group's requests, sized within fleet capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationProposal {
    pub id: i64,
    pub group_id: i64,
    pub passenger_count: u32,
    pub state: ProposalState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferState {
    Available,
    Assigned,
    Completed,
    Canceled,
}

impl OfferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "available" => Ok(Self::Available),
            "assigned" => Ok(Self::Assigned),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(DomainError::InvalidState {
                entity: "offer",
                value: s.to_string(),
            }),
        }
    }
}

/// A materialized, dispatchable trip built from the selected optimal proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripOffer {
    pub id: i64,
    pub point_id: i64,
    pub point_is_origin: bool,
    /// GeoJSON LineString of the planned route, serialized as JSON.
    pub route_json: String,
    pub distance_km: f64,
    pub duration_min: u32,
    pub estimated_revenue: i64,
    pub passenger_count: u32,
    pub state: OfferState,
    pub source_proposal_id: i64,
}

/// Per-passenger placement within a trip offer. Created atomically with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripPassengerAssignment {
    pub trip_id: i64,
    pub request_id: i64,
    pub pickup_order: u32,
    pub dropoff_order: u32,
    pub fare: i64,
}

/// Read-only view of an available driver. Written only by external
/// account/session endpoints; this core reads capacity bounds from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverAvailability {
    pub driver_id: i64,
    pub location: Coordinates,
    pub capacity: u32,
    pub available: bool,
    pub session_expires_at: i64,
}
