//! Quote computation for the client-facing estimate endpoint.
//!
//! Consumes the fare/time estimator only; never touches groups, proposals,
//! or the store. The HTTP surface exposing this lives outside the core.

use crate::domain::estimator::{self, FareBreakdown};
use crate::domain::Coordinates;

/// Passenger counts quoted when the caller does not specify one.
const DEFAULT_PASSENGER_COUNTS: [u32; 3] = [3, 4, 5];

/// One quoted option for a passenger count.
#[derive(Debug, Clone, Copy)]
pub struct TripQuote {
    pub passenger_count: u32,
    pub distance_km: f64,
    pub eta_min: u32,
    pub fare: FareBreakdown,
}

/// Stateless quoting service.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuoteService;

impl QuoteService {
    pub fn new() -> Self {
        Self
    }

    /// Quote a trip between two coordinates. With an explicit passenger
    /// count a single quote is returned; otherwise one per default count.
    pub fn quote(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        origin_is_point: bool,
        destination_is_point: bool,
        passengers: Option<u32>,
    ) -> Vec<TripQuote> {
        let distance_km = estimator::haversine_km(origin, destination);
        let eta_min = estimator::eta_minutes(distance_km, origin_is_point, destination_is_point);

        let counts: Vec<u32> = match passengers {
            Some(n) => vec![n],
            None => DEFAULT_PASSENGER_COUNTS.to_vec(),
        };

        counts
            .into_iter()
            .map(|n| TripQuote {
                passenger_count: n,
                distance_km,
                eta_min,
                fare: estimator::fare(distance_km, n),
            })
            .collect()
    }
}
