//! Fare/time estimation. Pure functions, no store access.
//!
//! Shared by the dispatcher (route viability metrics) and the quote surface.
//! Everything here is deterministic so both can be unit-tested in isolation.

use crate::domain::Coordinates;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average urban driving speed assumed for all time estimates.
const AVG_SPEED_KMH: f64 = 30.0;

/// Multiplier applied to raw travel time to account for traffic.
const TRAFFIC_FACTOR: f64 = 1.3;

/// Pickup overhead in minutes: passengers wait at a concentration point vs.
/// door-to-door collection.
const PICKUP_MIN_AT_POINT: f64 = 3.0;
const PICKUP_MIN_DOOR: f64 = 8.0;

/// Drop-off overhead in minutes.
const DROPOFF_MIN_AT_POINT: f64 = 2.0;
const DROPOFF_MIN_DOOR: f64 = 5.0;

/// Base fare per passenger in currency units.
const BASE_FARE: f64 = 2000.0;

/// Additional fare per kilometer of the passenger's own direct distance.
const FARE_PER_KM: f64 = 1000.0;

/// Platform commission on top of the shared fare.
const COMMISSION_RATE: f64 = 0.15;

/// Haversine great-circle distance between two points, in kilometers.
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Travel time over a constructed route, in whole minutes. No overheads;
/// this is the figure the viability test compares against its ceiling.
pub fn route_duration_min(distance_km: f64) -> u32 {
    (distance_km / AVG_SPEED_KMH * 60.0).ceil() as u32
}

/// Door-to-door ETA for a single request, in whole minutes.
///
/// Base travel time inflated by the traffic factor, plus pickup and drop-off
/// overheads that shrink when the endpoint is a concentration point.
pub fn eta_minutes(distance_km: f64, origin_is_point: bool, dest_is_point: bool) -> u32 {
    let base = distance_km / AVG_SPEED_KMH * 60.0;
    let pickup = if origin_is_point {
        PICKUP_MIN_AT_POINT
    } else {
        PICKUP_MIN_DOOR
    };
    let dropoff = if dest_is_point {
        DROPOFF_MIN_AT_POINT
    } else {
        DROPOFF_MIN_DOOR
    };
    (base * TRAFFIC_FACTOR + pickup + dropoff).ceil() as u32
}

/// Per-passenger fare with commission and the quoted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FareBreakdown {
    /// Discounted shared fare before commission.
    pub shared_fare: i64,
    /// Platform commission (15% of the shared fare).
    pub commission: i64,
    /// shared_fare + commission.
    pub total: i64,
    /// Quoted range [0.95x, 1.05x] of total, rounded to the nearest 100.
    pub quoted_min: i64,
    pub quoted_max: i64,
}

/// Sharing discount: riding with more passengers is cheaper per seat.
fn sharing_discount(passenger_count: u32) -> f64 {
    match passenger_count {
        0 | 1 => 1.0,
        2 => 0.9,
        3 => 0.85,
        _ => 0.8,
    }
}

/// Tiered per-passenger fare from the passenger's own direct distance.
pub fn fare(distance_km: f64, passenger_count: u32) -> FareBreakdown {
    let shared_fare =
        ((BASE_FARE + FARE_PER_KM * distance_km) * sharing_discount(passenger_count)).ceil() as i64;
    let commission = (shared_fare as f64 * COMMISSION_RATE).ceil() as i64;
    let total = shared_fare + commission;
    FareBreakdown {
        shared_fare,
        commission,
        total,
        quoted_min: round_to_hundred(total as f64 * 0.95),
        quoted_max: round_to_hundred(total as f64 * 1.05),
    }
}

fn round_to_hundred(v: f64) -> i64 {
    ((v / 100.0).round() * 100.0) as i64
}
