//! Route construction for a combination proposal. Pure.
//!
//! Greedy nearest-neighbor chaining anchored at the group's concentration
//! point. Exact shortest paths are out of scope; great-circle distance is the
//! proxy throughout.

use crate::domain::estimator::haversine_km;
use crate::domain::{ConcentrationPoint, Coordinates, TripRequest};
use serde::{Deserialize, Serialize};

/// One visited location on the planned route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub kind: StopKind,
    pub location: Coordinates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    /// The concentration point anchoring the group.
    Point,
    /// A passenger's own origin.
    Pickup { request_id: i64 },
    /// A passenger's own destination.
    Dropoff { request_id: i64 },
}

/// Pickup/drop-off placement of one request within the route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopOrder {
    pub request_id: i64,
    pub pickup_order: u32,
    pub dropoff_order: u32,
}

/// A constructed route: ordered stops, per-request orders, total distance.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub stops: Vec<Stop>,
    pub orders: Vec<StopOrder>,
    pub distance_km: f64,
}

/// GeoJSON LineString of the route geometry. Coordinates are [lon, lat].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineString {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

impl RoutePlan {
    pub fn geometry(&self) -> LineString {
        LineString {
            kind: "LineString".to_string(),
            coordinates: self
                .stops
                .iter()
                .map(|s| [s.location.lon, s.location.lat])
                .collect(),
        }
    }

    pub fn order_for(&self, request_id: i64) -> Option<StopOrder> {
        self.orders.iter().copied().find(|o| o.request_id == request_id)
    }
}

/// Construct the route for one proposal.
///
/// Point as origin: everyone boards at the point (pickup order 0), drop-offs
/// are chained by nearest neighbor starting from the point. Point as
/// destination: pickups are chained by nearest neighbor starting from the
/// first request's origin, then the point is the single shared drop-off.
pub fn plan_route(
    point: &ConcentrationPoint,
    point_is_origin: bool,
    requests: &[TripRequest],
) -> RoutePlan {
    if point_is_origin {
        plan_from_point(point, requests)
    } else {
        plan_toward_point(point, requests)
    }
}

fn plan_from_point(point: &ConcentrationPoint, requests: &[TripRequest]) -> RoutePlan {
    let mut stops = vec![Stop {
        kind: StopKind::Point,
        location: point.location,
    }];
    let mut orders = Vec::with_capacity(requests.len());

    let mut remaining: Vec<&TripRequest> = requests.iter().collect();
    let mut last = point.location;
    let mut order = 1u32;
    while !remaining.is_empty() {
        let idx = nearest_index(last, &remaining, |r| r.destination);
        let req = remaining.swap_remove(idx);
        stops.push(Stop {
            kind: StopKind::Dropoff { request_id: req.id },
            location: req.destination,
        });
        orders.push(StopOrder {
            request_id: req.id,
            pickup_order: 0,
            dropoff_order: order,
        });
        last = req.destination;
        order += 1;
    }

    finish(stops, orders)
}

fn plan_toward_point(point: &ConcentrationPoint, requests: &[TripRequest]) -> RoutePlan {
    let mut stops = Vec::with_capacity(requests.len() + 1);
    let mut orders = Vec::with_capacity(requests.len());

    let mut remaining: Vec<&TripRequest> = requests.iter().collect();
    let mut last: Option<Coordinates> = None;
    let mut order = 1u32;
    while !remaining.is_empty() {
        // First pickup is the first request as listed; after that, chain by
        // proximity to the last visited origin.
        let idx = match last {
            None => 0,
            Some(p) => nearest_index(p, &remaining, |r| r.origin),
        };
        let req = remaining.remove(idx);
        stops.push(Stop {
            kind: StopKind::Pickup { request_id: req.id },
            location: req.origin,
        });
        orders.push(StopOrder {
            request_id: req.id,
            pickup_order: order,
            dropoff_order: 0, // filled below: shared final stop
        });
        last = Some(req.origin);
        order += 1;
    }

    stops.push(Stop {
        kind: StopKind::Point,
        location: point.location,
    });
    for o in &mut orders {
        o.dropoff_order = order;
    }

    finish(stops, orders)
}

fn nearest_index(
    from: Coordinates,
    candidates: &[&TripRequest],
    coord: impl Fn(&TripRequest) -> Coordinates,
) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::INFINITY;
    for (i, r) in candidates.iter().enumerate() {
        let d = haversine_km(from, coord(r));
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

fn finish(stops: Vec<Stop>, orders: Vec<StopOrder>) -> RoutePlan {
    let distance_km = stops
        .windows(2)
        .map(|w| haversine_km(w[0].location, w[1].location))
        .sum();
    RoutePlan {
        stops,
        orders,
        distance_km,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestState;

    fn request(id: i64, origin: Coordinates, destination: Coordinates) -> TripRequest {
        TripRequest {
            id,
            passenger_id: id * 10,
            origin,
            destination,
            origin_point_id: None,
            destination_point_id: None,
            state: RequestState::Grouped,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn point() -> ConcentrationPoint {
        ConcentrationPoint {
            id: 1,
            location: Coordinates::new(4.60, -74.08),
            name: "Portal Norte".to_string(),
        }
    }

    #[test]
    fn from_point_orders_dropoffs_by_proximity() {
        let p = point();
        // Destinations at increasing latitude offsets; nearest-neighbor from
        // the point must visit them in ascending offset order.
        let reqs = vec![
            request(1, p.location, Coordinates::new(4.63, -74.08)),
            request(2, p.location, Coordinates::new(4.61, -74.08)),
            request(3, p.location, Coordinates::new(4.62, -74.08)),
        ];
        let plan = plan_route(&p, true, &reqs);

        assert_eq!(plan.stops.len(), 4);
        assert_eq!(plan.stops[0].kind, StopKind::Point);
        assert_eq!(plan.stops[1].kind, StopKind::Dropoff { request_id: 2 });
        assert_eq!(plan.stops[2].kind, StopKind::Dropoff { request_id: 3 });
        assert_eq!(plan.stops[3].kind, StopKind::Dropoff { request_id: 1 });

        for r in &reqs {
            assert_eq!(plan.order_for(r.id).unwrap().pickup_order, 0);
        }
        assert_eq!(plan.order_for(2).unwrap().dropoff_order, 1);
        assert_eq!(plan.order_for(3).unwrap().dropoff_order, 2);
        assert_eq!(plan.order_for(1).unwrap().dropoff_order, 3);
    }

    #[test]
    fn toward_point_chains_pickups_and_shares_final_dropoff() {
        let p = point();
        let reqs = vec![
            request(1, Coordinates::new(4.65, -74.08), p.location),
            request(2, Coordinates::new(4.66, -74.08), p.location),
            request(3, Coordinates::new(4.70, -74.08), p.location),
        ];
        let plan = plan_route(&p, false, &reqs);

        // First pickup is request 1 as listed, then 2 (closest to 1), then 3.
        assert_eq!(plan.stops[0].kind, StopKind::Pickup { request_id: 1 });
        assert_eq!(plan.stops[1].kind, StopKind::Pickup { request_id: 2 });
        assert_eq!(plan.stops[2].kind, StopKind::Pickup { request_id: 3 });
        assert_eq!(plan.stops[3].kind, StopKind::Point);

        assert_eq!(plan.order_for(1).unwrap().pickup_order, 1);
        assert_eq!(plan.order_for(3).unwrap().pickup_order, 3);
        // Shared drop-off order value for everyone.
        for r in &reqs {
            assert_eq!(plan.order_for(r.id).unwrap().dropoff_order, 4);
        }
    }

    #[test]
    fn distance_is_sum_of_segments() {
        let p = point();
        let dest = Coordinates::new(4.70, -74.08);
        let reqs = vec![request(1, p.location, dest)];
        let plan = plan_route(&p, true, &reqs);
        let expected = haversine_km(p.location, dest);
        assert!((plan.distance_km - expected).abs() < 1e-9);
    }

    #[test]
    fn geometry_is_lon_lat_linestring() {
        let p = point();
        let reqs = vec![request(1, p.location, Coordinates::new(4.70, -74.08))];
        let geo = plan_route(&p, true, &reqs).geometry();
        assert_eq!(geo.kind, "LineString");
        assert_eq!(geo.coordinates[0], [p.location.lon, p.location.lat]);
    }
}
