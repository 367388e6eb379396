//! copool: batch matching of point-to-point ride requests into shared-vehicle
//! trips anchored at concentration points, with Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
