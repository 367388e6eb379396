//! Infrastructure adapters. Implement outbound ports.
//!
//! Persistence only: the HTTP/auth surface, geocoding, and driver session
//! management are external collaborators.

pub mod persistence;
