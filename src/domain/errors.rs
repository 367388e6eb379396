//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Unknown {entity} state: {value}")]
    InvalidState { entity: &'static str, value: String },

    #[error("Concentration point {0} not found")]
    PointNotFound(i64),

    #[error("Configuration error: {0}")]
    Config(String),
}
