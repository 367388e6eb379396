//! Cross-cutting shared code: configuration.

pub mod config;
