//! Domain layer for the coverage-gap test generator
//!
//! This module contains the data model, the error taxonomy and the port
//! traits implemented by infrastructure adapters.

pub mod error;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use error::{PipelineError, PipelineResult};
