//! Coverage report ingestion

pub mod ingest;

pub use ingest::{CoverageIngester, IngestError};
