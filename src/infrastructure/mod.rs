//! Infrastructure layer module
//!
//! This module contains all infrastructure adapters and external integrations:
//! - Coverage report ingestion
//! - Completion endpoint client with retry and rate limiting
//! - tree-sitter grammars
//! - Configuration management
//! - Logging infrastructure
//! - Run lock on the repository checkout
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod coverage;
pub mod inference;
pub mod lock;
pub mod logging;
pub mod parsing;
