//! # Tablefill
//!
//! Joint entity and relation extraction via table filling: a transformer
//! encoder scores entity labels per token and relation labels per table
//! cell, and this crate decodes those scores into typed spans and
//! directed relation tuples, then scores them against ground truth.
#![forbid(unsafe_code)]

/// Datasets
pub mod datasets;

/// Pipelines
pub mod pipelines;

/// Entity and relation type registry
pub mod schema;

/// Utilities
pub mod utils;
