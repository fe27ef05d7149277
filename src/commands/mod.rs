//! Command implementations for the CLI
//!
//! - write: persist a single record through the sink
//! - query: bounded historical query
//! - tail: follow newly written records
//! - prune: run a retention sweep now
//! - config: configuration display and validation

pub mod config;
pub mod prune;
pub mod query;
pub mod tail;
pub mod write;
