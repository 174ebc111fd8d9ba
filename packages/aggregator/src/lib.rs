// Feed Aggregator - Scheduling Core
//
// Persistent job queue, worker loop and feed synchronization for the polling
// feed aggregator. Many worker processes coordinate only through PostgreSQL.
//
// Domain handlers live in domains/*; infrastructure traits and the job engine
// live in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
