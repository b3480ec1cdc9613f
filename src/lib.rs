//! Family NFL pick'em pool: provider sync, pick grading, standings and the
//! HTTP API the front end reads.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod grading;
pub mod models;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod sportsdata;
pub mod standings;
pub mod store;
pub mod teams;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PoolError, Result};
