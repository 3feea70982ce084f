//! frame-harvest library crate.
//!
//! Builds a category-balanced image dataset from live broadcasts. The binary
//! in `main.rs` wires these modules together; integration tests use them
//! directly.

pub mod acquisition;
pub mod balancer;
pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod store;
pub mod utils;

pub use error::{Error, Result};
