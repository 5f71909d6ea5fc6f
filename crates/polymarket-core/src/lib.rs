//! Polymarket Core Library
//!
//! Shared types, API clients, order placement and persistence used by the
//! divergence bracket trader and the copy trader.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod orders;
pub mod schedule;
pub mod signing;
pub mod telemetry;
pub mod types;

pub use error::{Error, Result};
