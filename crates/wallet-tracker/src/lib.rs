//! Wallet Tracker
//!
//! Follows one Polymarket wallet: ingests its trades and replicates them on
//! the local proxy wallet.

pub mod trade_monitor;

pub use trade_monitor::{ActivityIngestor, MonitorConfig};
