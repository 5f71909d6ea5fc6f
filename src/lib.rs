//! Polymarket divergence bracket trader and copy trader.
//!
//! The root crate hosts the cross-crate integration tests. Functionality
//! lives in the workspace crates:
//!
//! - `polymarket-core`: types, API clients, signing, persistence, settings
//! - `arb-monitor`: feeds, price store, detector and the bracket engine loop
//! - `trading-engine`: bracket execution and trade replication
//! - `wallet-tracker`: activity ingestion and the copy trader binary

pub use arb_monitor as arb;
pub use polymarket_core as core;
pub use trading_engine as trading;
pub use wallet_tracker as tracker;
