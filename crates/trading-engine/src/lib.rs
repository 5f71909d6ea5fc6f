//! Trading Engine
//!
//! Bracket execution for divergence signals and trade replication for the
//! copy trader.

pub mod bracket;
pub mod copy_trader;
pub mod executor;

pub use bracket::{
    BracketConfig, BracketError, BracketExecutor, BracketPlan, BracketStatus, BracketTrade,
};
pub use copy_trader::{classify, CopyTrader, CycleReport, ReplicationAction};
pub use executor::{ReplicationContext, ReplicationExecutor, ReplicationOutcome};
