//! Divergence bracket trader.
//!
//! Two websocket feeds (an external probability feed and the Polymarket
//! market channel) fill a shared price table; a detector compares them once
//! per tick and hands qualifying signals to the bracket executor.

pub mod detector;
pub mod feed;
pub mod monitor;
pub mod prices;

pub use detector::{OpportunityDetector, Signal};
pub use feed::{
    spawn_feed, FeedEvent, FeedState, FrameDecoder, MarketDecoder, PriceUpdate,
    ProbabilityDecoder, ReconnectMachine, ReconnectPolicy,
};
pub use monitor::{ArbEngine, EngineTimings};
pub use prices::PriceStore;
