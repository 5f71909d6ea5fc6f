//! API clients for external services.

pub mod clob;
pub mod data;
pub mod gamma;
pub mod polygon;

pub use clob::{ApiCredentials, ClobClient, MarketChannel, MarketEvent};
pub use data::{DataApiClient, WalletDataSource};
pub use gamma::GammaClient;
pub use polygon::{BalanceSource, PolygonClient};
