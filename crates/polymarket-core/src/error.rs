//! Error types for the Polymarket bots.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid market data: {0}")]
    InvalidMarket(String),

    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("Signing error: {message}")]
    Signing { message: String },

    #[error("Order error: {message}")]
    Order {
        message: String,
        transaction_hash: Option<String>,
    },

    #[error("Feed {feed} stalled after {attempts} reconnect attempts")]
    FeedStalled { feed: String, attempts: u32 },

    #[error("Price {value} outside (0, 1]")]
    InvalidPrice { value: String },
}

impl Error {
    /// Order rejection without an on-chain transaction.
    pub fn order(message: impl Into<String>) -> Self {
        Self::Order {
            message: message.into(),
            transaction_hash: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
