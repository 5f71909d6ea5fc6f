//! Copy Trader
//!
//! Ingests the source wallet's trades and replicates them locally.

use anyhow::{Context, Result};
use polymarket_core::api::{DataApiClient, PolygonClient};
use polymarket_core::config::{Config, CopySettings};
use polymarket_core::db::{
    self, ActivityStore, MemoryActivityStore, MemoryWalletConfigStore, PgActivityRepository,
    PgWalletConfigRepository, WalletConfigStore,
};
use polymarket_core::orders::{LiveOrderPlacer, OrderPlacer, PaperOrderPlacer};
use polymarket_core::schedule::{shutdown_channel, Ticker};
use polymarket_core::telemetry::{init_tracing, touch_health_file};
use polymarket_core::types::WalletConfig;
use std::sync::Arc;
use tracing::{info, warn};
use trading_engine::{CopyTrader, ReplicationExecutor};
use wallet_tracker::{ActivityIngestor, MonitorConfig};

const DEFAULT_LOG_FILTER: &str =
    "wallet_tracker=info,trading_engine=info,polymarket_core=warn,sqlx=warn,hyper=warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_LOG_FILTER);

    info!("Starting Copy Trader");
    touch_health_file();

    let config = Config::from_env()?;
    let settings = CopySettings::load()?;

    let (activity_store, wallet_store): (Arc<dyn ActivityStore>, Arc<dyn WalletConfigStore>) =
        match config.database() {
            Ok(database) => {
                let pool = db::create_pool(database)
                    .await
                    .context("failed to connect to the database")?;
                db::run_migrations(&pool).await?;
                info!("Database ready");
                (
                    Arc::new(PgActivityRepository::new(pool.clone(), &settings.user_address)),
                    Arc::new(PgWalletConfigRepository::new(pool)),
                )
            }
            Err(e) => {
                warn!(error = %e, "Activity is kept in memory only");
                (
                    Arc::new(MemoryActivityStore::new()),
                    Arc::new(MemoryWalletConfigStore::new()),
                )
            }
        };

    let (placer, wallet_address): (Arc<dyn OrderPlacer>, String) = if settings.live_trading {
        let live = LiveOrderPlacer::from_key(
            config.private_key()?,
            config.polymarket.clob_url.clone(),
            false,
        )?;
        let address = live.address().to_string();
        info!(address = %address, "Live trading enabled");
        (Arc::new(live), address)
    } else {
        warn!("LIVE_TRADING is off, orders are simulated");
        (Arc::new(PaperOrderPlacer::new()), settings.proxy_wallet.clone())
    };

    // Addresses only: key material never leaves the process.
    wallet_store
        .upsert(&WalletConfig::new(
            &wallet_address,
            &settings.proxy_wallet,
            &settings.user_address,
        ))
        .await?;

    let data = Arc::new(DataApiClient::new(
        config.polymarket.data_api_url.clone(),
        settings.activity_limit,
    )?);
    let balances = Arc::new(PolygonClient::new(
        config
            .polygon
            .rpc_url
            .clone()
            .unwrap_or_else(|| PolygonClient::DEFAULT_RPC_URL.to_string()),
        config.polygon.usdc_contract.clone(),
    )?);

    let ingestor = ActivityIngestor::new(
        activity_store.clone(),
        data.clone(),
        MonitorConfig::new(&settings.user_address, settings.too_old_timestamp),
    );
    ingestor.log_startup_count().await?;

    let trader = CopyTrader::new(
        activity_store,
        data,
        balances,
        ReplicationExecutor::new(placer),
        &settings.user_address,
        &settings.proxy_wallet,
        settings.retry_limit,
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            let _ = shutdown_tx.send(true);
        }
    });

    info!(
        user = %settings.user_address,
        proxy = %settings.proxy_wallet,
        interval_secs = settings.fetch_interval().as_secs(),
        retry_limit = settings.retry_limit,
        "Copying trades"
    );

    tokio::join!(
        ingestor.run(Ticker::new(settings.fetch_interval(), shutdown_rx.clone())),
        trader.run(Ticker::new(settings.fetch_interval(), shutdown_rx)),
    );

    info!("Copy Trader stopped");
    Ok(())
}
