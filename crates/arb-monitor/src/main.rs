//! Arbitrage Monitor
//!
//! Trades brackets on the hourly BTC up/down market whenever the external
//! probability feed runs ahead of the exchange.

use anyhow::{Context, Result};
use arb_monitor::feed::{spawn_feed, MarketDecoder, ProbabilityDecoder, ReconnectPolicy};
use arb_monitor::monitor::{ArbEngine, EngineTimings};
use arb_monitor::OpportunityDetector;
use polymarket_core::api::{ClobClient, GammaClient, PolygonClient};
use polymarket_core::config::{ArbSettings, Config};
use polymarket_core::orders::{LiveOrderPlacer, OrderPlacer, PaperOrderPlacer};
use polymarket_core::schedule::shutdown_channel;
use polymarket_core::telemetry::{init_tracing, touch_health_file};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use trading_engine::{BracketConfig, BracketExecutor};

// Keep websocket and HTTP internals quiet.
const DEFAULT_LOG_FILTER: &str =
    "arb_monitor=info,trading_engine=info,polymarket_core=warn,tungstenite=warn,hyper=warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_LOG_FILTER);

    info!("Starting Arbitrage Monitor");
    touch_health_file();

    let config = Config::from_env()?;
    let settings = ArbSettings::load()?;

    let gamma = GammaClient::new(config.polymarket.gamma_url.clone())?;
    let market = gamma
        .find_hourly_btc_market(chrono::Local::now().naive_local())
        .await
        .context("failed to resolve the current hourly market")?;
    info!(
        question = %market.question,
        up = %market.up.token_id,
        down = %market.down.token_id,
        "Resolved market"
    );

    let (placer, signer_address): (Arc<dyn OrderPlacer>, Option<String>) = if settings.live_trading
    {
        let live = LiveOrderPlacer::from_key(
            config.private_key()?,
            config.polymarket.clob_url.clone(),
            false,
        )?;
        let address = live.address().to_string();
        info!(address = %address, "Live trading enabled");
        (Arc::new(live), Some(address))
    } else {
        warn!("LIVE_TRADING is off, orders are simulated");
        (Arc::new(PaperOrderPlacer::new()), None)
    };
    let wallet = config.wallet.proxy_wallet.clone().or(signer_address);

    let balances = Arc::new(PolygonClient::new(
        config
            .polygon
            .rpc_url
            .clone()
            .unwrap_or_else(|| PolygonClient::DEFAULT_RPC_URL.to_string()),
        config.polygon.usdc_contract.clone(),
    )?);

    let cooldown =
        chrono::Duration::from_std(settings.cooldown()).context("trade cooldown out of range")?;
    let detector = OpportunityDetector::new(
        market.clone(),
        settings.price_difference_threshold,
        cooldown,
    );
    let executor = BracketExecutor::new(placer, BracketConfig::from_settings(&settings));
    let mut engine = ArbEngine::new(
        detector,
        executor,
        balances,
        wallet,
        EngineTimings::from_settings(&settings),
    );
    engine.check_startup_balance().await?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let (events_tx, events_rx) = mpsc::channel(1024);
    let policy = ReconnectPolicy::from_settings(&settings);

    let feeds = vec![
        spawn_feed(
            settings.software_ws_url.clone(),
            policy.clone(),
            ProbabilityDecoder,
            events_tx.clone(),
            shutdown_rx.clone(),
        ),
        spawn_feed(
            config
                .polymarket
                .ws_url
                .clone()
                .unwrap_or_else(|| ClobClient::DEFAULT_WS_URL.to_string()),
            policy,
            MarketDecoder::new(market),
            events_tx,
            shutdown_rx.clone(),
        ),
    ];

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            let _ = signal_tx.send(true);
        }
    });

    let result = engine.run(events_rx, shutdown_rx).await;
    let _ = shutdown_tx.send(true);
    for feed in feeds {
        let _ = feed.await;
    }

    match result {
        Ok(()) => {
            info!(trades = engine.trades().len(), "Arbitrage Monitor stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Arbitrage Monitor stopped with an error");
            Err(e)
        }
    }
}
