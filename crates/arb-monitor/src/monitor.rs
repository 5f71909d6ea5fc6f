//! Engine loop for the divergence bracket trader.

use crate::detector::{OpportunityDetector, Signal};
use crate::feed::FeedEvent;
use crate::prices::PriceStore;
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use polymarket_core::api::BalanceSource;
use polymarket_core::config::ArbSettings;
use polymarket_core::telemetry::touch_health_file;
use polymarket_core::types::{OutcomeSide, PriceSource};
use polymarket_core::Error;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use trading_engine::{BracketExecutor, BracketTrade};

#[derive(Debug, Clone)]
pub struct EngineTimings {
    pub check_interval: std::time::Duration,
    pub status_interval: Duration,
    pub balance_interval: Duration,
}

impl EngineTimings {
    pub fn from_settings(settings: &ArbSettings) -> Self {
        Self {
            check_interval: settings.check_interval(),
            status_interval: Duration::seconds(settings.status_interval_secs as i64),
            balance_interval: Duration::seconds(settings.balance_check_interval_secs as i64),
        }
    }
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            check_interval: std::time::Duration::from_secs(1),
            status_interval: Duration::seconds(30),
            balance_interval: Duration::seconds(60),
        }
    }
}

/// Engine context: owns the price table, detector and bracket executor, and
/// is the only thing that mutates them.
pub struct ArbEngine {
    prices: PriceStore,
    detector: OpportunityDetector,
    executor: BracketExecutor,
    balances: Arc<dyn BalanceSource>,
    /// Wallet whose collateral funds the brackets. Balance checks are
    /// skipped without one.
    wallet: Option<String>,
    timings: EngineTimings,
    last_status: Option<DateTime<Utc>>,
    last_balance_check: Option<DateTime<Utc>>,
}

impl ArbEngine {
    pub fn new(
        detector: OpportunityDetector,
        executor: BracketExecutor,
        balances: Arc<dyn BalanceSource>,
        wallet: Option<String>,
        timings: EngineTimings,
    ) -> Self {
        Self {
            prices: PriceStore::new(),
            detector,
            executor,
            balances,
            wallet,
            timings,
            last_status: None,
            last_balance_check: None,
        }
    }

    pub fn detector(&self) -> &OpportunityDetector {
        &self.detector
    }

    pub fn trades(&self) -> &[BracketTrade] {
        self.executor.trades()
    }

    /// Refuse to start without enough collateral for one bracket.
    pub async fn check_startup_balance(&mut self) -> Result<()> {
        let Some(wallet) = self.wallet.as_deref() else {
            info!("No wallet configured, skipping balance check");
            return Ok(());
        };
        let notional = self.executor.config().notional;
        let balance = self.balances.usdc_balance(wallet).await;
        self.last_balance_check = Some(Utc::now());
        info!(wallet = wallet, balance = %balance, "USDC balance");
        if balance < notional {
            bail!(
                "insufficient USDC balance: {} available, {} required per trade",
                balance,
                notional
            );
        }
        Ok(())
    }

    /// Apply a feed event. A stalled feed is fatal.
    pub fn handle_event(&mut self, event: FeedEvent, now: DateTime<Utc>) -> Result<()> {
        match event {
            FeedEvent::Update(update) => {
                self.prices.apply(&update, now);
                Ok(())
            }
            FeedEvent::Stalled { feed, attempts } => {
                error!(feed = %feed, attempts = attempts, "Feed stalled, stopping engine");
                Err(Error::FeedStalled { feed, attempts }.into())
            }
        }
    }

    /// One detection step. Returns the trade placed, if any.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Option<BracketTrade> {
        let signal = self.detector.check(&self.prices, now)?;
        self.act_on(signal, now).await
    }

    async fn act_on(&mut self, signal: Signal, now: DateTime<Utc>) -> Option<BracketTrade> {
        info!(
            side = %signal.instrument.side,
            feed = %signal.feed_price,
            market = %signal.market_price,
            difference = %signal.difference,
            "Divergence detected"
        );

        match self
            .executor
            .execute(&signal.instrument, signal.market_price)
            .await
        {
            Ok(trade) => {
                self.detector.mark_acted(now);
                Some(trade)
            }
            Err(e) => {
                warn!(
                    token_id = %signal.instrument.token_id,
                    error = %e,
                    "Bracket entry failed, shortening cooldown"
                );
                self.detector.recover_partial(now);
                None
            }
        }
    }

    async fn periodic(&mut self, now: DateTime<Utc>) {
        if is_due(self.last_status, now, self.timings.status_interval) {
            self.last_status = Some(now);
            self.log_status();
            touch_health_file();
        }

        if is_due(self.last_balance_check, now, self.timings.balance_interval) {
            self.last_balance_check = Some(now);
            if let Some(wallet) = self.wallet.as_deref() {
                let balance = self.balances.usdc_balance(wallet).await;
                let notional = self.executor.config().notional;
                if balance < notional {
                    warn!(balance = %balance, required = %notional, "Low USDC balance");
                }
            }
        }
    }

    fn log_status(&self) {
        let price = |source, side| self.prices.get_price(source, side);
        info!(
            feed_up = %price(PriceSource::Feed, OutcomeSide::Up),
            feed_down = %price(PriceSource::Feed, OutcomeSide::Down),
            market_up = %price(PriceSource::Market, OutcomeSide::Up),
            market_down = %price(PriceSource::Market, OutcomeSide::Down),
            trades = self.executor.trades().len(),
            open = self.executor.active_trades().count(),
            "Status"
        );
    }

    /// Run until shutdown or a fatal feed condition.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<FeedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.timings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            market = %self.detector.market().question,
            "Monitoring for divergence"
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        return Ok(());
                    }
                }
                event = events.recv() => {
                    let event = event.ok_or_else(|| anyhow!("all feeds closed"))?;
                    self.handle_event(event, Utc::now())?;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    self.tick(now).await;
                    self.periodic(now).await;
                }
            }
        }
    }
}

fn is_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, every: Duration) -> bool {
    last.map_or(true, |last| now - last >= every)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::PriceUpdate;
    use async_trait::async_trait;
    use polymarket_core::orders::{OrderPlacer, PaperOrderPlacer};
    use polymarket_core::schedule::shutdown_channel;
    use polymarket_core::types::{Instrument, MarketPair, OrderRequest, PlacedOrder};
    use tokio_test::{assert_err, assert_ok};
    use trading_engine::BracketConfig;

    struct FixedBalance(Decimal);

    #[async_trait]
    impl BalanceSource for FixedBalance {
        async fn usdc_balance(&self, _address: &str) -> Decimal {
            self.0
        }
    }

    struct RejectAll;

    #[async_trait]
    impl OrderPlacer for RejectAll {
        async fn place_order(&self, _request: &OrderRequest) -> polymarket_core::Result<PlacedOrder> {
            Err(Error::order("rejected"))
        }
    }

    fn pair() -> MarketPair {
        MarketPair {
            condition_id: "0xcond".to_string(),
            question: "Bitcoin Up or Down".to_string(),
            up: Instrument {
                token_id: "111".to_string(),
                side: OutcomeSide::Up,
            },
            down: Instrument {
                token_id: "222".to_string(),
                side: OutcomeSide::Down,
            },
        }
    }

    fn engine(placer: Arc<dyn OrderPlacer>, balance: Decimal) -> ArbEngine {
        let detector = OpportunityDetector::new(pair(), Decimal::new(15, 3), Duration::seconds(30));
        let executor = BracketExecutor::new(
            placer,
            BracketConfig {
                settle_delay: std::time::Duration::ZERO,
                ..BracketConfig::default()
            },
        );
        ArbEngine::new(
            detector,
            executor,
            Arc::new(FixedBalance(balance)),
            Some("0xme".to_string()),
            EngineTimings::default(),
        )
    }

    fn diverge(engine: &mut ArbEngine, now: DateTime<Utc>) {
        for update in [
            PriceUpdate::Feed {
                side: OutcomeSide::Up,
                value: Decimal::new(62, 2),
            },
            PriceUpdate::Book {
                side: OutcomeSide::Up,
                best_bid: Decimal::new(59, 2),
                best_ask: Decimal::new(61, 2),
            },
        ] {
            engine.handle_event(FeedEvent::Update(update), now).unwrap();
        }
    }

    #[tokio::test]
    async fn test_startup_balance_gate() {
        let placer = Arc::new(PaperOrderPlacer::new());
        assert_ok!(
            engine(placer.clone(), Decimal::new(5, 0))
                .check_startup_balance()
                .await
        );
        assert_err!(
            engine(placer, Decimal::new(499, 2))
                .check_startup_balance()
                .await
        );
    }

    #[tokio::test]
    async fn test_signal_places_bracket_and_starts_cooldown() {
        let placer = Arc::new(PaperOrderPlacer::new());
        let mut engine = engine(placer.clone(), Decimal::new(100, 0));
        let now = Utc::now();
        diverge(&mut engine, now);

        let trade = engine.tick(now).await.unwrap();
        assert_eq!(trade.entry_price, Decimal::new(60, 2));
        assert_eq!(placer.placed().await.len(), 3);
        assert_eq!(engine.detector().last_signal_time(), Some(now));

        assert!(engine.tick(now + Duration::seconds(10)).await.is_none());
        assert_eq!(engine.trades().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_entry_halves_cooldown() {
        let mut engine = engine(Arc::new(RejectAll), Decimal::new(100, 0));
        let now = Utc::now();
        diverge(&mut engine, now);

        assert!(engine.tick(now).await.is_none());
        assert!(engine.trades().is_empty());
        assert_eq!(
            engine.detector().last_signal_time(),
            Some(now - Duration::seconds(15))
        );
    }

    #[tokio::test]
    async fn test_stalled_feed_is_fatal() {
        let mut engine = engine(Arc::new(PaperOrderPlacer::new()), Decimal::new(100, 0));
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();

        tx.send(FeedEvent::Stalled {
            feed: "market".to_string(),
            attempts: 10,
        })
        .await
        .unwrap();

        let err = engine.run(rx, shutdown_rx).await.unwrap_err();
        assert!(err.to_string().contains("stalled"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut engine = engine(Arc::new(PaperOrderPlacer::new()), Decimal::new(100, 0));
        let (_tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let run = tokio::spawn(async move { engine.run(rx, shutdown_rx).await });
        shutdown_tx.send(true).unwrap();
        assert!(run.await.unwrap().is_ok());
    }
}
