//! Reconnecting WebSocket feeds.
//!
//! ```text
//!            on_connect_started           on_open
//! Disconnected ──────────────► Connecting ───────► Connected
//!                                  ▲                   │ on_closed
//!                on_backoff_elapsed│                   ▼
//!                                  └──── Backoff ◄─────┤
//!                                                      │ failures >= max
//!                                                      ▼
//!                                                   Stalled
//! ```
//!
//! [`ReconnectMachine`] owns the timing rules and never touches a socket;
//! [`run_feed`] drives it against a real connection and forwards decoded
//! frames to the engine over an mpsc channel.

use futures_util::{SinkExt, StreamExt};
use polymarket_core::api::clob::{MarketChannel, MarketEvent};
use polymarket_core::config::ArbSettings;
use polymarket_core::schedule::sleep_or_shutdown;
use polymarket_core::types::{MarketPair, OutcomeSide};
use polymarket_core::{Error, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Reconnect and liveness timing for one feed.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures tolerated before the feed is stalled.
    pub max_attempts: u32,
    pub connect_timeout: Duration,
    /// A connection that delivers nothing for this long is dropped.
    pub idle_timeout: Duration,
    pub ping_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(120),
            ping_interval: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &ArbSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(settings.reconnect_max_delay_ms),
            max_attempts: settings.max_reconnect_attempts,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            idle_timeout: Duration::from_secs(settings.read_idle_timeout_secs),
            ..Self::default()
        }
    }

    /// Delay before connection attempt `attempt` (the initial connection is
    /// attempt 1): `min(base * 2^(attempt - 1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Connection lifecycle of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Backoff { attempt: u32, delay: Duration },
    Stalled { attempts: u32 },
}

/// Pure reconnect state machine.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: FeedState,
    failures: u32,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: FeedState::Disconnected,
            failures: 0,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Consecutive failed or closed connections since the last open.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self.state, FeedState::Stalled { .. })
    }

    pub fn on_connect_started(&mut self) -> FeedState {
        if !self.is_stalled() {
            self.state = FeedState::Connecting {
                attempt: self.failures + 1,
            };
        }
        self.state
    }

    pub fn on_open(&mut self) -> FeedState {
        if !self.is_stalled() {
            self.failures = 0;
            self.state = FeedState::Connected;
        }
        self.state
    }

    /// A connection failed to open, timed out or was closed.
    pub fn on_closed(&mut self) -> FeedState {
        if self.is_stalled() {
            return self.state;
        }
        self.failures = self.failures.saturating_add(1);
        self.state = if self.failures >= self.policy.max_attempts {
            FeedState::Stalled {
                attempts: self.failures,
            }
        } else {
            let attempt = self.failures + 1;
            FeedState::Backoff {
                attempt,
                delay: self.policy.delay_for_attempt(attempt),
            }
        };
        self.state
    }

    pub fn on_backoff_elapsed(&mut self) -> FeedState {
        if let FeedState::Backoff { attempt, .. } = self.state {
            self.state = FeedState::Connecting { attempt };
        }
        self.state
    }
}

/// Price observation decoded from a feed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceUpdate {
    /// External probability for one side.
    Feed { side: OutcomeSide, value: Decimal },
    /// Exchange book top for one side.
    Book {
        side: OutcomeSide,
        best_bid: Decimal,
        best_ask: Decimal,
    },
    /// Exchange last trade price for one side.
    Last { side: OutcomeSide, price: Decimal },
}

/// Message from a feed driver to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Update(PriceUpdate),
    /// The feed gave up reconnecting.
    Stalled { feed: String, attempts: u32 },
}

/// Protocol of one feed: what to send on open and how to read frames.
pub trait FrameDecoder: Send + 'static {
    fn name(&self) -> &str;

    /// Frame sent once right after the socket opens.
    fn subscribe_message(&self) -> Option<String> {
        None
    }

    /// Application-level keep-alive frame sent every ping interval.
    fn keepalive(&self) -> Option<String> {
        None
    }

    #[allow(clippy::result_large_err)]
    fn decode(&mut self, text: &str) -> Result<Vec<PriceUpdate>>;
}

#[derive(Debug, Deserialize)]
struct ProbabilityFrame {
    #[serde(default)]
    prob_up: Option<f64>,
    #[serde(default)]
    prob_down: Option<f64>,
}

/// Decode `{"prob_up": <percent>, "prob_down": <percent>}`. Only the fields
/// present in the frame produce updates.
#[allow(clippy::result_large_err)]
pub fn decode_probability_frame(text: &str) -> Result<Vec<PriceUpdate>> {
    let frame: ProbabilityFrame = serde_json::from_str(text)?;
    let mut updates = Vec::with_capacity(2);
    for (side, percent) in [
        (OutcomeSide::Up, frame.prob_up),
        (OutcomeSide::Down, frame.prob_down),
    ] {
        let Some(percent) = percent else { continue };
        let value = Decimal::from_f64(percent).ok_or_else(|| Error::InvalidPrice {
            value: format!("{}%", percent),
        })? / Decimal::ONE_HUNDRED;
        updates.push(PriceUpdate::Feed { side, value });
    }
    Ok(updates)
}

/// External probability feed.
#[derive(Debug, Default)]
pub struct ProbabilityDecoder;

impl FrameDecoder for ProbabilityDecoder {
    fn name(&self) -> &str {
        "probability"
    }

    fn decode(&mut self, text: &str) -> Result<Vec<PriceUpdate>> {
        decode_probability_frame(text)
    }
}

/// Polymarket CLOB market channel for one up/down pair.
#[derive(Debug)]
pub struct MarketDecoder {
    market: MarketPair,
    channel: MarketChannel,
}

impl MarketDecoder {
    pub fn new(market: MarketPair) -> Self {
        Self {
            market,
            channel: MarketChannel::new(),
        }
    }
}

impl FrameDecoder for MarketDecoder {
    fn name(&self) -> &str {
        "market"
    }

    fn subscribe_message(&self) -> Option<String> {
        Some(MarketChannel::subscribe_message(&self.market.token_ids()))
    }

    fn keepalive(&self) -> Option<String> {
        Some("PING".to_string())
    }

    fn decode(&mut self, text: &str) -> Result<Vec<PriceUpdate>> {
        let events = self.channel.decode(text)?;
        Ok(events
            .into_iter()
            .filter_map(|event| match event {
                MarketEvent::BookTop {
                    asset_id,
                    best_bid: Some(best_bid),
                    best_ask: Some(best_ask),
                } => Some(PriceUpdate::Book {
                    side: self.market.side_of(&asset_id)?,
                    best_bid,
                    best_ask,
                }),
                MarketEvent::BookTop { .. } => None,
                MarketEvent::LastTrade { asset_id, price } => Some(PriceUpdate::Last {
                    side: self.market.side_of(&asset_id)?,
                    price,
                }),
            })
            .collect())
    }
}

/// How a single connection ended.
enum SessionEnd {
    Closed,
    Shutdown,
    ReceiverGone,
}

/// Run one feed until shutdown, or until it stalls.
///
/// Only one socket exists at a time: a session is fully torn down before the
/// next connection attempt starts.
pub async fn run_feed<D: FrameDecoder>(
    url: String,
    policy: ReconnectPolicy,
    mut decoder: D,
    tx: mpsc::Sender<FeedEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut machine = ReconnectMachine::new(policy.clone());
    machine.on_connect_started();

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match run_session(&url, &policy, &mut decoder, &tx, &mut machine, &mut shutdown).await {
            Ok(SessionEnd::Shutdown) => {
                info!(feed = decoder.name(), "Feed shut down");
                return Ok(());
            }
            Ok(SessionEnd::ReceiverGone) => {
                info!(feed = decoder.name(), "Feed receiver dropped, stopping");
                return Ok(());
            }
            Ok(SessionEnd::Closed) => {
                info!(feed = decoder.name(), "Feed connection closed");
            }
            Err(e) => {
                warn!(feed = decoder.name(), error = %e, "Feed connection failed");
            }
        }

        match machine.on_closed() {
            FeedState::Stalled { attempts } => {
                error!(feed = decoder.name(), attempts = attempts, "Feed stalled");
                return Err(Error::FeedStalled {
                    feed: decoder.name().to_string(),
                    attempts,
                });
            }
            FeedState::Backoff { attempt, delay } => {
                warn!(
                    feed = decoder.name(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting feed"
                );
                if !sleep_or_shutdown(delay, &mut shutdown).await {
                    return Ok(());
                }
                machine.on_backoff_elapsed();
            }
            state => debug!(feed = decoder.name(), ?state, "Unexpected feed state"),
        }
    }
}

async fn run_session<D: FrameDecoder>(
    url: &str,
    policy: &ReconnectPolicy,
    decoder: &mut D,
    tx: &mpsc::Sender<FeedEvent>,
    machine: &mut ReconnectMachine,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let (ws_stream, _) = tokio::time::timeout(policy.connect_timeout, connect_async(url))
        .await
        .map_err(|_| Error::Api {
            message: format!(
                "Connect timed out after {}s",
                policy.connect_timeout.as_secs()
            ),
            status: None,
        })??;
    let (mut write, mut read) = ws_stream.split();

    machine.on_open();
    info!(feed = decoder.name(), "Feed connected");

    if let Some(subscribe) = decoder.subscribe_message() {
        write.send(Message::Text(subscribe)).await?;
    }

    let keepalive = decoder.keepalive();
    let mut ping_tick = tokio::time::interval(policy.ping_interval);
    ping_tick.tick().await;

    // Only reset when a frame actually arrives, not on our own pings.
    let read_deadline = tokio::time::sleep(policy.idle_timeout);
    tokio::pin!(read_deadline);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
            _ = ping_tick.tick(), if keepalive.is_some() => {
                if let Some(frame) = keepalive.as_ref() {
                    write.send(Message::Text(frame.clone())).await?;
                }
            }
            _ = &mut read_deadline => {
                warn!(
                    feed = decoder.name(),
                    timeout_secs = policy.idle_timeout.as_secs(),
                    "Feed read timed out without messages"
                );
                return Ok(SessionEnd::Closed);
            }
            msg = read.next() => {
                read_deadline
                    .as_mut()
                    .reset(tokio::time::Instant::now() + policy.idle_timeout);

                let Some(msg) = msg else {
                    return Ok(SessionEnd::Closed);
                };

                match msg? {
                    Message::Text(text) => match decoder.decode(&text) {
                        Ok(updates) => {
                            for update in updates {
                                if tx.send(FeedEvent::Update(update)).await.is_err() {
                                    return Ok(SessionEnd::ReceiverGone);
                                }
                            }
                        }
                        Err(e) => {
                            warn!(feed = decoder.name(), error = %e, "Dropping malformed frame");
                        }
                    },
                    Message::Ping(data) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Message::Close(_) => {
                        return Ok(SessionEnd::Closed);
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Spawn a feed driver. A stall is reported to the engine as
/// [`FeedEvent::Stalled`].
pub fn spawn_feed<D: FrameDecoder>(
    url: String,
    policy: ReconnectPolicy,
    decoder: D,
    tx: mpsc::Sender<FeedEvent>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let feed = decoder.name().to_string();
        if let Err(e) = run_feed(url, policy, decoder, tx.clone(), shutdown).await {
            let attempts = match e {
                Error::FeedStalled { attempts, .. } => attempts,
                _ => 0,
            };
            let _ = tx.send(FeedEvent::Stalled { feed, attempts }).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::schedule::shutdown_channel;
    use polymarket_core::types::Instrument;
    use tokio::net::TcpListener;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), secs(5));
        assert_eq!(policy.delay_for_attempt(2), secs(10));
        assert_eq!(policy.delay_for_attempt(4), secs(40));
        assert_eq!(policy.delay_for_attempt(5), secs(60));
        assert_eq!(policy.delay_for_attempt(40), secs(60));
    }

    #[test]
    fn test_three_closes_then_open() {
        let mut machine = ReconnectMachine::new(ReconnectPolicy::default());
        assert_eq!(machine.on_connect_started(), FeedState::Connecting { attempt: 1 });

        let mut delays = Vec::new();
        for _ in 0..3 {
            match machine.on_closed() {
                FeedState::Backoff { delay, .. } => delays.push(delay),
                other => panic!("unexpected state {:?}", other),
            }
            assert!(matches!(machine.on_backoff_elapsed(), FeedState::Connecting { .. }));
        }
        assert_eq!(delays, vec![secs(10), secs(20), secs(40)]);
        assert_eq!(machine.state(), FeedState::Connecting { attempt: 4 });

        assert_eq!(machine.on_open(), FeedState::Connected);
        assert_eq!(machine.failures(), 0);
        assert_eq!(
            machine.on_closed(),
            FeedState::Backoff {
                attempt: 2,
                delay: secs(10)
            }
        );
    }

    #[test]
    fn test_stalls_after_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        };
        let mut machine = ReconnectMachine::new(policy);
        machine.on_connect_started();

        machine.on_closed();
        machine.on_backoff_elapsed();
        machine.on_closed();
        machine.on_backoff_elapsed();
        assert_eq!(machine.on_closed(), FeedState::Stalled { attempts: 3 });

        // Stalled is terminal.
        assert!(machine.is_stalled());
        assert_eq!(machine.on_open(), FeedState::Stalled { attempts: 3 });
        assert_eq!(machine.on_connect_started(), FeedState::Stalled { attempts: 3 });
    }

    #[test]
    fn test_probability_frame() {
        let updates = decode_probability_frame(r#"{"prob_up": 62, "prob_down": 38.5}"#).unwrap();
        assert_eq!(
            updates,
            vec![
                PriceUpdate::Feed {
                    side: OutcomeSide::Up,
                    value: Decimal::new(62, 2)
                },
                PriceUpdate::Feed {
                    side: OutcomeSide::Down,
                    value: Decimal::new(385, 3)
                },
            ]
        );

        let partial = decode_probability_frame(r#"{"prob_down": 40}"#).unwrap();
        assert_eq!(partial.len(), 1);

        assert!(decode_probability_frame("not json").is_err());
        assert!(decode_probability_frame(r#"{"prob_up": "high"}"#).is_err());
    }

    #[test]
    fn test_unrepresentable_probability_is_invalid_price() {
        let err = decode_probability_frame(r#"{"prob_up": 1e40}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidPrice { .. }), "got {:?}", err);
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

    #[test]
    fn test_market_decoder_maps_tokens_to_sides() {
        let mut decoder = MarketDecoder::new(pair());
        let subscribe = decoder.subscribe_message().unwrap();
        assert!(subscribe.contains("111") && subscribe.contains("222"));
        assert_eq!(decoder.keepalive().as_deref(), Some("PING"));

        let updates = decoder
            .decode(
                r#"[{"event_type":"book","asset_id":"222","market":"0xcond",
                    "bids":[{"price":"0.37","size":"10"}],
                    "asks":[{"price":"0.39","size":"10"}]},
                   {"event_type":"last_trade_price","asset_id":"111","price":"0.61"},
                   {"event_type":"last_trade_price","asset_id":"999","price":"0.50"}]"#,
            )
            .unwrap();
        assert_eq!(
            updates,
            vec![
                PriceUpdate::Book {
                    side: OutcomeSide::Down,
                    best_bid: Decimal::new(37, 2),
                    best_ask: Decimal::new(39, 2),
                },
                PriceUpdate::Last {
                    side: OutcomeSide::Up,
                    price: Decimal::new(61, 2),
                },
            ]
        );
        assert!(decoder.decode("PONG").unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_feed_stalls() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            connect_timeout: Duration::from_millis(100),
            ..ReconnectPolicy::default()
        };
        let (tx, _rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();

        let result = run_feed(
            "ws://127.0.0.1:1".to_string(),
            policy,
            ProbabilityDecoder,
            tx,
            shutdown_rx,
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::FeedStalled { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_drop_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for frame in [r#"{"prob_up": 62}"#, "garbage", r#"{"prob_down": 38}"#] {
                ws.send(Message::Text(frame.to_string())).await.unwrap();
            }
            // Hold the socket until the client closes it.
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let handle = spawn_feed(
            format!("ws://{}", addr),
            ReconnectPolicy::default(),
            ProbabilityDecoder,
            tx,
            shutdown_rx,
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(
            first,
            FeedEvent::Update(PriceUpdate::Feed {
                side: OutcomeSide::Up,
                value: Decimal::new(62, 2)
            })
        );
        assert_eq!(
            second,
            FeedEvent::Update(PriceUpdate::Feed {
                side: OutcomeSide::Down,
                value: Decimal::new(38, 2)
            })
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        server.await.unwrap();
    }
}
