//! Cancellable periodic scheduling for the engine loops.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Create a shutdown channel. Sending `true` stops every [`Ticker`] and
/// loop listening on a cloned receiver.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Periodic tick source that ends on shutdown or after a fixed number of
/// iterations.
pub struct Ticker {
    interval: Interval,
    shutdown: watch::Receiver<bool>,
    shutdown_open: bool,
    remaining: Option<u64>,
}

impl Ticker {
    /// Tick every `period` until shutdown. The first tick fires immediately.
    pub fn new(period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            shutdown,
            shutdown_open: true,
            remaining: None,
        }
    }

    /// Tick at most `iterations` times.
    pub fn limited(period: Duration, shutdown: watch::Receiver<bool>, iterations: u64) -> Self {
        let mut ticker = Self::new(period, shutdown);
        ticker.remaining = Some(iterations);
        ticker
    }

    /// Wait for the next tick. Returns `false` once the ticker is finished.
    pub async fn tick(&mut self) -> bool {
        if self.remaining == Some(0) || *self.shutdown.borrow() {
            return false;
        }

        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed(), if self.shutdown_open => {
                    match changed {
                        Ok(()) if *self.shutdown.borrow() => return false,
                        Ok(()) => {}
                        // Sender gone: nobody can stop us any more, keep ticking.
                        Err(_) => self.shutdown_open = false,
                    }
                }
                _ = self.interval.tick() => break,
            }
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        true
    }
}

/// Sleep for `duration` unless shutdown fires first. Returns `false` on
/// shutdown.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return false,
                Ok(()) => {}
                Err(_) => {
                    (&mut sleep).await;
                    return true;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limited_ticker_stops_after_iterations() {
        let (_tx, rx) = shutdown_channel();
        let mut ticker = Ticker::limited(Duration::from_secs(1), rx, 3);

        let mut count = 0;
        while ticker.tick().await {
            count += 1;
        }
        assert_eq!(count, 3);
        assert!(!ticker.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_shutdown() {
        let (tx, rx) = shutdown_channel();
        let mut ticker = Ticker::new(Duration::from_secs(1), rx);

        assert!(ticker.tick().await);
        tx.send(true).unwrap();
        assert!(!ticker.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_survives_dropped_sender() {
        let (tx, rx) = shutdown_channel();
        let mut ticker = Ticker::limited(Duration::from_secs(1), rx, 2);
        drop(tx);

        assert!(ticker.tick().await);
        assert!(ticker.tick().await);
        assert!(!ticker.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_shutdown() {
        let (tx, mut rx) = shutdown_channel();
        assert!(sleep_or_shutdown(Duration::from_secs(5), &mut rx).await);

        tx.send(true).unwrap();
        assert!(!sleep_or_shutdown(Duration::from_secs(5), &mut rx).await);
    }
}
