//! Reference price feed.
//!
//! [`TickBuffer`] is the bounded rolling store that the signal detectors
//! read. [`PriceFeed`] wraps it behind a `parking_lot::RwLock` so a single
//! ingestion task (see [`binance`]) can write while any number of strategy
//! instances read concurrently.
//!
//! ## Ordering
//!
//! Ticks are kept oldest → newest. A tick older than the newest one already
//! buffered is dropped, so detectors can always scan front to back.

pub mod binance;

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use poly_common::Tick;
use rust_decimal::Decimal;
use thiserror::Error;

pub use binance::{BinanceFeed, BinanceFeedConfig};

/// Default buffer capacity (~10 minutes of BTCUSDT trades at a busy rate).
pub const DEFAULT_BUFFER_CAPACITY: usize = 30_000;

/// Errors from the tick transport.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("WebSocket connection failed: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Connection timeout")]
    Timeout,

    #[error("Stream ended unexpectedly")]
    StreamEnded,
}

/// Fixed-capacity, time-ordered FIFO of ticks.
#[derive(Debug, Clone)]
pub struct TickBuffer {
    ticks: VecDeque<Tick>,
    capacity: usize,
}

impl TickBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ticks: VecDeque::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
        }
    }

    /// Build a buffer from ticks already in time order.
    pub fn from_ticks(capacity: usize, ticks: impl IntoIterator<Item = Tick>) -> Self {
        let mut buffer = Self::new(capacity);
        for tick in ticks {
            buffer.push(tick);
        }
        buffer
    }

    /// Append a tick, evicting the oldest when full.
    ///
    /// Returns false if the tick was older than the newest buffered tick.
    pub fn push(&mut self, tick: Tick) -> bool {
        if let Some(last) = self.ticks.back()
            && tick.timestamp < last.timestamp
        {
            return false;
        }
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
        true
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Tick> {
        self.ticks.back()
    }

    pub fn oldest(&self) -> Option<&Tick> {
        self.ticks.front()
    }

    /// Iterate oldest → newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Tick> + '_ {
        self.ticks.iter()
    }

    /// Ticks at or after `cutoff`, oldest first.
    pub fn since(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &Tick> + '_ {
        // Scan from the back so short horizons stay cheap on a full buffer.
        let newer = self
            .ticks
            .iter()
            .rev()
            .take_while(|t| t.timestamp >= cutoff)
            .count();
        self.ticks.iter().skip(self.ticks.len() - newer)
    }
}

/// Shared, single-writer reference price feed.
#[derive(Debug)]
pub struct PriceFeed {
    buffer: RwLock<TickBuffer>,
    staleness: Duration,
}

impl PriceFeed {
    pub fn new(capacity: usize, staleness: Duration) -> Self {
        Self {
            buffer: RwLock::new(TickBuffer::new(capacity)),
            staleness,
        }
    }

    /// Record a tick from the ingestion task.
    pub fn record(&self, tick: Tick) -> bool {
        self.buffer.write().push(tick)
    }

    /// Most recent reference price.
    pub fn current_price(&self) -> Option<Decimal> {
        self.buffer.read().latest().map(|t| t.price)
    }

    /// Timestamp of the most recent tick.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.buffer.read().latest().map(|t| t.timestamp)
    }

    /// True when the newest tick is younger than the staleness threshold.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.last_update()
            .is_some_and(|ts| now - ts < self.staleness)
    }

    /// Copy of the ticks received within `horizon` of `now`.
    pub fn ticks_since(&self, now: DateTime<Utc>, horizon: Duration) -> TickBuffer {
        let buffer = self.buffer.read();
        let ticks: Vec<Tick> = buffer.since(now - horizon).copied().collect();
        TickBuffer::from_ticks(ticks.len().max(1), ticks)
    }

    /// Run `f` against the live buffer under the read lock.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&TickBuffer) -> R) -> R {
        f(&self.buffer.read())
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(base: DateTime<Utc>, secs: i64, price: Decimal) -> Tick {
        Tick::new(base + Duration::seconds(secs), price, dec!(0.1))
    }

    #[test]
    fn test_tick_buffer_evicts_oldest() {
        let base = Utc::now();
        let mut buffer = TickBuffer::new(3);
        for i in 0..5 {
            buffer.push(tick(base, i, Decimal::from(100 + i)));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest().unwrap().price, dec!(102));
        assert_eq!(buffer.latest().unwrap().price, dec!(104));
    }

    #[test]
    fn test_tick_buffer_rejects_out_of_order() {
        let base = Utc::now();
        let mut buffer = TickBuffer::new(10);
        assert!(buffer.push(tick(base, 5, dec!(100))));
        assert!(!buffer.push(tick(base, 4, dec!(99))));
        // Equal timestamps are fine (several trades per millisecond).
        assert!(buffer.push(tick(base, 5, dec!(101))));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_tick_buffer_since() {
        let base = Utc::now();
        let buffer = TickBuffer::from_ticks(10, (0..6).map(|i| tick(base, i, Decimal::from(i))));

        let recent: Vec<Decimal> = buffer.since(base + Duration::seconds(3)).map(|t| t.price).collect();
        assert_eq!(recent, vec![dec!(3), dec!(4), dec!(5)]);
        assert_eq!(buffer.since(base + Duration::seconds(10)).count(), 0);
    }

    #[test]
    fn test_price_feed_liveness() {
        let base = Utc::now();
        let feed = PriceFeed::new(100, Duration::seconds(10));
        assert!(!feed.is_live(base));
        assert_eq!(feed.current_price(), None);

        feed.record(tick(base, 0, dec!(100000)));
        assert_eq!(feed.current_price(), Some(dec!(100000)));
        assert!(feed.is_live(base + Duration::seconds(9)));
        assert!(!feed.is_live(base + Duration::seconds(10)));
    }

    #[test]
    fn test_price_feed_ticks_since() {
        let base = Utc::now();
        let feed = PriceFeed::new(100, Duration::seconds(10));
        for i in 0..10 {
            feed.record(tick(base, i, Decimal::from(i)));
        }

        let window = feed.ticks_since(base + Duration::seconds(9), Duration::seconds(2));
        assert_eq!(window.len(), 3);
        assert_eq!(window.oldest().unwrap().price, dec!(7));
        assert_eq!(feed.with_buffer(|b| b.len()), 10);
    }
}
