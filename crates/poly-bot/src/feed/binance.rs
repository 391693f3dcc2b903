//! Binance trade stream ingestion.
//!
//! The only writer to the shared [`PriceFeed`]. Connects to a single-symbol
//! `@trade` stream, turns each trade into a [`Tick`], and reconnects with
//! exponential backoff when the socket drops.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use poly_common::{CryptoAsset, Tick};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::{FeedError, PriceFeed};

/// Binance WebSocket base URL.
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Configuration for the Binance feed.
#[derive(Debug, Clone)]
pub struct BinanceFeedConfig {
    /// Full stream URL, e.g. `wss://stream.binance.com:9443/ws/btcusdt@trade`.
    pub url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Initial reconnect delay.
    pub initial_reconnect_delay: Duration,
    /// Maximum reconnect delay.
    pub max_reconnect_delay: Duration,
}

impl BinanceFeedConfig {
    /// Trade stream for one asset.
    pub fn for_asset(asset: CryptoAsset) -> Self {
        Self {
            url: format!("{}/{}@trade", BINANCE_WS_URL, asset.binance_symbol()),
            ..Default::default()
        }
    }
}

impl Default for BinanceFeedConfig {
    fn default() -> Self {
        Self {
            url: format!("{}/btcusdt@trade", BINANCE_WS_URL),
            connect_timeout: Duration::from_secs(10),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Binance trade message from the WebSocket stream.
#[derive(Debug, Deserialize)]
struct BinanceTrade {
    /// Event type (always "trade").
    #[serde(rename = "e")]
    event_type: String,
    /// Price as string.
    #[serde(rename = "p")]
    price: String,
    /// Quantity as string.
    #[serde(rename = "q")]
    quantity: String,
    /// Trade time in milliseconds.
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Parse one stream message into a tick.
///
/// Non-trade events and malformed payloads yield `None`.
pub fn parse_trade(text: &str) -> Option<Tick> {
    let trade: BinanceTrade = match serde_json::from_str(text) {
        Ok(t) => t,
        Err(e) => {
            debug!("Ignoring non-trade message: {e}");
            return None;
        }
    };
    if trade.event_type != "trade" {
        return None;
    }

    let price: Decimal = trade.price.parse().ok()?;
    let quantity: Decimal = trade.quantity.parse().ok()?;
    let timestamp = Utc.timestamp_millis_opt(trade.trade_time).single()?;
    (price > Decimal::ZERO).then(|| Tick::new(timestamp, price, quantity))
}

/// Binance WebSocket client feeding a [`PriceFeed`].
pub struct BinanceFeed {
    config: BinanceFeedConfig,
    feed: Arc<PriceFeed>,
}

impl BinanceFeed {
    pub fn new(config: BinanceFeedConfig, feed: Arc<PriceFeed>) -> Self {
        Self { config, feed }
    }

    /// Runs the ingestion loop with automatic reconnection until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), FeedError> {
        let mut reconnect_delay = self.config.initial_reconnect_delay;

        loop {
            if shutdown.try_recv().is_ok() {
                info!("Binance feed: shutdown signal received");
                return Ok(());
            }

            match self.run_connection(&mut shutdown).await {
                Ok(()) => {
                    info!("Binance feed: clean shutdown");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Binance feed error: {e}, reconnecting in {reconnect_delay:?}");

                    tokio::select! {
                        _ = tokio::time::sleep(reconnect_delay) => {}
                        _ = shutdown.recv() => {
                            info!("Binance feed: shutdown during reconnect delay");
                            return Ok(());
                        }
                    }

                    reconnect_delay = (reconnect_delay * 2).min(self.config.max_reconnect_delay);
                }
            }
        }
    }

    /// Runs a single WebSocket connection until error or shutdown.
    async fn run_connection(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), FeedError> {
        info!("Connecting to Binance WebSocket at {}", self.config.url);

        let (ws_stream, _response) =
            match timeout(self.config.connect_timeout, connect_async(self.config.url.as_str())).await {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => return Err(FeedError::Connection(e.to_string())),
                Err(_) => return Err(FeedError::Timeout),
            };

        info!("Connected to Binance WebSocket");
        let (mut write, mut read) = ws_stream.split();
        let mut received: u64 = 0;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(tick) = parse_trade(&text) {
                                self.feed.record(tick);
                                received += 1;
                                if received % 10_000 == 0 {
                                    debug!(received, price = %tick.price, "Binance feed progress");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed by server: {:?}", frame);
                            return Err(FeedError::StreamEnded);
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error: {e}");
                            return Err(FeedError::WebSocket(e));
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Err(FeedError::StreamEnded);
                        }
                        _ => {}
                    }
                }

                _ = shutdown.recv() => {
                    info!("Binance feed: shutdown signal received");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}
