//! Shared types for the Polymarket 5-minute momentum bot.
//!
//! CRITICAL: All prices and quantities use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reference asset a market window is keyed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CryptoAsset {
    #[default]
    Btc,
    Eth,
}

impl CryptoAsset {
    /// Returns the Binance trading pair symbol (e.g., "btcusdt").
    pub fn binance_symbol(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "btcusdt",
            CryptoAsset::Eth => "ethusdt",
        }
    }

    /// Returns the display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "BTC",
            CryptoAsset::Eth => "ETH",
        }
    }

    /// Title/question keywords identifying this asset.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            CryptoAsset::Btc => &["btc", "bitcoin"],
            CryptoAsset::Eth => &["eth", "ethereum"],
        }
    }
}

impl std::fmt::Display for CryptoAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CryptoAsset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(CryptoAsset::Btc),
            "eth" | "ethereum" => Ok(CryptoAsset::Eth),
            _ => Err(format!("Unknown asset: {}", s)),
        }
    }
}

/// Market window duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowDuration {
    /// 5-minute markets.
    #[default]
    FiveMin,
    /// 15-minute markets.
    FifteenMin,
}

impl WindowDuration {
    /// Returns the duration in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            WindowDuration::FiveMin => 300,
            WindowDuration::FifteenMin => 900,
        }
    }

    /// Returns the duration as chrono::Duration.
    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds())
    }

    /// Keywords to match in market titles.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            WindowDuration::FiveMin => &["5 min", "5-min", "5min", "5 minute"],
            WindowDuration::FifteenMin => &["15 min", "15-min", "15min", "15 minute"],
        }
    }

    /// Pattern to match in market slugs (more reliable than titles).
    pub fn slug_patterns(&self) -> &'static [&'static str] {
        match self {
            WindowDuration::FiveMin => &["updown-5m", "-5m-"],
            WindowDuration::FifteenMin => &["updown-15m", "-15m-"],
        }
    }

    /// Returns the Polymarket tag_slug for API queries.
    pub fn tag_slug(&self) -> &'static str {
        match self {
            WindowDuration::FiveMin => "5M",
            WindowDuration::FifteenMin => "15M",
        }
    }

    /// Returns the display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowDuration::FiveMin => "5m",
            WindowDuration::FifteenMin => "15m",
        }
    }
}

impl std::fmt::Display for WindowDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WindowDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "5min" | "5m" | "5" => Ok(WindowDuration::FiveMin),
            "15min" | "15m" | "15" => Ok(WindowDuration::FifteenMin),
            _ => Err(format!("Unknown window duration: {}", s)),
        }
    }
}

/// One side of a two-outcome up/down market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Up,
    Down,
}

impl Outcome {
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Up => Outcome::Down,
            Outcome::Down => Outcome::Up,
        }
    }

    /// Side implied by a signed reference-price move.
    ///
    /// Returns `None` for a zero move.
    pub fn from_delta(delta: Decimal) -> Option<Self> {
        if delta > Decimal::ZERO {
            Some(Outcome::Up)
        } else if delta < Decimal::ZERO {
            Some(Outcome::Down)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Up => write!(f, "UP"),
            Outcome::Down => write!(f, "DOWN"),
        }
    }
}

/// A single reference-feed trade sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Exchange trade time.
    pub timestamp: DateTime<Utc>,
    /// Trade price in USD.
    pub price: Decimal,
    /// Traded quantity (for volume filters).
    pub quantity: Decimal,
}

impl Tick {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal, quantity: Decimal) -> Self {
        Self {
            timestamp,
            price,
            quantity,
        }
    }
}

/// Immutable identity of one fixed-length up/down market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketWindow {
    /// Condition ID (unique per market).
    pub id: String,
    /// The asset this market tracks.
    pub asset: CryptoAsset,
    /// Human-readable market question.
    pub question: String,
    /// Token ID for the UP outcome.
    pub up_token_id: String,
    /// Token ID for the DOWN outcome.
    pub down_token_id: String,
    /// Price to beat, when it could be parsed from the question.
    pub reference_strike: Option<Decimal>,
    /// When the window opens.
    pub window_start: DateTime<Utc>,
    /// When the window closes (resolution time).
    pub window_end: DateTime<Utc>,
}

impl MarketWindow {
    /// Returns the duration of the window in seconds.
    pub fn duration_secs(&self) -> i64 {
        (self.window_end - self.window_start).num_seconds()
    }

    /// Returns true if the window is currently active.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_start && now < self.window_end
    }

    /// Returns true once `now` is past the window end.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.window_end
    }

    /// Returns seconds remaining until window close.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.window_end - now).num_seconds().max(0)
    }

    /// Returns seconds elapsed since window open (negative before open).
    pub fn seconds_elapsed(&self, now: DateTime<Utc>) -> i64 {
        (now - self.window_start).num_seconds()
    }

    /// Token ID for the given outcome.
    pub fn token_id(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Up => &self.up_token_id,
            Outcome::Down => &self.down_token_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn window() -> MarketWindow {
        MarketWindow {
            id: "cond".to_string(),
            asset: CryptoAsset::Btc,
            question: "Bitcoin Up or Down - 5 minute".to_string(),
            up_token_id: "up123".to_string(),
            down_token_id: "down123".to_string(),
            reference_strike: Some(dec!(100000)),
            window_start: DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            window_end: DateTime::parse_from_rfc3339("2025-01-01T12:05:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_crypto_asset_binance_symbol() {
        assert_eq!(CryptoAsset::Btc.binance_symbol(), "btcusdt");
        assert_eq!(CryptoAsset::Eth.binance_symbol(), "ethusdt");
        assert_eq!("Bitcoin".parse::<CryptoAsset>(), Ok(CryptoAsset::Btc));
        assert!("doge".parse::<CryptoAsset>().is_err());
    }

    #[test]
    fn test_outcome_opposite() {
        assert_eq!(Outcome::Up.opposite(), Outcome::Down);
        assert_eq!(Outcome::Down.opposite(), Outcome::Up);
    }

    #[test]
    fn test_outcome_from_delta() {
        assert_eq!(Outcome::from_delta(dec!(20)), Some(Outcome::Up));
        assert_eq!(Outcome::from_delta(dec!(-0.5)), Some(Outcome::Down));
        assert_eq!(Outcome::from_delta(Decimal::ZERO), None);
    }

    #[test]
    fn test_window_duration_parse() {
        assert_eq!("5m".parse::<WindowDuration>(), Ok(WindowDuration::FiveMin));
        assert_eq!(WindowDuration::FiveMin.seconds(), 300);
        assert!("1h".parse::<WindowDuration>().is_err());
    }

    #[test]
    fn test_market_window_timing() {
        let w = window();
        assert_eq!(w.duration_secs(), 300);

        let mid = w.window_start + chrono::Duration::seconds(100);
        assert!(w.is_active(mid));
        assert_eq!(w.seconds_remaining(mid), 200);
        assert_eq!(w.seconds_elapsed(mid), 100);

        // Exactly at the end is not yet expired.
        assert!(!w.is_expired(w.window_end));
        assert!(w.is_expired(w.window_end + chrono::Duration::milliseconds(1)));
        assert_eq!(w.seconds_remaining(w.window_end + chrono::Duration::seconds(5)), 0);
    }

    #[test]
    fn test_market_window_token_id() {
        let w = window();
        assert_eq!(w.token_id(Outcome::Up), "up123");
        assert_eq!(w.token_id(Outcome::Down), "down123");
    }

    #[test]
    fn test_tick_serializes() {
        let tick = Tick::new(window().window_start, dec!(100000.5), dec!(0.01));
        let json = serde_json::to_string(&tick).unwrap();
        assert!(json.contains("100000.5"));
    }
}
