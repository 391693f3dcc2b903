//! Market discovery via Polymarket Gamma API.
//!
//! Discovers active fixed-duration up/down markets for one crypto asset and
//! reports the resolved winner of markets that have closed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use poly_common::{CryptoAsset, MarketWindow, Outcome, WindowDuration};
use reqwest::Client;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{GammaEvent, GammaMarket, TokenIds};

/// Gamma API base URL.
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

const UP_DOWN_KEYWORDS: &[&str] = &["up or down", "higher or lower", "above or below", " above $"];

/// Errors that can occur during market discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid market data: {0}")]
    InvalidData(String),
}

/// Configuration for market discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Asset to track.
    pub asset: CryptoAsset,
    /// Market window length.
    pub duration: WindowDuration,
    /// Gamma API base URL.
    pub gamma_url: String,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            asset: CryptoAsset::Btc,
            duration: WindowDuration::FiveMin,
            gamma_url: GAMMA_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Market discovery client for finding fixed-duration up/down markets.
pub struct MarketDiscovery {
    http: Client,
    config: DiscoveryConfig,
}

impl MarketDiscovery {
    /// Create a new market discovery client.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover markets whose window has not yet ended at `now`.
    pub async fn discover_active(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MarketWindow>, DiscoveryError> {
        let events = self.fetch_active_events().await?;
        debug!("Fetched {} events", events.len());

        let markets: Vec<MarketWindow> = events
            .iter()
            .filter_map(|event| parse_market_window(event, self.config.asset, self.config.duration))
            .filter(|market| market.window_end > now)
            .collect();

        info!(
            "Found {} active {} {} markets",
            markets.len(),
            self.config.asset,
            self.config.duration
        );
        Ok(markets)
    }

    /// Look up the resolved winner of a market, if the venue has resolved it.
    pub async fn fetch_resolution(
        &self,
        condition_id: &str,
    ) -> Result<Option<Outcome>, DiscoveryError> {
        let url = format!("{}/markets", self.config.gamma_url);
        let response = self
            .http
            .get(&url)
            .query(&[("condition_ids", condition_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscoveryError::InvalidData(format!(
                "Gamma API returned status {}",
                response.status()
            )));
        }

        let markets: Vec<GammaMarket> = response.json().await?;
        Ok(markets.first().and_then(parse_resolution))
    }

    /// Fetch active events for the configured duration tag.
    async fn fetch_active_events(&self) -> Result<Vec<GammaEvent>, DiscoveryError> {
        let url = format!("{}/events", self.config.gamma_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("tag_slug", self.config.duration.tag_slug()),
                ("closed", "false"),
                ("limit", "100"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscoveryError::InvalidData(format!(
                "Gamma API returned status {}",
                response.status()
            )));
        }

        let events: Vec<GammaEvent> = response.json().await?;
        Ok(events)
    }
}

/// Parse a Gamma event into a MarketWindow if it is an up/down market for
/// `asset` with the given duration.
pub fn parse_market_window(
    event: &GammaEvent,
    asset: CryptoAsset,
    duration: WindowDuration,
) -> Option<MarketWindow> {
    let market = match &event.markets {
        Some(markets) if !markets.is_empty() => &markets[0],
        _ => {
            debug!("Event {} has no markets", event.id.as_deref().unwrap_or("unknown"));
            return None;
        }
    };

    let title = event
        .title
        .as_deref()
        .or(market.question.as_deref())?
        .to_lowercase();
    let question = market.question.clone().unwrap_or_else(|| title.clone());
    let slug = event.slug.as_deref().unwrap_or_default().to_lowercase();

    if !asset.keywords().iter().any(|kw| title.contains(kw)) {
        return None;
    }

    // "15 min" also contains "5 min", so longer durations are ruled out first.
    let is_longer = duration != WindowDuration::FifteenMin
        && WindowDuration::FifteenMin
            .keywords()
            .iter()
            .any(|kw| title.contains(kw));
    let is_duration = duration.keywords().iter().any(|kw| title.contains(kw))
        || duration.slug_patterns().iter().any(|p| slug.contains(p));
    if is_longer || !is_duration {
        return None;
    }

    let question_lower = question.to_lowercase();
    if !UP_DOWN_KEYWORDS
        .iter()
        .any(|kw| title.contains(kw) || question_lower.contains(kw))
    {
        debug!("Skipping non-up/down market: {}", title);
        return None;
    }

    let Some(condition_id) = market.condition_id.clone().filter(|id| !id.is_empty()) else {
        warn!("Market in event {:?} has no condition id", event.id);
        return None;
    };

    let Some(token_ids) = parse_token_ids(market) else {
        warn!("Could not parse token IDs for market {}", condition_id);
        return None;
    };

    let window_end = match parse_datetime(event.end_date.as_deref())
        .or_else(|| parse_datetime(market.end_date.as_deref()))
    {
        Some(t) => t,
        None => {
            warn!("Could not parse end_date for event {:?}", event.id);
            return None;
        }
    };

    Some(MarketWindow {
        id: condition_id,
        asset,
        reference_strike: parse_strike(&question),
        question,
        up_token_id: token_ids.up_token_id,
        down_token_id: token_ids.down_token_id,
        window_start: window_end - duration.as_duration(),
        window_end,
    })
}

/// Parse token IDs from the market's clob_token_ids field, ordered by the
/// market's outcome labels.
pub fn parse_token_ids(market: &GammaMarket) -> Option<TokenIds> {
    let raw = market.clob_token_ids.as_deref()?;
    let tokens: Vec<String> = match serde_json::from_str(raw) {
        Ok(t) => t,
        Err(e) => {
            debug!("Failed to parse clob_token_ids '{}': {}", raw, e);
            return None;
        }
    };

    if tokens.len() != 2 {
        debug!("Expected 2 token IDs, got {}: {:?}", tokens.len(), tokens);
        return None;
    }

    let outcomes = parse_labels(market.outcomes.as_deref());
    let up_idx = outcomes
        .iter()
        .position(|o| o == "up" || o == "yes")
        .unwrap_or(0);
    let down_idx = outcomes
        .iter()
        .position(|o| o == "down" || o == "no")
        .unwrap_or(1);

    Some(TokenIds {
        up_token_id: tokens.get(up_idx)?.clone(),
        down_token_id: tokens.get(down_idx)?.clone(),
    })
}

/// Winner of a closed market, from its outcome prices.
///
/// Only a closed market whose first-listed price is exactly 1 or 0 counts as
/// resolved.
pub fn parse_resolution(market: &GammaMarket) -> Option<Outcome> {
    if market.closed != Some(true) {
        return None;
    }

    let prices: Vec<String> = serde_json::from_str(market.outcome_prices.as_deref()?).ok()?;
    let labels = parse_labels(market.outcomes.as_deref());
    let up_idx = labels
        .iter()
        .position(|o| o == "up" || o == "yes")
        .unwrap_or(0);
    let up_price: Decimal = prices.get(up_idx)?.parse().ok()?;

    if up_price == Decimal::ONE {
        Some(Outcome::Up)
    } else if up_price.is_zero() {
        Some(Outcome::Down)
    } else {
        None
    }
}

/// Parse the dollar strike from a market question.
/// Example: "Will Bitcoin be above $98,765.43 at 12:35 (5 min)?"
pub fn parse_strike(question: &str) -> Option<Decimal> {
    let re = regex::Regex::new(r"\$([0-9,]+(?:\.[0-9]+)?)").ok()?;
    let captures = re.captures(question)?;
    let cleaned = captures.get(1)?.as_str().replace(',', "");
    cleaned.parse::<Decimal>().ok().filter(|p| *p > Decimal::ZERO)
}

fn parse_labels(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_else(|| vec!["Up".to_string(), "Down".to_string()])
        .into_iter()
        .map(|s| s.to_lowercase())
        .collect()
}

/// Parse a datetime string from the API.
fn parse_datetime(s: Option<&str>) -> Option<DateTime<Utc>> {
    let s = s?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ") {
        return Some(dt.and_utc());
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }

    debug!("Could not parse datetime: {}", s);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gamma_market(question: &str) -> GammaMarket {
        GammaMarket {
            id: Some("m1".to_string()),
            question: Some(question.to_string()),
            condition_id: Some("0xcond".to_string()),
            slug: None,
            clob_token_ids: Some(r#"["token_up", "token_down"]"#.to_string()),
            outcomes: Some(r#"["Up", "Down"]"#.to_string()),
            outcome_prices: None,
            end_date: None,
            active: Some(true),
            closed: Some(false),
        }
    }

    fn gamma_event(title: &str, slug: &str, market: GammaMarket) -> GammaEvent {
        GammaEvent {
            id: Some("e1".to_string()),
            title: Some(title.to_string()),
            slug: Some(slug.to_string()),
            end_date: Some("2025-01-01T12:05:00Z".to_string()),
            active: Some(true),
            closed: Some(false),
            markets: Some(vec![market]),
        }
    }

    #[test]
    fn test_parse_strike() {
        assert_eq!(
            parse_strike("Will Bitcoin be above $98,765.43 at 12:35 (5 min)?"),
            Some(dec!(98765.43))
        );
        assert_eq!(parse_strike("Bitcoin above $100000 at 12:35"), Some(dec!(100000)));
        assert_eq!(parse_strike("Bitcoin Up or Down"), None);
    }

    #[test]
    fn test_parse_token_ids_by_label() {
        let mut market = gamma_market("q");
        market.outcomes = Some(r#"["Down", "Up"]"#.to_string());
        let tokens = parse_token_ids(&market).unwrap();
        assert_eq!(tokens.up_token_id, "token_down");
        assert_eq!(tokens.down_token_id, "token_up");
    }

    #[test]
    fn test_parse_token_ids_rejects_wrong_count() {
        let mut market = gamma_market("q");
        market.clob_token_ids = Some(r#"["only_one"]"#.to_string());
        assert!(parse_token_ids(&market).is_none());
    }

    #[test]
    fn test_parse_market_window() {
        let event = gamma_event(
            "Bitcoin Up or Down - 5 min",
            "btc-updown-5m-1735732800",
            gamma_market("Bitcoin above $95,000 at 12:05 (5 min)?"),
        );

        let window = parse_market_window(&event, CryptoAsset::Btc, WindowDuration::FiveMin).unwrap();
        assert_eq!(window.id, "0xcond");
        assert_eq!(window.up_token_id, "token_up");
        assert_eq!(window.reference_strike, Some(dec!(95000)));
        assert_eq!(window.duration_secs(), 300);
    }

    #[test]
    fn test_parse_market_window_filters_asset_and_duration() {
        let eth = gamma_event(
            "Ethereum Up or Down - 5 min",
            "eth-updown-5m-1",
            gamma_market("Ethereum up or down"),
        );
        assert!(parse_market_window(&eth, CryptoAsset::Btc, WindowDuration::FiveMin).is_none());

        let hourly = gamma_event(
            "Bitcoin Up or Down - hourly",
            "bitcoin-up-or-down-9am-et",
            gamma_market("Bitcoin up or down"),
        );
        assert!(parse_market_window(&hourly, CryptoAsset::Btc, WindowDuration::FiveMin).is_none());

        let fifteen = gamma_event(
            "Bitcoin Up or Down - 15 min",
            "btc-updown-15m-1",
            gamma_market("Bitcoin up or down"),
        );
        assert!(parse_market_window(&fifteen, CryptoAsset::Btc, WindowDuration::FiveMin).is_none());
        assert!(parse_market_window(&fifteen, CryptoAsset::Btc, WindowDuration::FifteenMin).is_some());
    }

    #[test]
    fn test_parse_resolution() {
        let mut market = gamma_market("q");
        market.outcome_prices = Some(r#"["0", "1"]"#.to_string());
        assert_eq!(parse_resolution(&market), None, "open market is not resolved");

        market.closed = Some(true);
        assert_eq!(parse_resolution(&market), Some(Outcome::Down));

        market.outcome_prices = Some(r#"["1", "0"]"#.to_string());
        assert_eq!(parse_resolution(&market), Some(Outcome::Up));

        market.outcome_prices = Some(r#"["0.52", "0.48"]"#.to_string());
        assert_eq!(parse_resolution(&market), None);
    }

    #[test]
    fn test_discovery_config_default() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.asset, CryptoAsset::Btc);
        assert_eq!(config.duration, WindowDuration::FiveMin);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }
}
