//! Poly-bot: Polymarket 5-minute up/down decision engine.
//!
//! Usage:
//!   poly-bot [OPTIONS]
//!
//! Options:
//!   -m, --mode <MODE>           Trading mode: paper, shadow
//!   -c, --config <FILE>         Config file path (default: config/bot.toml)
//!   -l, --log-level <LEVEL>     Log level (overrides config)
//!   --strategies <NAMES>        Comma-separated strategy profiles to run

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use poly_common::WindowDuration;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use poly_bot::clock::{Clock, SystemClock};
use poly_bot::config::BotConfig;
use poly_bot::feed::{BinanceFeed, BinanceFeedConfig, PriceFeed};
use poly_bot::state::ControlFlags;
use poly_bot::strategy::{EngineConfig, StrategyEngine};
use poly_bot::venue::{PolymarketVenue, PolymarketVenueConfig, Venue};

/// CLI arguments for poly-bot.
#[derive(Parser, Debug)]
#[command(name = "poly-bot")]
#[command(about = "Polymarket 5-minute up/down decision engine")]
#[command(version)]
struct Args {
    /// Trading mode: paper, shadow
    #[arg(short, long)]
    mode: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = "config/bot.toml")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,

    /// Comma-separated strategy profile names to run (default: all)
    #[arg(long, value_delimiter = ',')]
    strategies: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = if config_found {
        BotConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        BotConfig::default()
    };

    config.apply_env_overrides();
    config.apply_cli_overrides(args.mode, args.log_level, args.strategies)?;

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    if !config_found {
        warn!("Config file not found at {:?}, using defaults", args.config);
    }

    config.validate().context("Configuration validation failed")?;

    info!("Starting poly-bot");
    info!("Mode: {}", config.mode);
    info!("Asset: {}", config.general.asset);
    info!(
        "Strategies: {:?}",
        config.strategies.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let control = Arc::new(ControlFlags::new());
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    // Reference feed: one writer, shared by every engine
    let feed = Arc::new(PriceFeed::new(config.feed.buffer_capacity, config.feed.staleness));
    let binance = BinanceFeed::new(
        BinanceFeedConfig {
            url: config.feed.binance_ws_url.clone(),
            ..BinanceFeedConfig::default()
        },
        feed.clone(),
    );
    let feed_shutdown = shutdown_tx.subscribe();
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = binance.run(feed_shutdown).await {
            error!("Binance feed stopped: {}", e);
        }
    });

    let venue: Arc<dyn Venue> = Arc::new(
        PolymarketVenue::new(
            PolymarketVenueConfig {
                asset: config.general.asset,
                duration: WindowDuration::FiveMin,
                gamma_url: config.venue.gamma_url.clone(),
                clob_url: config.venue.clob_url.clone(),
                request_timeout: config.venue.request_timeout,
            },
            clock.clone(),
        )
        .context("Failed to create Polymarket venue")?,
    );

    let engine_config = EngineConfig::from_bot_config(&config);
    let calendar = config.general.calendar();
    let mut engines = Vec::with_capacity(config.strategies.len());
    for strategy in config.strategies.iter().cloned() {
        let engine = StrategyEngine::new(
            strategy,
            engine_config.clone(),
            feed.clone(),
            venue.clone(),
            clock.clone(),
            control.clone(),
            calendar,
        );
        let name = engine.name().to_string();
        engines.push((name, tokio::spawn(engine.run())));
    }

    // Handle shutdown signals
    let shutdown_control = control.clone();
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            error!("Shutdown signal handler error: {}", e);
        }
        info!("Requesting shutdown...");
        shutdown_control.request_shutdown();
        let _ = signal_tx.send(());
    });

    let mut total_pnl = Decimal::ZERO;
    let mut total_trades = 0;
    for (name, handle) in engines {
        match handle.await {
            Ok(summary) => {
                total_pnl += summary.total_pnl;
                total_trades += summary.trades;
            }
            Err(e) => error!("Strategy {} task failed: {}", name, e),
        }
    }

    // Engines are done; make sure the feed stops too
    control.request_shutdown();
    let _ = shutdown_tx.send(());
    if let Err(e) = feed_handle.await {
        error!("Feed task failed: {}", e);
    }

    info!(
        trades = total_trades,
        total_pnl = %total_pnl,
        "Shutdown complete"
    );
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::try_parse_from(["poly-bot"]).unwrap();
        assert_eq!(args.config.to_str().unwrap(), "config/bot.toml");
        assert!(args.mode.is_none());
        assert!(args.strategies.is_none());
    }

    #[test]
    fn test_cli_mode_override() {
        let args = Args::try_parse_from(["poly-bot", "--mode", "shadow"]).unwrap();
        assert_eq!(args.mode, Some("shadow".to_string()));
    }

    #[test]
    fn test_cli_strategies() {
        let args =
            Args::try_parse_from(["poly-bot", "--strategies", "momentum,leader"]).unwrap();
        assert_eq!(
            args.strategies,
            Some(vec!["momentum".to_string(), "leader".to_string()])
        );
    }

    #[test]
    fn test_cli_log_level_and_config() {
        let args =
            Args::try_parse_from(["poly-bot", "-l", "debug", "-c", "/custom/bot.toml"]).unwrap();
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert_eq!(args.config.to_str().unwrap(), "/custom/bot.toml");
    }
}
