//! Draft Engine service binary.
//!
//! Loads configuration, opens the persisted game record and price
//! cache, runs the lazy expiry/milestone checks, and logs a status
//! report. The presentation layer (web UI) drives the same engine
//! operations through the library API.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use draft_engine::config::Config;
use draft_engine::types::Phase;
use draft_engine::{GameEngine, GameStore, HttpQuoteSource, PriceService};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.log_level.clone())),
        )
        .init();

    info!("draft-engine starting");
    info!("   data dir: {:?}", config.storage.data_dir);
    info!("   quote source: {}", config.quotes.base_url);
    info!(
        "   cache TTL {}s, {} attempts, {}s initial backoff",
        config.quotes.cache_ttl_secs,
        config.quotes.retry_max_attempts,
        config.quotes.retry_initial_backoff_secs
    );

    let store = GameStore::new(config.storage.data_dir.clone());
    let source = HttpQuoteSource::new(
        config.quotes.base_url.clone(),
        Duration::from_secs(config.quotes.http_timeout_secs),
    )?;
    let prices = PriceService::new(
        source,
        config.quotes.cache_ttl_secs,
        config.quotes.retry_max_attempts,
        Duration::from_secs(config.quotes.retry_initial_backoff_secs),
    );
    let engine = GameEngine::new(store, prices).context("Failed to load game state")?;

    // Summary runs the lazy phase/milestone checks and persists any
    // transitions it triggered.
    let summary = engine.summary().await?;
    info!("game phase: {:?}", summary.phase);
    if let Some(tf) = &summary.time_frame {
        info!(
            "window: {} ({} -> {})",
            tf,
            summary
                .start_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".into()),
            summary
                .end_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".into()),
        );
    }
    if summary.phase == Phase::Draft {
        if let Some(player) = engine.on_the_clock().await? {
            info!("on the clock: {}", player);
        }
    }
    for entry in &summary.leaderboard {
        info!(
            "   {}: {:.2} pts (bonus {:.0})",
            entry.name, entry.points, entry.bonus
        );
    }
    for m in &summary.milestones {
        match (&m.winner, m.value) {
            (Some(winner), Some(value)) => {
                info!("milestone {:?}: {} ({:.2})", m.kind, winner, value)
            }
            _ => info!(
                "milestone {:?}: pending ({})",
                m.kind,
                m.time.format("%Y-%m-%d")
            ),
        }
    }
    if let Some(winner) = &summary.winner {
        info!("game over, winner: {}", winner);
    }

    Ok(())
}
