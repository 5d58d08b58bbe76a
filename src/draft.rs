//! Snake draft: turn queue construction and pick submission.

use chrono::Utc;
use std::collections::VecDeque;
use tracing::info;

use crate::error::GameError;
use crate::price_cache::PriceService;
use crate::quote::QuoteSource;
use crate::types::{GameRecord, Phase, Pick};

/// Build the full turn queue for `rounds` rounds of snake order:
/// even rounds run forward, odd rounds reversed.
pub fn snake_order(players: &[String], rounds: u32) -> VecDeque<String> {
    let mut order = VecDeque::with_capacity(players.len() * rounds as usize);
    for round in 0..rounds {
        if round % 2 == 0 {
            order.extend(players.iter().cloned());
        } else {
            order.extend(players.iter().rev().cloned());
        }
    }
    order
}

/// Reject malformed ticker symbols before any lookup.
pub fn validate_ticker(ticker: &str) -> Result<String, GameError> {
    let ticker = ticker.trim().to_uppercase();
    if ticker.is_empty()
        || ticker.len() > 10
        || !ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(GameError::InvalidTicker(ticker));
    }
    Ok(ticker)
}

/// Submit the current pick. Validates duplicate ticker, price
/// availability and turn order, then applies the pick, the drafted-set
/// entry and the queue advance as one unit. Flips the phase to `Done`
/// when the queue empties.
pub async fn submit_pick<S: QuoteSource>(
    record: &mut GameRecord,
    prices: &PriceService<S>,
    player: &str,
    ticker: &str,
) -> Result<Pick, GameError> {
    if record.phase != Phase::Draft {
        return Err(GameError::WrongPhase {
            expected: Phase::Draft,
            actual: record.phase,
        });
    }

    let ticker = validate_ticker(ticker)?;

    if record.all_picks.contains(&ticker) {
        return Err(GameError::DuplicatePick(ticker));
    }

    let price = prices
        .get_price(&ticker)
        .await
        .ok_or_else(|| GameError::UnknownTicker(ticker.clone()))?;

    // A stale turn means the caller raced a concurrent pick.
    match record.draft_order.front() {
        Some(expected) if expected == player => {}
        Some(expected) => {
            return Err(GameError::InvalidTurn {
                expected: expected.clone(),
                got: player.to_string(),
            });
        }
        None => {
            return Err(GameError::WrongPhase {
                expected: Phase::Draft,
                actual: record.phase,
            });
        }
    }

    let pick = Pick {
        ticker: ticker.clone(),
        price,
        time: Utc::now(),
    };
    record
        .picks
        .entry(player.to_string())
        .or_default()
        .push(pick.clone());
    record.all_picks.push(ticker.clone());
    if let Some(p) = record.player_mut(player) {
        p.picked.push(ticker.clone());
    }
    record.draft_order.pop_front();

    info!("{} drafted {} at {:.2}", player, ticker, price);

    if record.draft_order.is_empty() {
        record.phase = Phase::Done;
        info!("draft complete, game is live");
    }
    Ok(pick)
}

/// Resolve a current price for display. Read-only: never touches draft
/// state, may still refresh the price cache.
pub async fn preview_ticker<S: QuoteSource>(
    prices: &PriceService<S>,
    ticker: &str,
) -> Result<Option<f64>, GameError> {
    let ticker = validate_ticker(ticker)?;
    Ok(prices.get_price(&ticker).await)
}
