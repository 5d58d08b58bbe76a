//! Milestone scheduling and one-shot resolution.
//!
//! Two checkpoints per game, at 1/3 and 2/3 of the duration. Each is
//! resolved at most once: a milestone with a winner is never looked at
//! again, even if prices move afterwards.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::price_cache::PriceService;
use crate::quote::QuoteSource;
use crate::scoring;
use crate::types::{GameRecord, Milestone, MilestoneKind};

/// Schedule the two milestones for a game window. Day counts use whole
/// integer division.
pub fn schedule(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Milestone> {
    let duration_days = (end - start).num_days();
    vec![
        Milestone {
            time: start + Duration::days(duration_days / 3),
            kind: MilestoneKind::HighestGain,
            winner: None,
            value: None,
        },
        Milestone {
            time: start + Duration::days(2 * duration_days / 3),
            kind: MilestoneKind::LowestVolatility,
            winner: None,
            value: None,
        },
    ]
}

/// Resolve every due, unresolved milestone. Returns true if anything
/// was written (the caller persists the record).
///
/// A milestone with no determinable winner (all data unavailable) is
/// left unresolved rather than awarded arbitrarily; it will be looked
/// at again on the next read.
pub async fn resolve_due<S: QuoteSource>(
    record: &mut GameRecord,
    prices: &PriceService<S>,
    now: DateTime<Utc>,
) -> bool {
    let window = record.volatility_window(now);
    let players = record.player_names();
    let mut changed = false;

    // Collect resolutions first; milestones are written back after the
    // immutable scans of the record.
    let mut resolutions: Vec<(usize, String, f64)> = Vec::new();

    for (idx, milestone) in record.milestones.iter().enumerate() {
        if milestone.is_resolved() || now < milestone.time {
            continue;
        }
        let outcome = match milestone.kind {
            MilestoneKind::HighestGain => best_gain(record, prices).await,
            MilestoneKind::LowestVolatility => match window {
                Some((start, end)) => {
                    let mut best: Option<(String, f64)> = None;
                    for name in &players {
                        let empty = Vec::new();
                        let picks = record.picks.get(name).unwrap_or(&empty);
                        let vol = scoring::volatility(prices, picks, start, end).await;
                        // Infinite volatility (no data) never wins.
                        if vol.is_finite() && best.as_ref().map_or(true, |(_, b)| vol < *b) {
                            best = Some((name.clone(), vol));
                        }
                    }
                    best
                }
                None => None,
            },
        };

        if let Some((winner, value)) = outcome {
            resolutions.push((idx, winner, scoring::round2(value)));
        }
    }

    for (idx, winner, value) in resolutions {
        let milestone = &mut record.milestones[idx];
        info!(
            "milestone {:?} resolved: {} ({:.2})",
            milestone.kind, winner, value
        );
        milestone.winner = Some(winner);
        milestone.value = Some(value);
        changed = true;
    }
    changed
}

/// Single best-gaining pick across all players; each pick is scored
/// independently. Unavailable picks are skipped. First scanned pick
/// wins exact ties, which keeps the result deterministic.
async fn best_gain<S: QuoteSource>(
    record: &GameRecord,
    prices: &PriceService<S>,
) -> Option<(String, f64)> {
    let mut best: Option<(String, f64)> = None;
    for player in &record.players {
        let Some(picks) = record.picks.get(&player.name) else {
            continue;
        };
        for pick in picks {
            let Some(current) = prices.get_price(&pick.ticker).await else {
                continue;
            };
            let gain = scoring::pick_gain(pick, current);
            if best.as_ref().map_or(true, |(_, b)| gain > *b) {
                best = Some((player.name.clone(), gain));
            }
        }
    }
    best
}
