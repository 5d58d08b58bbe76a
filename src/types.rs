//! Core game data model.
//!
//! `GameRecord` is the single shared mutable record; it is owned by the
//! `GameEngine` and handed to the draft/trade/scoring modules by reference
//! for the duration of one operation. Field names match the JSON layout
//! the record is persisted under.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::error::GameError;

/// Trades each player may propose per game.
pub const TRADE_QUOTA: u32 = 3;

/// Game lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Draft,
    Done,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    /// Maximum picks this player drafts.
    pub max_picks: u32,
    /// Tickers currently held. Kept in lockstep with the picks map by the
    /// draft and trade modules on every mutation.
    pub picked: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub ticker: String,
    /// Price at draft time.
    pub price: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// 1-based, monotonically increasing within a game.
    pub id: u64,
    pub from_player: String,
    pub to_player: String,
    pub offer_ticker: String,
    pub request_ticker: String,
    pub status: TradeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    HighestGain,
    LowestVolatility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    /// Scheduled evaluation time.
    pub time: DateTime<Utc>,
    pub kind: MilestoneKind,
    /// Set exactly once; a resolved milestone is never re-evaluated.
    pub winner: Option<String>,
    /// Winning value, rounded to 2 decimals.
    pub value: Option<f64>,
}

impl Milestone {
    pub fn is_resolved(&self) -> bool {
        self.winner.is_some()
    }
}

/// Duration policy selected at game setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationPolicy {
    Quarter,
    SixMonths,
    FiscalYear,
    CalendarYear,
    Custom(i64),
}

impl DurationPolicy {
    /// Display label for the duration selection.
    pub fn label(&self) -> String {
        match self {
            DurationPolicy::Quarter => "1 Quarter".to_string(),
            DurationPolicy::SixMonths => "6 Months".to_string(),
            DurationPolicy::FiscalYear => "Fiscal Year".to_string(),
            DurationPolicy::CalendarYear => "Calendar Year".to_string(),
            DurationPolicy::Custom(days) => format!("Custom ({} days)", days),
        }
    }

    /// Compute the game end date for a given start.
    pub fn end_date(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DurationPolicy::Quarter => start + Duration::days(90),
            DurationPolicy::SixMonths => start + Duration::days(180),
            DurationPolicy::FiscalYear => {
                // Next June 30 at midnight UTC.
                let mut year = start.year();
                if start.month() > 6 {
                    year += 1;
                }
                Utc.with_ymd_and_hms(year, 6, 30, 0, 0, 0)
                    .single()
                    .unwrap_or(start)
            }
            DurationPolicy::CalendarYear => {
                let mut end = start + Duration::days(365);
                // Add a day when the window crosses Feb 29 of a leap year.
                let leap = end.year() % 4 == 0 && (end.year() % 100 != 0 || end.year() % 400 == 0);
                if start.month() <= 2 && end.month() >= 3 && leap {
                    end += Duration::days(1);
                }
                end
            }
            DurationPolicy::Custom(days) => start + Duration::days(*days),
        }
    }
}

/// Validated game setup parameters.
#[derive(Debug, Clone)]
pub struct GameSetup {
    pub player_names: Vec<String>,
    pub picks_per_player: u32,
    pub duration: DurationPolicy,
}

impl GameSetup {
    /// Reject bad input before any state mutation.
    pub fn validate(&self) -> Result<(), GameError> {
        let n = self.player_names.len();
        if !(2..=12).contains(&n) {
            return Err(GameError::InvalidSetup(format!(
                "player count must be 2-12, got {}",
                n
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.player_names {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(GameError::InvalidSetup(
                    "player names must be non-empty".to_string(),
                ));
            }
            if !seen.insert(trimmed.to_string()) {
                return Err(GameError::InvalidSetup(format!(
                    "duplicate player name: {}",
                    trimmed
                )));
            }
        }
        if ![1, 5, 10].contains(&self.picks_per_player) {
            return Err(GameError::InvalidSetup(format!(
                "picks per player must be 1, 5 or 10, got {}",
                self.picks_per_player
            )));
        }
        if let DurationPolicy::Custom(days) = self.duration {
            if !(30..=730).contains(&days) {
                return Err(GameError::InvalidSetup(format!(
                    "custom duration must be 30-730 days, got {}",
                    days
                )));
            }
        }
        Ok(())
    }
}

/// The single active game. Unit of persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub phase: Phase,
    pub players: Vec<Player>,
    /// Snake-order turn queue, consumed front-to-back during the draft.
    pub draft_order: VecDeque<String>,
    /// Every ticker drafted this game; no ticker is drafted twice.
    pub all_picks: Vec<String>,
    /// Player name -> picks, in draft order.
    pub picks: BTreeMap<String, Vec<Pick>>,
    pub time_frame: Option<DurationPolicy>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub trades: Vec<Trade>,
    pub milestones: Vec<Milestone>,
    /// Player name -> remaining trade proposals.
    pub trade_limits: BTreeMap<String, u32>,
}

impl Default for GameRecord {
    fn default() -> Self {
        Self {
            phase: Phase::Setup,
            players: Vec::new(),
            draft_order: VecDeque::new(),
            all_picks: Vec::new(),
            picks: BTreeMap::new(),
            time_frame: None,
            start_date: None,
            end_date: None,
            trades: Vec::new(),
            milestones: Vec::new(),
            trade_limits: BTreeMap::new(),
        }
    }
}

impl GameRecord {
    /// Player names in entry order. Leaderboard ties keep this order.
    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }

    pub fn player_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.name == name)
    }

    /// Game window as naive dates, end clamped to `now`. Used for
    /// volatility series fetches.
    pub fn volatility_window(&self, now: DateTime<Utc>) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.start_date?;
        let end = self.end_date?;
        let clamped = if now < end { now } else { end };
        Some((start.date_naive(), clamped.date_naive()))
    }
}

/// Archived snapshot of a finished game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameHistoryEntry {
    pub id: u64,
    /// End date, `YYYY-MM-DD`.
    pub end_date: String,
    pub time_frame: String,
    pub winner: Option<String>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub picks: BTreeMap<String, Vec<Pick>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    /// Mean percent change plus milestone bonus.
    pub points: f64,
    /// Milestone bonus portion of `points`.
    pub bonus: f64,
}
