//! Game state machine and orchestration.
//!
//! `GameEngine` owns the single mutable `GameRecord` behind an async
//! mutex: every public operation takes the lock for its whole
//! load -> mutate -> save span, so concurrent callers serialize instead
//! of losing updates. Phase expiry is checked at the top of every entry
//! point; there is no timer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::draft;
use crate::error::GameError;
use crate::milestones;
use crate::price_cache::PriceService;
use crate::quote::QuoteSource;
use crate::scoring;
use crate::store::GameStore;
use crate::trades;
use crate::types::{
    GameHistoryEntry, GameRecord, GameSetup, LeaderboardEntry, Milestone, Phase, Pick, Player,
    Trade, TradeStatus, TRADE_QUOTA,
};

/// One pick as the presentation layer renders it. `current_price` is
/// `None` when the quote source has no data ("N/A"), in which case the
/// change reads 0.0.
#[derive(Debug, Clone, Serialize)]
pub struct PickSummary {
    pub ticker: String,
    pub draft_price: f64,
    pub current_price: Option<f64>,
    pub change_pct: f64,
}

/// Snapshot of the whole game for display.
#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    pub phase: Phase,
    pub time_frame: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub milestones: Vec<Milestone>,
    /// Per-player pick summaries, in player entry order.
    pub player_picks: Vec<(String, Vec<PickSummary>)>,
    pub pending_trades: Vec<Trade>,
    pub settled_trades: Vec<Trade>,
    /// Leaderboard head once the game is finished.
    pub winner: Option<String>,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct GameEngine<S: QuoteSource> {
    store: GameStore,
    prices: PriceService<S>,
    record: Mutex<GameRecord>,
    clock: Clock,
}

impl<S: QuoteSource> GameEngine<S> {
    /// Load the persisted record and seed the price cache.
    pub fn new(store: GameStore, prices: PriceService<S>) -> Result<Self, GameError> {
        let record = store.load_record()?;
        prices.restore(store.load_cache()?);
        Ok(Self {
            store,
            prices,
            record: Mutex::new(record),
            clock: Box::new(Utc::now),
        })
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Start a game from validated setup. Requires a fresh (setup-phase)
    /// record; call `new_game` first to retire a finished one.
    pub async fn start_game(&self, setup: GameSetup) -> Result<(), GameError> {
        setup.validate()?;

        let mut record = self.record.lock().await;
        if record.phase != Phase::Setup {
            return Err(GameError::WrongPhase {
                expected: Phase::Setup,
                actual: record.phase,
            });
        }

        let names: Vec<String> = setup
            .player_names
            .iter()
            .map(|n| n.trim().to_string())
            .collect();
        let start = (self.clock)();
        let end = setup.duration.end_date(start);

        record.players = names
            .iter()
            .map(|name| Player {
                name: name.clone(),
                max_picks: setup.picks_per_player,
                picked: Vec::new(),
            })
            .collect();
        record.draft_order = draft::snake_order(&names, setup.picks_per_player);
        record.picks.clear();
        record.all_picks.clear();
        record.trades.clear();
        record.trade_limits = names.iter().map(|n| (n.clone(), TRADE_QUOTA)).collect();
        record.time_frame = Some(setup.duration);
        record.start_date = Some(start);
        record.end_date = Some(end);
        record.milestones = milestones::schedule(start, end);
        record.phase = Phase::Draft;

        self.store.save_record(&record)?;
        info!(
            "game started: {} players, {} picks each, ends {}",
            names.len(),
            setup.picks_per_player,
            end.format("%Y-%m-%d")
        );
        Ok(())
    }

    /// Draft the next pick for `player`.
    pub async fn submit_pick(&self, player: &str, ticker: &str) -> Result<Pick, GameError> {
        let mut record = self.record.lock().await;
        self.check_expiry(&mut record)?;
        let pick = draft::submit_pick(&mut record, &self.prices, player, ticker).await?;
        self.store.save_record(&record)?;
        self.store.save_cache(&self.prices.snapshot())?;
        Ok(pick)
    }

    /// Player whose turn it currently is, if the draft is running.
    pub async fn on_the_clock(&self) -> Result<Option<String>, GameError> {
        let mut record = self.record.lock().await;
        self.check_expiry(&mut record)?;
        Ok(record.draft_order.front().cloned())
    }

    /// Resolve a price for display without touching game state.
    pub async fn preview_ticker(&self, ticker: &str) -> Result<Option<f64>, GameError> {
        let price = draft::preview_ticker(&self.prices, ticker).await?;
        self.store.save_cache(&self.prices.snapshot())?;
        Ok(price)
    }

    pub async fn propose_trade(
        &self,
        from: &str,
        to: &str,
        offer_ticker: &str,
        request_ticker: &str,
    ) -> Result<u64, GameError> {
        let mut record = self.record.lock().await;
        self.check_expiry(&mut record)?;
        let id = trades::propose(&mut record, from, to, offer_ticker, request_ticker)?;
        self.store.save_record(&record)?;
        Ok(id)
    }

    pub async fn respond_trade(&self, trade_id: u64, accepted: bool) -> Result<(), GameError> {
        let mut record = self.record.lock().await;
        self.check_expiry(&mut record)?;
        trades::respond(&mut record, trade_id, accepted)?;
        self.store.save_record(&record)?;
        Ok(())
    }

    /// Full game snapshot: checks expiry, resolves due milestones, then
    /// computes the leaderboard and per-pick summaries.
    pub async fn summary(&self) -> Result<GameSummary, GameError> {
        let mut record = self.record.lock().await;
        let mut dirty = self.check_expiry_inner(&mut record);
        let now = (self.clock)();
        if milestones::resolve_due(&mut record, &self.prices, now).await {
            dirty = true;
        }

        let leaderboard = scoring::leaderboard(&self.prices, &record).await;
        let mut player_picks = Vec::with_capacity(record.players.len());
        for player in &record.players {
            let empty = Vec::new();
            let picks = record.picks.get(&player.name).unwrap_or(&empty);
            let mut summaries = Vec::with_capacity(picks.len());
            for pick in picks {
                let current = self.prices.get_price(&pick.ticker).await;
                let change = current
                    .map(|c| scoring::round2(scoring::pick_gain(pick, c)))
                    .unwrap_or(0.0);
                summaries.push(PickSummary {
                    ticker: pick.ticker.clone(),
                    draft_price: pick.price,
                    current_price: current,
                    change_pct: change,
                });
            }
            player_picks.push((player.name.clone(), summaries));
        }

        let winner = if record.phase == Phase::Finished {
            leaderboard.first().map(|e| e.name.clone())
        } else {
            None
        };

        if dirty {
            self.store.save_record(&record)?;
        }
        self.store.save_cache(&self.prices.snapshot())?;

        Ok(GameSummary {
            phase: record.phase,
            time_frame: record.time_frame.map(|tf| tf.label()),
            start_date: record.start_date,
            end_date: record.end_date,
            leaderboard,
            milestones: record.milestones.clone(),
            player_picks,
            pending_trades: record
                .trades
                .iter()
                .filter(|t| t.status == TradeStatus::Pending)
                .cloned()
                .collect(),
            settled_trades: record
                .trades
                .iter()
                .filter(|t| t.status != TradeStatus::Pending)
                .cloned()
                .collect(),
            winner,
        })
    }

    /// Retire the current game. A finished record is archived to history
    /// (final leaderboard included) before the record resets to setup.
    pub async fn new_game(&self) -> Result<(), GameError> {
        let mut record = self.record.lock().await;
        self.check_expiry_inner(&mut record);

        if record.phase == Phase::Finished {
            let leaderboard = scoring::leaderboard(&self.prices, &record).await;
            let mut history = self.store.load_history()?;
            let entry = GameHistoryEntry {
                id: history.len() as u64 + 1,
                end_date: record
                    .end_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                time_frame: record
                    .time_frame
                    .map(|tf| tf.label())
                    .unwrap_or_default(),
                winner: leaderboard.first().map(|e| e.name.clone()),
                leaderboard,
                picks: record.picks.clone(),
            };
            info!(
                "archiving finished game {} (winner: {:?})",
                entry.id, entry.winner
            );
            history.push(entry);
            self.store.save_history(&history)?;
        }

        *record = GameRecord::default();
        self.store.save_record(&record)?;
        Ok(())
    }

    pub async fn history(&self) -> Result<Vec<GameHistoryEntry>, GameError> {
        Ok(self.store.load_history()?)
    }

    pub async fn phase(&self) -> Result<Phase, GameError> {
        let mut record = self.record.lock().await;
        self.check_expiry(&mut record)?;
        Ok(record.phase)
    }

    /// Lazy Done -> Finished transition, persisted when it fires.
    fn check_expiry(&self, record: &mut GameRecord) -> Result<(), GameError> {
        if self.check_expiry_inner(record) {
            self.store.save_record(record)?;
        }
        Ok(())
    }

    fn check_expiry_inner(&self, record: &mut GameRecord) -> bool {
        if record.phase != Phase::Done {
            return false;
        }
        match record.end_date {
            Some(end) if (self.clock)() > end => {
                record.phase = Phase::Finished;
                info!("game window closed, phase is now finished");
                true
            }
            _ => false,
        }
    }
}
