//! Error taxonomy for the draft engine.
//!
//! Three families matter to callers:
//! - user input errors (rejected before any state mutation)
//! - data availability ("no price for ticker" is never fatal)
//! - state invariant violations (integrity bugs, fail loudly)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    /// Game setup rejected before any state was touched.
    #[error("invalid setup: {0}")]
    InvalidSetup(String),

    /// Ticker symbol failed format validation.
    #[error("invalid ticker symbol: {0:?}")]
    InvalidTicker(String),

    /// Ticker was already drafted in this game.
    #[error("{0} has already been drafted")]
    DuplicatePick(String),

    /// No current price could be resolved for the ticker. Retryable:
    /// the quote source may be rate-limited right now.
    #[error("no price data available for {0}")]
    UnknownTicker(String),

    /// Pick submitted by a player who is not on the clock.
    #[error("it is {expected}'s turn, not {got}'s")]
    InvalidTurn { expected: String, got: String },

    /// Operation attempted in the wrong game phase.
    #[error("operation requires phase {expected:?}, game is {actual:?}")]
    WrongPhase {
        expected: crate::types::Phase,
        actual: crate::types::Phase,
    },

    /// Trade proposal rejected (self-trade or quota exhausted).
    #[error("invalid trade: {0}")]
    InvalidTrade(String),

    /// A trade referenced a pick that no longer exists. This is an
    /// integrity error, not a user error.
    #[error("trade {trade_id} invariant violation: {detail}")]
    TradeInvariantViolation { trade_id: u64, detail: String },

    /// Persistence failure (load/save of record, history or cache).
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl GameError {
    /// True for failures the caller may simply retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GameError::UnknownTicker(_))
    }
}
