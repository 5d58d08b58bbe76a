// Draft Engine - fantasy stock draft core
// Price cache + quote fetcher, draft/trade/scoring engines, and the
// game state machine that ties them together.

pub mod config;
pub mod draft;
pub mod engine;
pub mod error;
pub mod milestones;
pub mod price_cache;
pub mod quote;
pub mod scoring;
pub mod store;
pub mod trades;
pub mod types;

pub use engine::{GameEngine, GameSummary, PickSummary};
pub use error::GameError;
pub use price_cache::PriceService;
pub use quote::{HttpQuoteSource, QuoteError, QuoteSource};
pub use store::GameStore;
pub use types::{GameRecord, GameSetup, Phase};
