//! Scoring: percent-change points, annualized volatility, leaderboard.
//!
//! Pure functions of the price layer and the game record. Picks with
//! no available price are skipped, not scored as zero gain.

use chrono::NaiveDate;

use crate::price_cache::PriceService;
use crate::quote::QuoteSource;
use crate::types::{GameRecord, LeaderboardEntry, Pick};

/// Trading-day annualization factor for daily returns.
const TRADING_DAYS: f64 = 252.0;

/// Points a milestone win is worth on the leaderboard.
pub const MILESTONE_BONUS: f64 = 5.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percent change of a single pick against a current price.
pub fn pick_gain(pick: &Pick, current: f64) -> f64 {
    (current - pick.price) / pick.price * 100.0
}

/// Mean percent change across picks with an available price, rounded to
/// 2 decimals. 0.0 when no pick has a price.
pub async fn points<S: QuoteSource>(prices: &PriceService<S>, picks: &[Pick]) -> f64 {
    let mut total = 0.0;
    let mut count = 0u32;
    for pick in picks {
        if let Some(current) = prices.get_price(&pick.ticker).await {
            total += pick_gain(pick, current);
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        round2(total / count as f64)
    }
}

/// Sample standard deviation (n - 1 denominator).
fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Annualized volatility of one daily-close series.
fn series_volatility(series: &[(NaiveDate, f64)]) -> Option<f64> {
    let returns: Vec<f64> = series
        .windows(2)
        .filter(|w| w[0].1 != 0.0)
        .map(|w| (w[1].1 - w[0].1) / w[0].1)
        .collect();
    sample_stddev(&returns).map(|sd| sd * TRADING_DAYS.sqrt())
}

/// Mean annualized volatility across picks that yielded a usable series
/// over `[start, end]`. Infinity when none did: "worst/undefined", used
/// only for comparisons and never displayed as a number.
pub async fn volatility<S: QuoteSource>(
    prices: &PriceService<S>,
    picks: &[Pick],
    start: NaiveDate,
    end: NaiveDate,
) -> f64 {
    let mut vols = Vec::new();
    for pick in picks {
        if let Some(series) = prices.history(&pick.ticker, start, end).await {
            if let Some(vol) = series_volatility(&series) {
                vols.push(vol);
            }
        }
    }
    if vols.is_empty() {
        f64::INFINITY
    } else {
        vols.iter().sum::<f64>() / vols.len() as f64
    }
}

/// Leaderboard: mean percent change plus 5 points per milestone win,
/// sorted descending. Ties keep player entry order (stable sort over
/// the players list).
pub async fn leaderboard<S: QuoteSource>(
    prices: &PriceService<S>,
    record: &GameRecord,
) -> Vec<LeaderboardEntry> {
    let mut entries = Vec::with_capacity(record.players.len());
    for player in &record.players {
        let empty = Vec::new();
        let picks = record.picks.get(&player.name).unwrap_or(&empty);
        let base = points(prices, picks).await;
        let wins = record
            .milestones
            .iter()
            .filter(|m| m.winner.as_deref() == Some(player.name.as_str()))
            .count();
        let bonus = MILESTONE_BONUS * wins as f64;
        entries.push(LeaderboardEntry {
            name: player.name.clone(),
            points: base + bonus,
            bonus,
        });
    }
    entries.sort_by(|a, b| b.points.partial_cmp(&a.points).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::QuoteError;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Fixed price book for scoring tests.
    pub(crate) struct FixedSource {
        pub prices: HashMap<String, f64>,
        pub series: HashMap<String, Vec<(NaiveDate, f64)>>,
    }

    impl QuoteSource for FixedSource {
        async fn current_price(&self, ticker: &str) -> Result<f64, QuoteError> {
            self.prices.get(ticker).copied().ok_or(QuoteError::NotFound)
        }

        async fn daily_history(
            &self,
            ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<(NaiveDate, f64)>, QuoteError> {
            self.series.get(ticker).cloned().ok_or(QuoteError::NotFound)
        }
    }

    fn service(prices: &[(&str, f64)]) -> PriceService<FixedSource> {
        let source = FixedSource {
            prices: prices.iter().map(|(t, p)| (t.to_string(), *p)).collect(),
            series: HashMap::new(),
        };
        PriceService::new(source, 21600, 5, Duration::from_secs(10))
    }

    fn pick(ticker: &str, price: f64) -> Pick {
        Pick {
            ticker: ticker.to_string(),
            price,
            time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_points_mean_of_changes() {
        // +10% and -10% average to zero.
        let svc = service(&[("A", 110.0), ("B", 45.0)]);
        let picks = vec![pick("A", 100.0), pick("B", 50.0)];
        assert_eq!(points(&svc, &picks).await, 0.0);
    }

    #[tokio::test]
    async fn test_points_skips_unavailable() {
        let svc = service(&[("A", 110.0)]);
        let picks = vec![pick("A", 100.0), pick("GONE", 50.0)];
        assert_eq!(points(&svc, &picks).await, 10.0);
    }

    #[tokio::test]
    async fn test_points_empty_is_zero() {
        let svc = service(&[]);
        assert_eq!(points(&svc, &[]).await, 0.0);
        let picks = vec![pick("GONE", 50.0)];
        assert_eq!(points(&svc, &picks).await, 0.0);
    }

    #[test]
    fn test_sample_stddev() {
        assert_eq!(sample_stddev(&[1.0]), None);
        let sd = sample_stddev(&[1.0, 2.0, 3.0]).unwrap();
        assert!((sd - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_volatility_no_series_is_infinite() {
        let svc = service(&[]);
        let picks = vec![pick("GONE", 50.0)];
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        assert!(volatility(&svc, &picks, start, end).await.is_infinite());
    }

    #[tokio::test]
    async fn test_volatility_flat_series_is_zero() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        let source = FixedSource {
            prices: HashMap::new(),
            series: [(
                "A".to_string(),
                vec![(d(1), 10.0), (d(2), 10.0), (d(3), 10.0)],
            )]
            .into_iter()
            .collect(),
        };
        let svc = PriceService::new(source, 21600, 5, Duration::from_secs(10));
        let picks = vec![pick("A", 10.0)];
        let vol = volatility(&svc, &picks, d(1), d(3)).await;
        assert_eq!(vol, 0.0);
    }
}
