//! Time-bounded price cache fronting the quote source.
//!
//! Fresh entries are served without touching the network. Stale or
//! missing entries trigger a fetch, with exponential backoff on rate
//! limiting only. Every failure class degrades to `None`.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::quote::{QuoteError, QuoteSource};

/// Cached price snapshot for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub price: f64,
    /// Unix seconds of the successful fetch.
    pub fetched_at: i64,
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// TTL cache plus retry policy around a `QuoteSource`.
pub struct PriceService<S: QuoteSource> {
    source: S,
    cache: DashMap<String, CacheEntry>,
    ttl_secs: i64,
    max_attempts: u32,
    initial_backoff: Duration,
    clock: Clock,
}

impl<S: QuoteSource> PriceService<S> {
    pub fn new(source: S, ttl_secs: u64, max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            ttl_secs: ttl_secs as i64,
            max_attempts,
            initial_backoff,
            clock: Box::new(|| Utc::now().timestamp()),
        }
    }

    /// Replace the wall clock. Lets TTL tests move time without sleeping.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Canonical ticker form used for every lookup and store.
    fn normalize(ticker: &str) -> String {
        ticker.trim().to_uppercase()
    }

    /// Current price for a ticker, from cache when fresh.
    ///
    /// `None` means unavailable: unknown ticker, rate-limit budget
    /// exhausted, or a transient source failure.
    pub async fn get_price(&self, ticker: &str) -> Option<f64> {
        let ticker = Self::normalize(ticker);
        let now = (self.clock)();

        if let Some(entry) = self.cache.get(&ticker) {
            if now - entry.fetched_at < self.ttl_secs {
                debug!("cache hit for {} (age {}s)", ticker, now - entry.fetched_at);
                return Some(entry.price);
            }
        }

        let price = self.fetch_with_backoff(&ticker).await?;
        self.cache.insert(
            ticker,
            CacheEntry {
                price,
                fetched_at: (self.clock)(),
            },
        );
        Some(price)
    }

    /// Fetch a current price, backing off only on rate limiting.
    async fn fetch_with_backoff(&self, ticker: &str) -> Option<f64> {
        for attempt in 0..self.max_attempts {
            match self.source.current_price(ticker).await {
                Ok(price) => return Some(price),
                Err(QuoteError::NotFound) => {
                    warn!("no data for ticker {}", ticker);
                    return None;
                }
                Err(QuoteError::RateLimited) => {
                    if attempt + 1 >= self.max_attempts {
                        warn!(
                            "rate limit for {}: giving up after {} attempts",
                            ticker, self.max_attempts
                        );
                        return None;
                    }
                    let delay = self.initial_backoff * 2u32.pow(attempt);
                    warn!(
                        "rate limit for {}: attempt {}/{}, backing off {:?}",
                        ticker,
                        attempt + 1,
                        self.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(QuoteError::Transient(cause)) => {
                    warn!("fetch failed for {}: {}", ticker, cause);
                    return None;
                }
            }
        }
        None
    }

    /// Daily close series over `[start, end]`. Direct fetch, no retry,
    /// no caching: history is only read for volatility scoring.
    pub async fn history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<Vec<(NaiveDate, f64)>> {
        let ticker = Self::normalize(ticker);
        match self.source.daily_history(&ticker, start, end).await {
            Ok(series) => Some(series),
            Err(e) => {
                warn!("history fetch failed for {}: {}", ticker, e);
                None
            }
        }
    }

    /// Cache contents for persistence.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Seed the cache from a persisted snapshot.
    pub fn restore(&self, entries: HashMap<String, CacheEntry>) {
        for (ticker, entry) in entries {
            self.cache.insert(Self::normalize(&ticker), entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Quote source that plays back a script of results and counts calls.
    struct ScriptedSource {
        script: Mutex<Vec<Result<f64, QuoteError>>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<f64, QuoteError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl QuoteSource for &ScriptedSource {
        async fn current_price(&self, _ticker: &str) -> Result<f64, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Err(QuoteError::RateLimited)
            } else {
                script.remove(0)
            }
        }

        async fn daily_history(
            &self,
            _ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<(NaiveDate, f64)>, QuoteError> {
            Err(QuoteError::NotFound)
        }
    }

    fn service(source: &ScriptedSource) -> PriceService<&ScriptedSource> {
        PriceService::new(source, 21600, 5, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let source = ScriptedSource::new(vec![Ok(100.0), Ok(999.0)]);
        let now = Arc::new(AtomicI64::new(1_000_000));
        let clock = now.clone();
        let svc = service(&source).with_clock(move || clock.load(Ordering::SeqCst));

        assert_eq!(svc.get_price("aapl").await, Some(100.0));
        // Just before expiry: served from cache, no second fetch.
        now.store(1_000_000 + 21599, Ordering::SeqCst);
        assert_eq!(svc.get_price("AAPL").await, Some(100.0));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_expiry_refetches() {
        let source = ScriptedSource::new(vec![Ok(100.0), Ok(110.0)]);
        let now = Arc::new(AtomicI64::new(1_000_000));
        let clock = now.clone();
        let svc = service(&source).with_clock(move || clock.load(Ordering::SeqCst));

        assert_eq!(svc.get_price("AAPL").await, Some(100.0));
        now.store(1_000_000 + 21601, Ordering::SeqCst);
        assert_eq!(svc.get_price("AAPL").await, Some(110.0));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff_then_success() {
        let source = ScriptedSource::new(vec![
            Err(QuoteError::RateLimited),
            Err(QuoteError::RateLimited),
            Err(QuoteError::RateLimited),
            Err(QuoteError::RateLimited),
            Ok(42.0),
        ]);
        let svc = service(&source);

        let started = tokio::time::Instant::now();
        assert_eq!(svc.get_price("AAPL").await, Some(42.0));
        assert_eq!(source.calls(), 5);
        // Backoff slept 10 + 20 + 40 + 80 seconds.
        assert!(started.elapsed() >= Duration::from_secs(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_budget_exhausted() {
        let source = ScriptedSource::new(vec![]);
        let svc = service(&source);

        assert_eq!(svc.get_price("AAPL").await, None);
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test]
    async fn test_not_found_no_retry() {
        let source = ScriptedSource::new(vec![Err(QuoteError::NotFound)]);
        let svc = service(&source);
        assert_eq!(svc.get_price("NOPE").await, None);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_no_retry() {
        let source = ScriptedSource::new(vec![Err(QuoteError::Transient("boom".into()))]);
        let svc = service(&source);
        assert_eq!(svc.get_price("AAPL").await, None);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let source = ScriptedSource::new(vec![Ok(55.0)]);
        let svc = service(&source);
        svc.get_price("msft").await;

        let snap = svc.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap.contains_key("MSFT"));

        let source2 = ScriptedSource::new(vec![]);
        let now = snap["MSFT"].fetched_at;
        let svc2 = service(&source2).with_clock(move || now + 1);
        svc2.restore(snap);
        // Served from the restored entry, no fetch.
        assert_eq!(svc2.get_price("MSFT").await, Some(55.0));
        assert_eq!(source2.calls(), 0);
    }
}
