//! External market-data access.
//!
//! `QuoteSource` is the seam between the engine and the quote provider.
//! The production implementation speaks a Yahoo-style chart API over
//! HTTP; tests substitute scripted sources. Failures are classified so
//! the price layer knows what to retry (only explicit rate limiting).

use anyhow::Context;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuoteError {
    /// Unknown ticker or empty price series. Not worth retrying.
    #[error("no data for ticker")]
    NotFound,

    /// Explicit "too many requests" from the source. Retry with backoff.
    #[error("rate limited by quote source")]
    RateLimited,

    /// Anything else (network, bad payload, 5xx). Not retried.
    #[error("transient quote source error: {0}")]
    Transient(String),
}

/// A provider of current prices and historical daily closes.
pub trait QuoteSource: Send + Sync {
    /// Latest price for a ticker.
    fn current_price(
        &self,
        ticker: &str,
    ) -> impl Future<Output = Result<f64, QuoteError>> + Send;

    /// Daily close series over `[start, end]`, ordered by date.
    /// An empty series is reported as `NotFound`.
    fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<(NaiveDate, f64)>, QuoteError>> + Send;
}

// Yahoo-style chart API payload. Only the fields we read.

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// HTTP quote source against a chart-style market-data endpoint.
pub struct HttpQuoteSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQuoteSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn fetch_chart(&self, url: &str) -> Result<ChartResult, QuoteError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| QuoteError::Transient(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(QuoteError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => return Err(QuoteError::RateLimited),
            status if !status.is_success() => {
                return Err(QuoteError::Transient(format!("HTTP {}", status)));
            }
            _ => {}
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::Transient(format!("bad payload: {}", e)))?;

        body.chart
            .result
            .and_then(|mut results| {
                if results.is_empty() {
                    None
                } else {
                    Some(results.remove(0))
                }
            })
            .ok_or(QuoteError::NotFound)
    }
}

impl QuoteSource for HttpQuoteSource {
    async fn current_price(&self, ticker: &str) -> Result<f64, QuoteError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range=1d&interval=1d",
            self.base_url, ticker
        );
        let result = self.fetch_chart(&url).await?;

        // Prefer the meta price; fall back to the last close of the day.
        if let Some(price) = result.meta.regular_market_price {
            return Ok(price);
        }
        result
            .indicators
            .quote
            .first()
            .and_then(|q| q.close.iter().rev().find_map(|c| *c))
            .ok_or(QuoteError::NotFound)
    }

    async fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, QuoteError> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(0);
        let period2 = end
            .and_hms_opt(23, 59, 59)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(0);
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url, ticker, period1, period2
        );
        let result = self.fetch_chart(&url).await?;

        let timestamps = result.timestamp.unwrap_or_default();
        let closes = result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default();

        let mut series: Vec<(NaiveDate, f64)> = timestamps
            .iter()
            .zip(closes.iter())
            .filter_map(|(ts, close)| {
                let close = (*close)?;
                let date = chrono::DateTime::from_timestamp(*ts, 0)?.date_naive();
                Some((date, close))
            })
            .collect();
        series.sort_by_key(|(date, _)| *date);

        if series.is_empty() {
            return Err(QuoteError::NotFound);
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_payload_parsing() {
        let json = r#"{
            "chart": {
                "result": [{
                    "meta": {"regularMarketPrice": 187.44},
                    "timestamp": [1700000000, 1700086400],
                    "indicators": {"quote": [{"close": [186.2, 187.44]}]}
                }]
            }
        }"#;
        let parsed: ChartResponse = serde_json::from_str(json).unwrap();
        let result = &parsed.chart.result.as_ref().unwrap()[0];
        assert_eq!(result.meta.regular_market_price, Some(187.44));
        assert_eq!(result.indicators.quote[0].close.len(), 2);
    }

    #[test]
    fn test_chart_payload_null_result() {
        let json = r#"{"chart": {"result": null}}"#;
        let parsed: ChartResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.chart.result.is_none());
    }
}
