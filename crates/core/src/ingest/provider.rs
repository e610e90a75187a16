use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use crate::config::Settings;
use crate::domain::price::PricePoint;
use crate::ingest::types::DailyPricesResponse;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/daily_prices";
const DEFAULT_RETRIES: u32 = 3;

/// Upstream source of adjusted daily closes for a ticker universe.
#[async_trait::async_trait]
pub trait PriceProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Fetch daily history for the given tickers over [start, end],
    /// returning validated rows plus the raw response for auditing.
    async fn fetch_daily_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Vec<PricePoint>, Value)>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonPriceProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonPriceProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_price_provider_base_url()?.to_string();
        let api_key = settings.price_provider_api_key.clone();

        let timeout_secs = std::env::var("PRICE_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("PRICE_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let path = std::env::var("PRICE_PROVIDER_PRICES_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build price provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(DailyPricesResponse, Value)> {
        let url = self.url();
        let headers = self.headers()?;

        let res = self
            .http
            .get(url)
            .headers(headers)
            .query(&[
                ("tickers", tickers.join(",")),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ])
            .send()
            .await
            .context("price provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("provider response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("price provider HTTP {status}: {raw_json}");
        }

        let parsed = serde_json::from_value::<DailyPricesResponse>(raw_json.clone())
            .context("failed to parse provider response into DailyPricesResponse")?;
        Ok((parsed, raw_json))
    }
}

#[async_trait::async_trait]
impl PriceProvider for HttpJsonPriceProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_daily_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Vec<PricePoint>, Value)> {
        anyhow::ensure!(!tickers.is_empty(), "ticker universe must be non-empty");
        anyhow::ensure!(start <= end, "start {start} is after end {end}");

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = self.fetch_once(tickers, start, end).await;
            match res {
                Ok((parsed, raw)) => {
                    validate_response(&parsed, start, end)?;
                    return Ok((parsed.prices, raw));
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "price provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Downstream computation requires per-ticker ascending, deduplicated
/// series; reject responses that break that contract instead of silently
/// reordering them.
fn validate_response(resp: &DailyPricesResponse, start: NaiveDate, end: NaiveDate) -> Result<()> {
    let mut last_date: HashMap<&str, NaiveDate> = HashMap::new();

    for point in &resp.prices {
        anyhow::ensure!(!point.ticker.trim().is_empty(), "ticker must be non-empty");
        anyhow::ensure!(
            point.adj_close.is_finite() && point.adj_close > 0.0,
            "adj_close must be positive and finite for {} on {} (got {})",
            point.ticker,
            point.date,
            point.adj_close
        );
        anyhow::ensure!(
            point.date >= start && point.date <= end,
            "date {} for {} is outside the requested range {start}..={end}",
            point.date,
            point.ticker
        );

        if let Some(prev) = last_date.get(point.ticker.as_str()) {
            anyhow::ensure!(
                point.date > *prev,
                "prices for {} are not strictly ascending ({prev} then {})",
                point.ticker,
                point.date
            );
        }
        last_date.insert(point.ticker.as_str(), point.date);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
    }

    fn parse(v: Value) -> DailyPricesResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn parses_expected_shape() {
        let parsed = parse(json!({
            "prices": [
                {"ticker": "AAPL", "date": "2024-03-01", "adj_close": 180.5, "volume": 1000},
                {"ticker": "AAPL", "date": "2024-03-04", "adj_close": 181.25, "volume": null}
            ]
        }));
        assert_eq!(parsed.prices.len(), 2);
        assert_eq!(parsed.prices[0].ticker, "AAPL");
        assert_eq!(parsed.prices[1].volume, None);
    }

    #[test]
    fn accepts_ascending_multi_ticker_series() {
        let (start, end) = range();
        let parsed = parse(json!({
            "prices": [
                {"ticker": "AAPL", "date": "2024-03-01", "adj_close": 180.5, "volume": 1},
                {"ticker": "MSFT", "date": "2024-03-01", "adj_close": 410.0, "volume": 2},
                {"ticker": "AAPL", "date": "2024-03-04", "adj_close": 181.0, "volume": 3},
                {"ticker": "MSFT", "date": "2024-03-04", "adj_close": 411.0, "volume": 4}
            ]
        }));
        assert!(validate_response(&parsed, start, end).is_ok());
    }

    #[test]
    fn rejects_duplicate_or_descending_dates() {
        let (start, end) = range();
        let duplicated = parse(json!({
            "prices": [
                {"ticker": "AAPL", "date": "2024-03-01", "adj_close": 180.5, "volume": 1},
                {"ticker": "AAPL", "date": "2024-03-01", "adj_close": 180.5, "volume": 1}
            ]
        }));
        assert!(validate_response(&duplicated, start, end).is_err());

        let descending = parse(json!({
            "prices": [
                {"ticker": "AAPL", "date": "2024-03-04", "adj_close": 181.0, "volume": 1},
                {"ticker": "AAPL", "date": "2024-03-01", "adj_close": 180.5, "volume": 1}
            ]
        }));
        assert!(validate_response(&descending, start, end).is_err());
    }

    #[test]
    fn rejects_non_positive_close() {
        let (start, end) = range();
        let parsed = parse(json!({
            "prices": [
                {"ticker": "AAPL", "date": "2024-03-01", "adj_close": 0.0, "volume": 1}
            ]
        }));
        assert!(validate_response(&parsed, start, end).is_err());
    }

    #[test]
    fn rejects_out_of_range_date() {
        let (start, end) = range();
        let parsed = parse(json!({
            "prices": [
                {"ticker": "AAPL", "date": "2023-12-29", "adj_close": 179.0, "volume": 1}
            ]
        }));
        assert!(validate_response(&parsed, start, end).is_err());
    }

    #[test]
    fn rejects_blank_ticker() {
        let (start, end) = range();
        let parsed = parse(json!({
            "prices": [
                {"ticker": "  ", "date": "2024-03-01", "adj_close": 10.0, "volume": 1}
            ]
        }));
        assert!(validate_response(&parsed, start, end).is_err());
    }
}
