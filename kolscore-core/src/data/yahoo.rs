//! Yahoo Finance upstream source.
//!
//! Fetches daily closes from Yahoo's v8 chart API. One HTTP request per
//! ticker per call, no retries (the fetcher owns retry and backoff). Bulk
//! calls fan out per ticker, in parallel when the `threads` option is set.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes and aggressive rate limiting; the circuit breaker stops us from
//! hammering it after a ban.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Deserialize;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{Capabilities, DownloadOptions, PriceTable, UpstreamError, UpstreamPriceSource};
use crate::domain::{DateRange, PricePoint, PriceSeries};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance upstream.
pub struct YahooSource {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    timeout: Option<Duration>,
}

impl YahooSource {
    /// `timeout` bounds each HTTP request; `None` leaves it unbounded.
    pub fn new(
        circuit_breaker: Arc<CircuitBreaker>,
        timeout: Option<Duration>,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_client(timeout)?,
            circuit_breaker,
            timeout,
        })
    }

    /// Chart API URL for a ticker over a half-open date range.
    fn chart_url(ticker: &str, range: DateRange) -> String {
        let start_ts = midnight_utc(range.start());
        let end_ts = midnight_utc(range.end());
        format!(
            "{BASE_URL}/{ticker}?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true"
        )
    }

    /// Parse a chart response into a canonical series.
    ///
    /// An unknown symbol yields an empty series, not an error: the call
    /// itself succeeded.
    fn parse_response(resp: ChartResponse) -> Result<PriceSeries, UpstreamError> {
        let result = match resp.chart.result {
            Some(result) => result,
            None => {
                return match resp.chart.error {
                    Some(err) if err.code == "Not Found" => Ok(PriceSeries::default()),
                    Some(err) => Err(UpstreamError::Protocol(format!(
                        "{}: {}",
                        err.code, err.description
                    ))),
                    None => Err(UpstreamError::Protocol("empty result with no error".into())),
                };
            }
        };

        let Some(data) = result.into_iter().next() else {
            return Ok(PriceSeries::default());
        };
        let Some(timestamps) = data.timestamp else {
            return Ok(PriceSeries::default());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::Protocol("no quote data".into()))?;
        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut points = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| UpstreamError::Protocol(format!("invalid timestamp: {ts}")))?;

            // Adjusted close when present, raw close otherwise; skip holidays.
            let close = adj_closes
                .as_ref()
                .and_then(|v| v.get(i).copied().flatten())
                .or_else(|| quote.close.get(i).copied().flatten());
            if let Some(close) = close {
                points.push(PricePoint::new(date, close));
            }
        }

        Ok(PriceSeries::from_unsorted(points))
    }

    /// One HTTP request for one ticker.
    fn fetch_one(
        &self,
        client: &reqwest::blocking::Client,
        ticker: &str,
        range: DateRange,
    ) -> Result<PriceSeries, UpstreamError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(UpstreamError::Blocked);
        }

        let url = Self::chart_url(ticker, range);
        let resp = client.get(&url).send().map_err(|e| {
            self.circuit_breaker.record_failure();
            UpstreamError::Transport(e.to_string())
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            // IP ban: trip the breaker immediately
            self.circuit_breaker.trip();
            return Err(UpstreamError::Blocked);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(UpstreamError::RateLimited { retry_after_secs });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(PriceSeries::default());
        }
        if !status.is_success() {
            self.circuit_breaker.record_failure();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            UpstreamError::Protocol(format!("failed to parse response for {ticker}: {e}"))
        })?;
        let series = Self::parse_response(chart)?;
        self.circuit_breaker.record_success();
        Ok(series)
    }
}

impl UpstreamPriceSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn historical_prices(
        &self,
        tickers: &[&str],
        range: DateRange,
        options: &DownloadOptions,
    ) -> Result<PriceTable, UpstreamError> {
        // Without a shared session every call gets a fresh connection pool.
        let fresh;
        let client = if options.shared_session.unwrap_or(true) {
            &self.client
        } else {
            fresh = build_client(self.timeout)?;
            &fresh
        };
        let progress = options.progress.unwrap_or(false);
        let show_errors = options.show_errors.unwrap_or(true);

        let fetch = |ticker: &&str| {
            if progress {
                tracing::info!(ticker = *ticker, "downloading");
            }
            let result = self.fetch_one(client, ticker, range);
            if let Err(e) = &result {
                if show_errors {
                    tracing::warn!(ticker = *ticker, error = %e, "yahoo request failed");
                }
            }
            (ticker.to_string(), result)
        };

        let results: Vec<(String, Result<PriceSeries, UpstreamError>)> =
            if options.threads.unwrap_or(false) && tickers.len() > 1 {
                tickers.par_iter().map(fetch).collect()
            } else {
                tickers.iter().map(fetch).collect()
            };

        let mut table = PriceTable::new();
        let mut first_error = None;
        let mut any_ok = false;
        for (ticker, result) in results {
            match result {
                Ok(series) => {
                    any_ok = true;
                    table.insert(ticker, series);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        // A multi-ticker call only fails when every ticker failed.
        match first_error {
            Some(e) if !any_ok => Err(e),
            _ => Ok(table),
        }
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

fn build_client(timeout: Option<Duration>) -> Result<reqwest::blocking::Client, UpstreamError> {
    let mut builder = reqwest::blocking::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| UpstreamError::Transport(format!("failed to build HTTP client: {e}")))
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}
