//! Upstream price-source trait, capability descriptor and structured error types.
//!
//! The `UpstreamPriceSource` trait abstracts over history feeds (Yahoo Finance,
//! test doubles) so the fetcher can be exercised without a network. The cache
//! and retry layers sit above this trait; sources know about neither.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DateRange, PriceSeries};

/// Failure kinds surfaced by the acquisition layer.
///
/// Every failure path maps onto one of these four. Transport failures never
/// reach analytics code: the fetcher turns them into absent data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// Network, 5xx or rate-limit failure; retried with backoff.
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    /// The call succeeded but returned no bars (unknown ticker, no trading).
    #[error("no price data for '{ticker}'")]
    EmptyResult { ticker: String },

    /// Zero or negative entry price, malformed date range, unordered series.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Local cache read/write failure; treated as a miss by callers.
    #[error("cache I/O error: {0}")]
    CacheIo(String),
}

/// Errors raised by an upstream price source for a single call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpstreamError {
    #[error("rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("network unreachable: {0}")]
    Transport(String),

    #[error("response format changed: {0}")]
    Protocol(String),

    #[error("provider has blocked requests (circuit breaker tripped)")]
    Blocked,
}

impl UpstreamError {
    /// Quota exhaustion, reported either explicitly or as a bare 429.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited { .. } | UpstreamError::Http { status: 429 }
        )
    }
}

impl From<UpstreamError> for DataError {
    fn from(e: UpstreamError) -> Self {
        DataError::TransientUpstream(e.to_string())
    }
}

/// Optional call parameters an upstream source understands.
///
/// Queried once when a fetcher is built and held for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can toggle its own progress output.
    pub progress: bool,
    /// Can fan a multi-ticker call out over parallel transport.
    pub threads: bool,
    /// Can return multi-ticker tables grouped per ticker.
    pub group_by_ticker: bool,
    /// Can suppress its own error printing.
    pub show_errors: bool,
    /// Can reuse a pooled HTTP session across calls.
    pub shared_session: bool,
}

impl Capabilities {
    /// Everything supported.
    pub fn all() -> Self {
        Self {
            progress: true,
            threads: true,
            group_by_ticker: true,
            show_errors: true,
            shared_session: true,
        }
    }

    /// Drop every requested option the source cannot accept.
    pub fn filter(&self, requested: DownloadOptions) -> DownloadOptions {
        DownloadOptions {
            progress: requested.progress.filter(|_| self.progress),
            threads: requested.threads.filter(|_| self.threads),
            group_by_ticker: requested.group_by_ticker.filter(|_| self.group_by_ticker),
            show_errors: requested.show_errors.filter(|_| self.show_errors),
            shared_session: requested.shared_session.filter(|_| self.shared_session),
        }
    }
}

/// Per-call options. `None` means "not passed"; the source uses its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownloadOptions {
    pub progress: Option<bool>,
    pub threads: Option<bool>,
    pub group_by_ticker: Option<bool>,
    pub show_errors: Option<bool>,
    pub shared_session: Option<bool>,
}

impl DownloadOptions {
    /// Options requested for a one-ticker history call.
    pub fn single() -> Self {
        Self {
            progress: Some(false),
            threads: Some(false),
            group_by_ticker: None,
            show_errors: Some(false),
            shared_session: Some(true),
        }
    }

    /// Options requested for a multi-ticker bulk call.
    pub fn bulk() -> Self {
        Self {
            progress: Some(false),
            threads: Some(true),
            group_by_ticker: Some(true),
            show_errors: Some(false),
            shared_session: Some(true),
        }
    }
}

/// Result of one upstream history call, keyed by ticker.
///
/// Tickers the source had nothing for are simply missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    by_ticker: BTreeMap<String, PriceSeries>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ticker: impl Into<String>, series: PriceSeries) {
        self.by_ticker.insert(ticker.into(), series);
    }

    /// Remove and return one ticker's series.
    pub fn take(&mut self, ticker: &str) -> Option<PriceSeries> {
        self.by_ticker.remove(ticker)
    }

    pub fn get(&self, ticker: &str) -> Option<&PriceSeries> {
        self.by_ticker.get(ticker)
    }

    pub fn len(&self) -> usize {
        self.by_ticker.len()
    }

    /// True when no ticker carries any bars.
    pub fn is_empty(&self) -> bool {
        self.by_ticker.values().all(|s| s.is_empty())
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.by_ticker.keys().map(|k| k.as_str())
    }
}

impl FromIterator<(String, PriceSeries)> for PriceTable {
    fn from_iter<I: IntoIterator<Item = (String, PriceSeries)>>(iter: I) -> Self {
        Self {
            by_ticker: iter.into_iter().collect(),
        }
    }
}

/// Trait for upstream history feeds.
///
/// One call, no retries: retry and backoff belong to `ResilientFetcher`.
pub trait UpstreamPriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Which optional parameters this source accepts.
    fn capabilities(&self) -> Capabilities;

    /// Fetch daily closes for one or more tickers over `range`.
    fn historical_prices(
        &self,
        tickers: &[&str],
        range: DateRange,
        options: &DownloadOptions,
    ) -> Result<PriceTable, UpstreamError>;

    /// Whether the source is currently accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}
