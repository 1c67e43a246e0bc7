//! Cache-first, retrying wrapper around a single upstream history call.
//!
//! Failure handling per attempt:
//! - rate limit: wait `backoff_base * 2^attempt + jitter` before retrying
//! - other upstream failure: wait `transient_delay`, retry
//! - success with no bars: give up for this call (ticker likely invalid)
//!
//! Exhausting attempts yields `None`: "no price for this ticker/range" is an
//! ordinary outcome, not an error.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::cache::PriceCache;
use super::pacing::{uniform_between, Sleeper, ThreadSleeper};
use super::provider::{Capabilities, DataError, DownloadOptions, UpstreamPriceSource};
use crate::domain::{DateRange, PriceSeries};

/// Retry and backoff settings for one fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Upstream attempts per `fetch` when the caller doesn't say otherwise.
    pub max_attempts: u32,
    /// Fixed wait after a non-rate-limit failure.
    pub transient_delay: Duration,
    /// Multiplied by `2^attempt` on rate limiting.
    pub backoff_base: Duration,
    /// Random jitter added to every rate-limit wait.
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transient_delay: Duration::from_secs(1),
            backoff_base: Duration::from_secs(1),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all; for tests and offline replays.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            transient_delay: Duration::ZERO,
            backoff_base: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.max_attempts == 0 {
            return Err(DataError::InvalidInput("max_attempts must be at least 1".into()));
        }
        if self.jitter_min > self.jitter_max {
            return Err(DataError::InvalidInput(format!(
                "jitter_min {:?} exceeds jitter_max {:?}",
                self.jitter_min, self.jitter_max
            )));
        }
        Ok(())
    }

    /// Exponential part of a rate-limit wait for a 0-based attempt.
    pub fn backoff_floor(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Fetches one ticker's history, consulting the cache first.
pub struct ResilientFetcher {
    upstream: Arc<dyn UpstreamPriceSource>,
    cache: PriceCache,
    capabilities: Capabilities,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    rng: Mutex<StdRng>,
}

impl ResilientFetcher {
    /// Build a fetcher. Queries the upstream's capabilities exactly once.
    pub fn new(
        upstream: Arc<dyn UpstreamPriceSource>,
        cache: PriceCache,
        policy: RetryPolicy,
    ) -> Result<Self, DataError> {
        policy.validate()?;
        let capabilities = upstream.capabilities();
        tracing::debug!(source = upstream.name(), ?capabilities, "queried upstream capabilities");
        Ok(Self {
            upstream,
            cache,
            capabilities,
            policy,
            sleeper: Arc::new(ThreadSleeper),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Replace the sleeper (tests record instead of blocking).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Seed the jitter RNG for reproducible waits.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn upstream(&self) -> &dyn UpstreamPriceSource {
        self.upstream.as_ref()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Series for `ticker` over `range`, from cache or upstream.
    ///
    /// A fresh cache entry returns without any upstream call. Otherwise up
    /// to `max_attempts` upstream calls are made; a non-empty result is
    /// written through to the cache.
    pub fn fetch(&self, ticker: &str, range: DateRange, max_attempts: u32) -> Option<PriceSeries> {
        if let Some(series) = self.cache.get(ticker, range) {
            return Some(series);
        }
        self.fetch_uncached(ticker, range, max_attempts)
    }

    /// `fetch` with the policy's attempt budget.
    pub fn fetch_default(&self, ticker: &str, range: DateRange) -> Option<PriceSeries> {
        self.fetch(ticker, range, self.policy.max_attempts)
    }

    /// Upstream-only path; the caller has already missed the cache.
    pub(crate) fn fetch_uncached(
        &self,
        ticker: &str,
        range: DateRange,
        max_attempts: u32,
    ) -> Option<PriceSeries> {
        let options = self.download_options(DownloadOptions::single());

        for attempt in 0..max_attempts {
            let has_next = attempt + 1 < max_attempts;

            if !self.upstream.is_available() {
                tracing::warn!(ticker, source = self.upstream.name(), "upstream unavailable, giving up");
                return None;
            }

            tracing::debug!(ticker, %range, attempt = attempt + 1, max_attempts, "fetching from upstream");

            match self.upstream.historical_prices(&[ticker], range, &options) {
                Ok(mut table) => {
                    let series = match table.take(ticker) {
                        Some(series) => Some(series),
                        None if table.len() == 1 => {
                            let only = table.tickers().next().map(str::to_string);
                            only.and_then(|t| table.take(&t))
                        }
                        None => None,
                    };
                    match series.filter(|s| !s.is_empty()) {
                        Some(series) => {
                            if let Err(e) = self.cache.put(ticker, range, &series) {
                                tracing::warn!(ticker, error = %e, "cache write failed");
                            }
                            tracing::info!(ticker, %range, bars = series.len(), "fetched series");
                            return Some(series);
                        }
                        None => {
                            let e = DataError::EmptyResult {
                                ticker: ticker.to_string(),
                            };
                            tracing::info!(ticker, %range, error = %e, "upstream returned no bars");
                            return None;
                        }
                    }
                }
                Err(e) if e.is_rate_limit() => {
                    if !has_next {
                        tracing::warn!(ticker, attempt = attempt + 1, "rate limited on final attempt");
                        continue;
                    }
                    let wait = self.rate_limit_wait(attempt);
                    tracing::warn!(
                        ticker,
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited"
                    );
                    self.pause(wait);
                }
                Err(e) => {
                    let e = DataError::from(e);
                    tracing::warn!(ticker, attempt = attempt + 1, error = %e, "upstream call failed");
                    if has_next {
                        self.pause(self.policy.transient_delay);
                    }
                }
            }
        }

        tracing::warn!(ticker, %range, max_attempts, "giving up after exhausting attempts");
        None
    }

    /// Requested options minus anything the upstream didn't advertise.
    pub(crate) fn download_options(&self, requested: DownloadOptions) -> DownloadOptions {
        self.capabilities.filter(requested)
    }

    /// `backoff_base * 2^attempt + U[jitter_min, jitter_max]`.
    pub(crate) fn rate_limit_wait(&self, attempt: u32) -> Duration {
        self.policy.backoff_floor(attempt)
            + self.jitter(self.policy.jitter_min, self.policy.jitter_max)
    }

    pub(crate) fn jitter(&self, min: Duration, max: Duration) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        uniform_between(&mut *rng, min, max)
    }

    /// Wait through the fetcher's sleeper, so callers pacing their own
    /// request sequences stay observable in tests.
    pub fn pause(&self, duration: Duration) {
        self.sleeper.sleep(duration);
    }
}
