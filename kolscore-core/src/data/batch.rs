//! Batch acquisition: coordinates many-ticker downloads under a pacing budget.
//!
//! Tickers are split into fixed-size batches (input order preserved). Within
//! a batch, cache hits resolve immediately; misses go out in one bulk call
//! when preferred, degrading to the per-ticker fetcher if the bulk call fails
//! outright. Batches are separated by a fixed delay, which is the only
//! backpressure against the upstream rate limiter.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::fetcher::ResilientFetcher;
use super::provider::{DataError, DownloadOptions};
use crate::domain::{DateRange, PriceSeries};

/// Batching and pacing settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub batch_size: usize,
    /// Sleep after every batch but the last.
    pub inter_batch_delay: Duration,
    /// Try one multi-ticker call per batch before going ticker by ticker.
    pub prefer_bulk: bool,
    /// Random spacing between consecutive per-ticker calls in a batch.
    pub ticker_delay_min: Duration,
    pub ticker_delay_max: Duration,
    /// Attempt budget for each per-ticker fetch.
    pub max_attempts: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay: Duration::from_secs(3),
            prefer_bulk: true,
            ticker_delay_min: Duration::from_secs(1),
            ticker_delay_max: Duration::from_secs(3),
            max_attempts: 3,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result<(), DataError> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidInput("batch_size must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(DataError::InvalidInput("max_attempts must be at least 1".into()));
        }
        if self.ticker_delay_min > self.ticker_delay_max {
            return Err(DataError::InvalidInput(
                "ticker_delay_min exceeds ticker_delay_max".into(),
            ));
        }
        Ok(())
    }
}

/// Where each resolved ticker came from, plus what stayed unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireSummary {
    pub requested: usize,
    pub batches: usize,
    pub from_cache: usize,
    pub from_bulk: usize,
    pub from_single: usize,
    /// Batches whose bulk call failed outright and fell back to per-ticker.
    pub bulk_degraded: usize,
    pub unresolved: Vec<String>,
}

impl AcquireSummary {
    pub fn resolved(&self) -> usize {
        self.from_cache + self.from_bulk + self.from_single
    }

    pub fn all_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Whether any ticker had to go past the cache.
    pub fn touched_upstream(&self) -> bool {
        self.from_cache < self.requested
    }
}

/// Series keyed by ticker plus the acquisition summary.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    pub series: HashMap<String, PriceSeries>,
    pub summary: AcquireSummary,
}

/// Orchestrates acquisition for many tickers through one fetcher.
pub struct BatchAcquirer<'a> {
    fetcher: &'a ResilientFetcher,
}

impl<'a> BatchAcquirer<'a> {
    pub fn new(fetcher: &'a ResilientFetcher) -> Self {
        Self { fetcher }
    }

    /// Series for every ticker that could be resolved. Unresolvable tickers
    /// are simply absent from the map.
    pub fn acquire_many(
        &self,
        tickers: &[&str],
        range: DateRange,
        options: &BatchOptions,
    ) -> Result<HashMap<String, PriceSeries>, DataError> {
        Ok(self.acquire_detailed(tickers, range, options)?.series)
    }

    /// `acquire_many` with per-source counts.
    ///
    /// Only fails on invalid options; upstream failures become unresolved
    /// tickers.
    pub fn acquire_detailed(
        &self,
        tickers: &[&str],
        range: DateRange,
        options: &BatchOptions,
    ) -> Result<Acquisition, DataError> {
        options.validate()?;

        let mut seen = HashSet::new();
        let unique: Vec<&str> = tickers.iter().copied().filter(|t| seen.insert(*t)).collect();

        let batches: Vec<&[&str]> = unique.chunks(options.batch_size).collect();
        let mut out = Acquisition::default();
        out.summary.requested = unique.len();
        out.summary.batches = batches.len();

        for (i, batch) in batches.iter().enumerate() {
            tracing::info!(batch = i + 1, of = batches.len(), tickers = ?batch, "acquiring batch");
            self.acquire_batch(batch, range, options, &mut out);

            if i + 1 < batches.len() {
                tracing::debug!(delay_secs = options.inter_batch_delay.as_secs_f64(), "pacing between batches");
                self.fetcher.pause(options.inter_batch_delay);
            }
        }

        tracing::info!(
            requested = out.summary.requested,
            resolved = out.summary.resolved(),
            from_cache = out.summary.from_cache,
            from_bulk = out.summary.from_bulk,
            from_single = out.summary.from_single,
            unresolved = out.summary.unresolved.len(),
            "acquisition complete"
        );
        Ok(out)
    }

    fn acquire_batch(
        &self,
        batch: &[&str],
        range: DateRange,
        options: &BatchOptions,
        out: &mut Acquisition,
    ) {
        let cache = self.fetcher.cache();
        let mut misses = Vec::new();
        for &ticker in batch {
            match cache.get(ticker, range) {
                Some(series) => {
                    out.series.insert(ticker.to_string(), series);
                    out.summary.from_cache += 1;
                }
                None => misses.push(ticker),
            }
        }

        if misses.is_empty() {
            return;
        }

        if options.prefer_bulk {
            match self.bulk(&misses, range) {
                Some(resolved) => {
                    for ticker in misses {
                        match resolved.get(ticker) {
                            Some(series) => {
                                out.series.insert(ticker.to_string(), series.clone());
                                out.summary.from_bulk += 1;
                            }
                            None => {
                                tracing::info!(ticker, "no data in bulk response");
                                out.summary.unresolved.push(ticker.to_string());
                            }
                        }
                    }
                    return;
                }
                None => {
                    tracing::warn!(tickers = ?misses, "bulk download failed, degrading to per-ticker");
                    out.summary.bulk_degraded += 1;
                }
            }
        }

        self.per_ticker(&misses, range, options, out);
    }

    /// One multi-ticker call. `None` means total failure (error, or not a
    /// single ticker came back with bars).
    fn bulk(&self, tickers: &[&str], range: DateRange) -> Option<HashMap<String, PriceSeries>> {
        let upstream = self.fetcher.upstream();
        if !upstream.is_available() {
            return None;
        }
        let options = self.fetcher.download_options(DownloadOptions::bulk());

        let mut table = match upstream.historical_prices(tickers, range, &options) {
            Ok(table) => table,
            Err(e) => {
                let e = DataError::from(e);
                tracing::warn!(error = %e, "bulk call failed");
                return None;
            }
        };
        if table.is_empty() {
            return None;
        }

        let mut resolved = HashMap::new();
        for &ticker in tickers {
            if let Some(series) = table.take(ticker).filter(|s| !s.is_empty()) {
                if let Err(e) = self.fetcher.cache().put(ticker, range, &series) {
                    tracing::warn!(ticker, error = %e, "cache write failed");
                }
                resolved.insert(ticker.to_string(), series);
            }
        }
        Some(resolved)
    }

    fn per_ticker(
        &self,
        tickers: &[&str],
        range: DateRange,
        options: &BatchOptions,
        out: &mut Acquisition,
    ) {
        for (i, &ticker) in tickers.iter().enumerate() {
            match self.fetcher.fetch_uncached(ticker, range, options.max_attempts) {
                Some(series) => {
                    out.series.insert(ticker.to_string(), series);
                    out.summary.from_single += 1;
                }
                None => out.summary.unresolved.push(ticker.to_string()),
            }

            if i + 1 < tickers.len() {
                let delay = self
                    .fetcher
                    .jitter(options.ticker_delay_min, options.ticker_delay_max);
                self.fetcher.pause(delay);
            }
        }
    }
}

/// Same-range acquisition helper for callers holding owned tickers.
pub fn acquire_owned(
    fetcher: &ResilientFetcher,
    tickers: &[String],
    range: DateRange,
    options: &BatchOptions,
) -> Result<Acquisition, DataError> {
    let refs: Vec<&str> = tickers.iter().map(String::as_str).collect();
    BatchAcquirer::new(fetcher).acquire_detailed(&refs, range, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(BatchOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let opts = BatchOptions {
            batch_size: 0,
            ..BatchOptions::default()
        };
        assert!(matches!(opts.validate(), Err(DataError::InvalidInput(_))));
    }

    #[test]
    fn summary_counts_resolved() {
        let s = AcquireSummary {
            from_cache: 1,
            from_bulk: 2,
            from_single: 3,
            ..AcquireSummary::default()
        };
        assert_eq!(s.resolved(), 6);
        assert!(s.all_resolved());
    }

    #[test]
    fn touched_upstream_only_when_something_missed_the_cache() {
        let cached = AcquireSummary {
            requested: 2,
            from_cache: 2,
            ..AcquireSummary::default()
        };
        assert!(!cached.touched_upstream());
        let missed = AcquireSummary {
            requested: 2,
            from_cache: 1,
            unresolved: vec!["NOPE".into()],
            ..AcquireSummary::default()
        };
        assert!(missed.touched_upstream());
        assert!(!AcquireSummary::default().touched_upstream());
    }
}
