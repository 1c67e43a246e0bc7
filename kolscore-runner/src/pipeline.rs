//! End-to-end passes over the stores: score pending predictions, refresh
//! performance snapshots, purge stale cache entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use kolscore_core::data::{CircuitBreaker, DataError, ResilientFetcher, UpstreamError, YahooSource};

use crate::config::{ConfigError, KolConfig};
use crate::grade::GradeCalculator;
use crate::metrics::{PerformanceAggregator, PerformanceRecord};
use crate::scoring::EventScorer;
use crate::store::{PerformanceStore, PredictionStore, RecordFilter, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("upstream setup failed: {0}")]
    Upstream(#[from] UpstreamError),
}

/// A fetcher backed by Yahoo Finance, with cache, retry policy and request
/// timeout taken from `config`.
pub fn build_yahoo_fetcher(config: &KolConfig) -> Result<ResilientFetcher, PipelineError> {
    let breaker = Arc::new(CircuitBreaker::default_provider());
    let source = YahooSource::new(breaker, config.fetch.request_timeout())?;
    let cache = config.cache.open()?;
    let fetcher = ResilientFetcher::new(Arc::new(source), cache, config.retry_policy())?;
    Ok(fetcher)
}

/// Outcome of a `score_pending` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringSummary {
    /// Unscored rows considered.
    pub pending: usize,
    /// Rows that gained an entry price.
    pub scored: usize,
}

/// Score every stored prediction that has no entry price yet and write the
/// results back. Rows still lacking price data stay unscored for a later pass.
pub fn score_pending<S>(store: &mut S, scorer: &EventScorer<'_>) -> Result<ScoringSummary, PipelineError>
where
    S: PredictionStore + ?Sized,
{
    let pending = store.query(&RecordFilter::all().unscored())?;
    if pending.is_empty() {
        tracing::debug!("no pending predictions");
        return Ok(ScoringSummary::default());
    }

    let (ids, events): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .map(|(id, row)| (id, row.event))
        .unzip();
    let scored = scorer.score_all(&events)?;

    let mut summary = ScoringSummary {
        pending: ids.len(),
        scored: 0,
    };
    for (id, row) in ids.into_iter().zip(scored) {
        if row.is_scored() {
            store.update(id, row)?;
            summary.scored += 1;
        }
    }
    tracing::info!(pending = summary.pending, scored = summary.scored, "scored pending predictions");
    Ok(summary)
}

/// Outcome of a `refresh_returns` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Scored rows that were missing at least one horizon.
    pub incomplete: usize,
    /// Rows whose returns changed.
    pub updated: usize,
}

/// Revisit scored rows still missing a horizon return and recompute their
/// returns against the stored entry price. Forward windows come through the
/// cache, so a row only picks up new bars once its cached window expires.
pub fn refresh_returns<S>(store: &mut S, scorer: &EventScorer<'_>) -> Result<RefreshSummary, PipelineError>
where
    S: PredictionStore + ?Sized,
{
    let incomplete = store.query(&RecordFilter::all().incomplete())?;
    if incomplete.is_empty() {
        tracing::debug!("no incomplete returns");
        return Ok(RefreshSummary::default());
    }

    let (ids, rows): (Vec<_>, Vec<_>) = incomplete.into_iter().unzip();
    let refreshed = scorer.refresh_all(&rows)?;

    let mut summary = RefreshSummary {
        incomplete: ids.len(),
        updated: 0,
    };
    for ((id, before), after) in ids.into_iter().zip(&rows).zip(refreshed) {
        if after.returns != before.returns {
            store.update(id, after)?;
            summary.updated += 1;
        }
    }
    tracing::info!(incomplete = summary.incomplete, updated = summary.updated, "refreshed forward returns");
    Ok(summary)
}

/// Recompute every entity's record from all stored predictions, grade it,
/// and upsert the snapshots. Returns the fresh records by entity name.
pub fn refresh_performance<P, S>(
    predictions: &P,
    snapshots: &mut S,
    aggregator: &PerformanceAggregator,
    grader: &GradeCalculator,
) -> Result<BTreeMap<String, PerformanceRecord>, PipelineError>
where
    P: PredictionStore + ?Sized,
    S: PerformanceStore + ?Sized,
{
    let events: Vec<_> = predictions
        .query(&RecordFilter::all())?
        .into_iter()
        .map(|(_, row)| row)
        .collect();

    let records = grader.apply_grades(aggregator.aggregate_all(&events));
    for record in records.values() {
        snapshots.upsert(record.clone())?;
    }
    Ok(records)
}

/// Drop cache entries older than `[cache] purge_after_days`.
pub fn purge_cache(config: &KolConfig) -> Result<usize, PipelineError> {
    let cache = config.cache.open()?;
    let removed = cache.purge(config.cache.purge_after())?;
    tracing::info!(removed, dir = %cache.cache_dir().display(), "purged price cache");
    Ok(removed)
}
