//! Persistence interfaces for predictions and performance snapshots.
//!
//! The scoring pipeline only needs id-keyed CRUD, a handful of equality and
//! range filters, and upserts by entity name. `MemoryStore` implements both
//! traits in memory; `SnapshotLog` keeps performance snapshots in an
//! append-only JSONL file.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kolscore_core::domain::{PredictionEvent, ScoredEvent};

use crate::metrics::PerformanceRecord;

/// Surrogate key of a stored prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record {0}")]
    NotFound(RecordId),

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Query filter over stored predictions. Unset fields match everything;
/// the timestamp range is inclusive at both ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub entity_name: Option<String>,
    pub ticker: Option<String>,
    pub sector: Option<String>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    /// Only events with an entry price.
    pub scored_only: bool,
    /// Only events without an entry price.
    pub unscored_only: bool,
    /// Only scored events still missing a horizon return.
    pub incomplete_returns: bool,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn entity(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    pub fn ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn between(mut self, from: NaiveDateTime, to: NaiveDateTime) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn scored(mut self) -> Self {
        self.scored_only = true;
        self
    }

    pub fn unscored(mut self) -> Self {
        self.unscored_only = true;
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.incomplete_returns = true;
        self
    }

    pub fn matches(&self, scored: &ScoredEvent) -> bool {
        let e = &scored.event;
        self.entity_name.as_ref().map_or(true, |n| *n == e.entity_name)
            && self.ticker.as_ref().map_or(true, |t| *t == e.ticker)
            && self.sector.as_ref().map_or(true, |s| *s == e.sector)
            && self.from.map_or(true, |from| e.prediction_timestamp >= from)
            && self.to.map_or(true, |to| e.prediction_timestamp <= to)
            && (!self.scored_only || scored.is_scored())
            && (!self.unscored_only || !scored.is_scored())
            && (!self.incomplete_returns || (scored.is_scored() && !scored.returns.is_complete()))
    }
}

/// Prediction rows keyed by surrogate id.
pub trait PredictionStore {
    /// Store a new, unscored prediction.
    fn insert(&mut self, event: PredictionEvent) -> Result<RecordId, StoreError>;

    fn get(&self, id: RecordId) -> Result<Option<ScoredEvent>, StoreError>;

    /// Replace the stored row.
    fn update(&mut self, id: RecordId, scored: ScoredEvent) -> Result<(), StoreError>;

    /// Remove and return the stored row.
    fn delete(&mut self, id: RecordId) -> Result<ScoredEvent, StoreError>;

    /// Matching rows, newest prediction first.
    fn query(&self, filter: &RecordFilter) -> Result<Vec<(RecordId, ScoredEvent)>, StoreError>;
}

/// Latest performance snapshot per entity.
pub trait PerformanceStore {
    fn upsert(&mut self, record: PerformanceRecord) -> Result<(), StoreError>;

    fn snapshot(&self, entity_name: &str) -> Result<Option<PerformanceRecord>, StoreError>;

    /// Every entity's latest snapshot, ordered by entity name.
    fn snapshots(&self) -> Result<Vec<PerformanceRecord>, StoreError>;
}

/// In-memory implementation of both stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    next_id: u64,
    predictions: BTreeMap<RecordId, ScoredEvent>,
    performance: BTreeMap<String, PerformanceRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

impl PredictionStore for MemoryStore {
    fn insert(&mut self, event: PredictionEvent) -> Result<RecordId, StoreError> {
        self.next_id += 1;
        let id = RecordId(self.next_id);
        self.predictions.insert(id, ScoredEvent::unscored(event));
        Ok(id)
    }

    fn get(&self, id: RecordId) -> Result<Option<ScoredEvent>, StoreError> {
        Ok(self.predictions.get(&id).cloned())
    }

    fn update(&mut self, id: RecordId, scored: ScoredEvent) -> Result<(), StoreError> {
        match self.predictions.get_mut(&id) {
            Some(slot) => {
                *slot = scored;
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn delete(&mut self, id: RecordId) -> Result<ScoredEvent, StoreError> {
        self.predictions.remove(&id).ok_or(StoreError::NotFound(id))
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<(RecordId, ScoredEvent)>, StoreError> {
        let mut rows: Vec<(RecordId, ScoredEvent)> = self
            .predictions
            .iter()
            .filter(|(_, s)| filter.matches(s))
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        rows.sort_by(|(ia, a), (ib, b)| {
            b.event
                .prediction_timestamp
                .cmp(&a.event.prediction_timestamp)
                .then(ia.cmp(ib))
        });
        Ok(rows)
    }
}

impl PerformanceStore for MemoryStore {
    fn upsert(&mut self, record: PerformanceRecord) -> Result<(), StoreError> {
        self.performance.insert(record.entity_name.clone(), record);
        Ok(())
    }

    fn snapshot(&self, entity_name: &str) -> Result<Option<PerformanceRecord>, StoreError> {
        Ok(self.performance.get(entity_name).cloned())
    }

    fn snapshots(&self) -> Result<Vec<PerformanceRecord>, StoreError> {
        Ok(self.performance.values().cloned().collect())
    }
}

/// Append-only JSONL log of performance snapshots.
///
/// Each upsert appends one line; the last line for an entity wins on read.
/// Malformed lines are skipped.
pub struct SnapshotLog {
    path: PathBuf,
}

impl SnapshotLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_latest(&self) -> Result<BTreeMap<String, PerformanceRecord>, StoreError> {
        let mut latest = BTreeMap::new();
        if !self.path.exists() {
            return Ok(latest);
        }

        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PerformanceRecord>(&line) {
                Ok(record) => {
                    latest.insert(record.entity_name.clone(), record);
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = lineno + 1, error = %e, "skipping malformed snapshot");
                }
            }
        }
        Ok(latest)
    }
}

impl PerformanceStore for SnapshotLog {
    fn upsert(&mut self, record: PerformanceRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(&record)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }

    fn snapshot(&self, entity_name: &str) -> Result<Option<PerformanceRecord>, StoreError> {
        Ok(self.read_latest()?.remove(entity_name))
    }

    fn snapshots(&self) -> Result<Vec<PerformanceRecord>, StoreError> {
        Ok(self.read_latest()?.into_values().collect())
    }
}
