//! KolScore Runner: scoring passes, accuracy, performance, grades, ranking.
//!
//! This crate builds on `kolscore-core` to provide:
//! - TOML configuration mapped onto the core's retry and batch policies
//! - Event scoring (entry price + forward returns) through the batch acquirer
//! - Directional accuracy per horizon and per sentiment class
//! - Per-entity performance aggregation (mean, volatility, Sharpe, IR)
//! - Composite 0–100 grades and metric-based ranking
//! - Prediction / performance store interfaces with in-memory and JSONL backends
//! - Row ingestion and tracing setup

pub mod accuracy;
pub mod config;
pub mod grade;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod ranking;
pub mod scoring;
pub mod store;

pub use accuracy::{
    direction_correct, direction_correct_with, AccuracyByHorizon, AccuracyScorer, HorizonAccuracy,
    NEUTRAL_DEADBAND,
};
pub use config::{ConfigError, KolConfig};
pub use grade::{grade, GradeCalculator, GradeWeights};
pub use ingest::{parse_row, parse_rows, IngestError, IngestReport, RawPredictionRow, RowError};
pub use logging::init_tracing;
pub use metrics::{
    AnalyticsParams, HorizonMetrics, PerformanceAggregator, PerformanceRecord, BENCHMARK_RETURN,
    RISK_FREE_RATE,
};
pub use pipeline::{
    build_yahoo_fetcher, purge_cache, refresh_performance, refresh_returns, score_pending,
    PipelineError, RefreshSummary, ScoringSummary,
};
pub use ranking::{top_performers, RankingMetric};
pub use scoring::{refresh_with, score_with, EventScorer, ScoringWindow};
pub use store::{
    MemoryStore, PerformanceStore, PredictionStore, RecordFilter, RecordId, SnapshotLog,
    StoreError,
};
