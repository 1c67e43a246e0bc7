//! Ranking entities by a chosen performance metric.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use kolscore_core::domain::Horizon;

use crate::metrics::PerformanceRecord;

/// Metric to rank performance records by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    #[default]
    DirectionCorrectness,
    MeanReturn(Horizon),
    Sharpe(Horizon),
    InformationRatio(Horizon),
    /// Ungraded records rank below every graded one.
    Grade,
}

impl RankingMetric {
    /// The metric's value for `record`; `None` only for a missing grade.
    pub fn value(&self, record: &PerformanceRecord) -> Option<f64> {
        match self {
            RankingMetric::DirectionCorrectness => Some(record.direction_correctness_rate),
            RankingMetric::MeanReturn(h) => Some(record.horizon(*h).mean_return),
            RankingMetric::Sharpe(h) => Some(record.horizon(*h).sharpe_ratio),
            RankingMetric::InformationRatio(h) => Some(record.horizon(*h).information_ratio),
            RankingMetric::Grade => record.grade,
        }
    }
}

/// The `n` best records by `metric`, highest first. Ties (and NaNs) are
/// broken by entity name, ascending.
pub fn top_performers<'a, I>(records: I, metric: RankingMetric, n: usize) -> Vec<&'a PerformanceRecord>
where
    I: IntoIterator<Item = &'a PerformanceRecord>,
{
    let mut ranked: Vec<(&PerformanceRecord, Option<f64>)> =
        records.into_iter().map(|r| (r, metric.value(r))).collect();

    ranked.sort_by(|(ra, va), (rb, vb)| {
        descending(*va, *vb).then_with(|| ra.entity_name.cmp(&rb.entity_name))
    });
    ranked.into_iter().take(n).map(|(r, _)| r).collect()
}

fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
