//! Composite 0–100 grade from accuracy, Sharpe ratio and sample size.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::PerformanceRecord;

/// Sharpe ratio that earns the full Sharpe component.
const SHARPE_CEILING: f64 = 2.0;

/// Component weights and the sample-count normalizer.
///
/// The weights are expected to sum to 1.0; this is not enforced, and grades
/// from other weightings can leave the 0–100 range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradeWeights {
    pub w_acc: f64,
    pub w_sharpe: f64,
    pub w_sample: f64,
    /// Sample count at which the sample component saturates.
    pub sample_norm: f64,
}

impl Default for GradeWeights {
    fn default() -> Self {
        Self {
            w_acc: 0.5,
            w_sharpe: 0.3,
            w_sample: 0.2,
            sample_norm: 50.0,
        }
    }
}

/// `100 * (w_acc*accuracy + w_sharpe*sharpe_score + w_sample*sample_score)`,
/// rounded to two decimals.
///
/// `sample_score = min(sample_count / sample_norm, 1)` and
/// `sharpe_score = clamp(sharpe / 2, 0, 1)`; a NaN Sharpe scores 0.
pub fn grade(accuracy: f64, sharpe: f64, sample_count: usize, weights: &GradeWeights) -> f64 {
    let sample_score = if weights.sample_norm > 0.0 {
        (sample_count as f64 / weights.sample_norm).min(1.0)
    } else {
        0.0
    };
    let sharpe_score = if sharpe.is_nan() {
        0.0
    } else {
        (sharpe / SHARPE_CEILING).clamp(0.0, 1.0)
    };

    let raw = 100.0
        * (weights.w_acc * accuracy
            + weights.w_sharpe * sharpe_score
            + weights.w_sample * sample_score);
    round2(raw)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Grades performance records with fixed weights.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradeCalculator {
    weights: GradeWeights,
}

impl GradeCalculator {
    pub fn new(weights: GradeWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &GradeWeights {
        &self.weights
    }

    pub fn grade(&self, accuracy: f64, sharpe: f64, sample_count: usize) -> f64 {
        grade(accuracy, sharpe, sample_count, &self.weights)
    }

    /// Grade from the record's correctness rate, 1-day Sharpe and
    /// prediction count.
    pub fn grade_record(&self, record: &PerformanceRecord) -> f64 {
        self.grade(
            record.direction_correctness_rate,
            record.one_day.sharpe_ratio,
            record.total_predictions,
        )
    }

    /// A copy of `record` carrying its grade.
    pub fn with_grade(&self, record: PerformanceRecord) -> PerformanceRecord {
        let grade = self.grade_record(&record);
        PerformanceRecord {
            grade: Some(grade),
            ..record
        }
    }

    pub fn apply_grades(
        &self,
        records: BTreeMap<String, PerformanceRecord>,
    ) -> BTreeMap<String, PerformanceRecord> {
        records
            .into_iter()
            .map(|(name, record)| (name, self.with_grade(record)))
            .collect()
    }
}
