//! Per-entity performance aggregation.
//!
//! A `PerformanceRecord` is always a full fold over an entity's scored
//! events; nothing here updates a record incrementally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use kolscore_core::domain::{Horizon, ScoredEvent};

use crate::accuracy::{AccuracyScorer, NEUTRAL_DEADBAND};

/// Per-observation risk-free rate subtracted for the Sharpe ratio (0.1%).
pub const RISK_FREE_RATE: f64 = 0.001;

/// Per-observation benchmark return subtracted for the Information ratio (1%).
pub const BENCHMARK_RETURN: f64 = 0.01;

/// Volatility at or below this is reported as zero.
const VOLATILITY_EPSILON: f64 = 1e-12;

/// Tunable analytics constants (`[analytics]` in config).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsParams {
    pub neutral_deadband: f64,
    pub risk_free_rate: f64,
    pub benchmark_return: f64,
}

impl Default for AnalyticsParams {
    fn default() -> Self {
        Self {
            neutral_deadband: NEUTRAL_DEADBAND,
            risk_free_rate: RISK_FREE_RATE,
            benchmark_return: BENCHMARK_RETURN,
        }
    }
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bessel-corrected standard deviation; 0.0 with fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Return statistics for one horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonMetrics {
    pub mean_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub information_ratio: f64,
    /// Number of present returns the statistics were computed from.
    pub observations: usize,
}

impl HorizonMetrics {
    /// Statistics over `returns`; all zero when the slice is empty.
    pub fn from_returns(returns: &[f64], risk_free_rate: f64, benchmark_return: f64) -> Self {
        if returns.is_empty() {
            return Self::default();
        }
        let mean_return = mean(returns);
        let volatility = match sample_std_dev(returns) {
            sd if sd > VOLATILITY_EPSILON => sd,
            _ => 0.0,
        };
        let (sharpe_ratio, information_ratio) = if volatility > 0.0 {
            (
                (mean_return - risk_free_rate) / volatility,
                (mean_return - benchmark_return) / volatility,
            )
        } else {
            (0.0, 0.0)
        };
        Self {
            mean_return,
            volatility,
            sharpe_ratio,
            information_ratio,
            observations: returns.len(),
        }
    }
}

/// Aggregated performance of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub entity_name: String,
    /// Correct 1-day calls over events with a 1-day return.
    pub direction_correctness_rate: f64,
    /// Events with a 1-day return.
    pub total_predictions: usize,
    pub one_day: HorizonMetrics,
    pub three_day: HorizonMetrics,
    pub ten_day: HorizonMetrics,
    pub grade: Option<f64>,
}

impl PerformanceRecord {
    /// All metrics zero, no grade.
    pub fn empty(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            direction_correctness_rate: 0.0,
            total_predictions: 0,
            one_day: HorizonMetrics::default(),
            three_day: HorizonMetrics::default(),
            ten_day: HorizonMetrics::default(),
            grade: None,
        }
    }

    pub fn horizon(&self, horizon: Horizon) -> &HorizonMetrics {
        match horizon {
            Horizon::OneDay => &self.one_day,
            Horizon::ThreeDay => &self.three_day,
            Horizon::TenDay => &self.ten_day,
        }
    }
}

/// Folds scored events into performance records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceAggregator {
    params: AnalyticsParams,
}

impl PerformanceAggregator {
    pub fn new(params: AnalyticsParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AnalyticsParams {
        &self.params
    }

    /// Record for one entity. Every event is attributed to `entity_name`;
    /// callers group first (see `aggregate_all`).
    pub fn aggregate(&self, entity_name: &str, events: &[ScoredEvent]) -> PerformanceRecord {
        let scorer = AccuracyScorer::new(self.params.neutral_deadband);
        let one_day = scorer.horizon_accuracy(events, Horizon::OneDay);

        let metrics = |h: Horizon| {
            let returns: Vec<f64> = events.iter().filter_map(|e| e.return_for(h)).collect();
            HorizonMetrics::from_returns(
                &returns,
                self.params.risk_free_rate,
                self.params.benchmark_return,
            )
        };

        PerformanceRecord {
            entity_name: entity_name.to_string(),
            direction_correctness_rate: one_day.rate(),
            total_predictions: one_day.total,
            one_day: metrics(Horizon::OneDay),
            three_day: metrics(Horizon::ThreeDay),
            ten_day: metrics(Horizon::TenDay),
            grade: None,
        }
    }

    /// One record per entity name present in `events`, ordered by name.
    pub fn aggregate_all(&self, events: &[ScoredEvent]) -> BTreeMap<String, PerformanceRecord> {
        let mut grouped: BTreeMap<&str, Vec<ScoredEvent>> = BTreeMap::new();
        for event in events {
            grouped
                .entry(event.entity_name())
                .or_default()
                .push(event.clone());
        }

        let records: BTreeMap<String, PerformanceRecord> = grouped
            .into_iter()
            .map(|(name, evs)| (name.to_string(), self.aggregate(name, &evs)))
            .collect();
        tracing::info!(
            entities = records.len(),
            events = events.len(),
            "aggregated performance"
        );
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kolscore_core::domain::{HorizonReturns, PredictionEvent, Sentiment};

    fn scored(entity: &str, sentiment: Sentiment, r1: Option<f64>) -> ScoredEvent {
        ScoredEvent {
            event: PredictionEvent {
                entity_name: entity.into(),
                ticker: "MSFT".into(),
                sector: "Technology".into(),
                sentiment,
                confidence: 0.9,
                prediction_timestamp: NaiveDate::from_ymd_opt(2024, 2, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            },
            entry_price: r1.map(|_| 50.0),
            returns: HorizonReturns {
                return_1d: r1,
                return_3d: None,
                return_10d: None,
            },
        }
    }

    #[test]
    fn mean_and_sample_std_dev() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
        assert_eq!(sample_std_dev(&[5.0]), 0.0);
        // Sample variance of [2,4,4,4,5,5,7,9] is 32/7.
        let sd = sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn horizon_metrics_known_values() {
        let m = HorizonMetrics::from_returns(&[0.01, 0.03], RISK_FREE_RATE, BENCHMARK_RETURN);
        let sd = 0.01 * 2.0_f64.sqrt();
        assert!((m.mean_return - 0.02).abs() < 1e-12);
        assert!((m.volatility - sd).abs() < 1e-12);
        assert!((m.sharpe_ratio - (0.02 - 0.001) / sd).abs() < 1e-9);
        assert!((m.information_ratio - (0.02 - 0.01) / sd).abs() < 1e-9);
        assert_eq!(m.observations, 2);
    }

    #[test]
    fn single_observation_has_zero_volatility_and_ratios() {
        let m = HorizonMetrics::from_returns(&[0.05], RISK_FREE_RATE, BENCHMARK_RETURN);
        assert_eq!(m.mean_return, 0.05);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.information_ratio, 0.0);
    }

    #[test]
    fn identical_returns_do_not_blow_up_ratios() {
        let m = HorizonMetrics::from_returns(&[0.1, 0.1, 0.1], RISK_FREE_RATE, BENCHMARK_RETURN);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.information_ratio, 0.0);
    }

    #[test]
    fn rounding_noise_volatility_reports_zero() {
        // 0.1 + 0.2 and 0.3 differ only in the last bit.
        let m = HorizonMetrics::from_returns(&[0.1 + 0.2, 0.3], RISK_FREE_RATE, BENCHMARK_RETURN);
        assert!(sample_std_dev(&[0.1 + 0.2, 0.3]) > 0.0);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.information_ratio, 0.0);
    }

    #[test]
    fn no_events_yields_zero_record() {
        let record = PerformanceAggregator::default().aggregate("nobody", &[]);
        assert_eq!(record, PerformanceRecord::empty("nobody"));
    }

    #[test]
    fn correctness_rate_uses_one_day_denominator() {
        let events = vec![
            scored("a", Sentiment::Positive, Some(0.02)),
            scored("a", Sentiment::Positive, Some(-0.01)),
            scored("a", Sentiment::Negative, Some(-0.04)),
            scored("a", Sentiment::Neutral, None),
        ];
        let record = PerformanceAggregator::default().aggregate("a", &events);
        assert_eq!(record.total_predictions, 3);
        assert!((record.direction_correctness_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(record.one_day.observations, 3);
        assert_eq!(record.three_day, HorizonMetrics::default());
    }

    #[test]
    fn aggregate_all_groups_by_entity_in_name_order() {
        let events = vec![
            scored("zed", Sentiment::Positive, Some(0.02)),
            scored("amy", Sentiment::Negative, Some(0.02)),
            scored("zed", Sentiment::Positive, Some(0.04)),
            scored("bob", Sentiment::Neutral, None),
        ];
        let records = PerformanceAggregator::default().aggregate_all(&events);
        let names: Vec<&str> = records.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["amy", "bob", "zed"]);
        assert_eq!(records["zed"].total_predictions, 2);
        assert_eq!(records["amy"].direction_correctness_rate, 0.0);
        assert_eq!(records["bob"], PerformanceRecord::empty("bob"));
    }
}
