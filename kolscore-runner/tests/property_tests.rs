//! Property-based tests for grading and aggregation.

use chrono::NaiveDate;
use proptest::prelude::*;

use kolscore_core::domain::{Horizon, HorizonReturns, PredictionEvent, ScoredEvent, Sentiment};
use kolscore_runner::{grade, AccuracyScorer, GradeWeights, PerformanceAggregator};

fn sentiment() -> impl Strategy<Value = Sentiment> {
    prop_oneof![
        Just(Sentiment::Positive),
        Just(Sentiment::Negative),
        Just(Sentiment::Neutral),
    ]
}

fn scored_event() -> impl Strategy<Value = ScoredEvent> {
    (
        prop::sample::select(vec!["a", "b", "c"]),
        sentiment(),
        prop::option::of(-0.2f64..0.2),
        prop::option::of(-0.3f64..0.3),
    )
        .prop_map(|(entity, sentiment, r1, r3)| ScoredEvent {
            event: PredictionEvent {
                entity_name: entity.to_string(),
                ticker: "SPY".into(),
                sector: "Index".into(),
                sentiment,
                confidence: 0.5,
                prediction_timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            },
            entry_price: Some(10.0),
            returns: HorizonReturns {
                return_1d: r1,
                return_3d: r3,
                return_10d: None,
            },
        })
}

proptest! {
    #[test]
    fn grade_stays_within_bounds(
        acc in 0.0f64..=1.0,
        sharpe in -10.0f64..10.0,
        n in 0usize..1000,
    ) {
        let g = grade(acc, sharpe, n, &GradeWeights::default());
        prop_assert!((0.0..=100.0).contains(&g), "grade {}", g);
    }

    #[test]
    fn grade_is_monotone_in_accuracy_and_sharpe(
        acc in 0.0f64..=1.0,
        d_acc in 0.0f64..=1.0,
        sharpe in -5.0f64..5.0,
        d_sharpe in 0.0f64..5.0,
        n in 0usize..200,
    ) {
        let w = GradeWeights::default();
        let base = grade(acc, sharpe, n, &w);
        prop_assert!(grade((acc + d_acc).min(1.0), sharpe, n, &w) >= base);
        prop_assert!(grade(acc, sharpe + d_sharpe, n, &w) >= base);
        prop_assert!(grade(acc, sharpe, n + 1, &w) >= base);
    }

    #[test]
    fn correctness_rate_is_a_fraction_of_one_day_calls(
        events in prop::collection::vec(scored_event(), 0..40),
    ) {
        let records = PerformanceAggregator::default().aggregate_all(&events);
        let mut seen = 0;
        for (name, record) in &records {
            prop_assert_eq!(name, &record.entity_name);
            prop_assert!((0.0..=1.0).contains(&record.direction_correctness_rate));
            let with_1d = events
                .iter()
                .filter(|e| e.entity_name() == name && e.returns.return_1d.is_some())
                .count();
            prop_assert_eq!(record.total_predictions, with_1d);
            prop_assert_eq!(record.one_day.observations, with_1d);
            seen += events.iter().filter(|e| e.entity_name() == name).count();
        }
        prop_assert_eq!(seen, events.len());
    }

    #[test]
    fn per_sentiment_counts_partition_the_total(
        events in prop::collection::vec(scored_event(), 0..40),
    ) {
        let scorer = AccuracyScorer::default();
        let overall = scorer.by_horizon(&events);
        let by_class = scorer.by_sentiment(&events);
        for h in Horizon::ALL {
            let total: usize = by_class.values().map(|a| a.get(h).total).sum();
            let correct: usize = by_class.values().map(|a| a.get(h).correct).sum();
            prop_assert_eq!(total, overall.get(h).total);
            prop_assert_eq!(correct, overall.get(h).correct);
        }
    }
}
