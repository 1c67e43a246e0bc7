//! Property tests for series and return invariants.
//!
//! 1. Horizon presence: `compute_returns` yields horizon h iff len > h
//! 2. Canonical order: `from_unsorted` always produces strictly ascending dates
//! 3. Entry resolution: the resolved price is a close from the series, and
//!    no bar is strictly closer to the target than the chosen one

use chrono::NaiveDate;
use proptest::prelude::*;

use kolscore_core::domain::{Horizon, PricePoint, PriceSeries};
use kolscore_core::{compute_returns, resolve_entry_price};

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn day(offset: i64) -> NaiveDate {
    base() + chrono::Duration::days(offset)
}

fn arb_close() -> impl Strategy<Value = f64> {
    (1.0..1000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_series(max_len: usize) -> impl Strategy<Value = PriceSeries> {
    prop::collection::vec(arb_close(), 0..max_len).prop_map(|closes| {
        PriceSeries::new(
            closes
                .into_iter()
                .enumerate()
                .map(|(i, c)| PricePoint::new(day(i as i64), c))
                .collect(),
        )
        .unwrap()
    })
}

proptest! {
    #[test]
    fn horizon_present_iff_series_longer_than_offset(
        series in arb_series(15),
        entry in arb_close(),
    ) {
        let returns = compute_returns(entry, &series).unwrap();
        for h in Horizon::ALL {
            prop_assert_eq!(returns.get(h).is_some(), series.len() > h.offset());
        }
    }

    #[test]
    fn returns_are_relative_to_entry(series in arb_series(15), entry in arb_close()) {
        let returns = compute_returns(entry, &series).unwrap();
        for h in Horizon::ALL {
            if let Some(r) = returns.get(h) {
                let close = series.get(h.offset()).unwrap().close;
                prop_assert!((entry * (1.0 + r) - close).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn from_unsorted_is_strictly_ascending(
        rows in prop::collection::vec((0i64..60, arb_close()), 0..40),
    ) {
        let series = PriceSeries::from_unsorted(
            rows.iter().map(|&(o, c)| PricePoint::new(day(o), c)).collect(),
        );
        for w in series.points().windows(2) {
            prop_assert!(w[0].date < w[1].date);
        }
        let distinct: std::collections::BTreeSet<i64> = rows.iter().map(|r| r.0).collect();
        prop_assert_eq!(series.len(), distinct.len());
    }

    #[test]
    fn resolved_entry_is_a_nearest_close(
        offsets in prop::collection::btree_set(0i64..60, 1..20),
        target in 0i64..60,
    ) {
        let points: Vec<PricePoint> = offsets
            .iter()
            .map(|&o| PricePoint::new(day(o), 100.0 + o as f64))
            .collect();
        let series = PriceSeries::new(points).unwrap();

        let price = resolve_entry_price(&series, day(target)).unwrap();
        let chosen = series.points().iter().find(|p| p.close == price).unwrap();
        let chosen_dist = (chosen.date - day(target)).num_days().abs();
        for p in series.points() {
            prop_assert!((p.date - day(target)).num_days().abs() >= chosen_dist);
        }
    }
}
