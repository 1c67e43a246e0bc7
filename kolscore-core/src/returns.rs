//! Forward returns from an entry price and a post-prediction series.
//!
//! Index 0 of the series is the first bar on or after the prediction date;
//! the return at horizon `h` reads the bar at index `h`.

use chrono::NaiveDate;

use crate::data::DataError;
use crate::domain::{Horizon, HorizonReturns, PriceSeries};

/// Returns at 1, 3 and 10 bars past index 0.
///
/// A horizon is present iff `series.len() > h`. An entry price that is zero,
/// negative or non-finite is `InvalidInput`.
pub fn compute_returns(entry_price: f64, series: &PriceSeries) -> Result<HorizonReturns, DataError> {
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return Err(DataError::InvalidInput(format!(
            "entry price must be positive and finite, got {entry_price}"
        )));
    }

    let mut returns = HorizonReturns::default();
    for horizon in Horizon::ALL {
        let value = series
            .get(horizon.offset())
            .map(|bar| (bar.close - entry_price) / entry_price);
        returns.set(horizon, value);
    }
    Ok(returns)
}

/// Close on `target`, else the close nearest in calendar days.
///
/// Ties go to the earlier date. `None` only for an empty series.
pub fn resolve_entry_price(series: &PriceSeries, target: NaiveDate) -> Option<f64> {
    if let Some(close) = series.close_on(target) {
        return Some(close);
    }

    let mut best: Option<(i64, f64)> = None;
    for point in series.points() {
        let distance = (point.date - target).num_days().abs();
        // Ascending dates: strict < keeps the earlier of two equal distances.
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, point.close));
        }
    }
    best.map(|(_, close)| close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PricePoint;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn series(closes: &[f64]) -> PriceSeries {
        PriceSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PricePoint::new(d(1 + i as u32), c))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn three_bar_series_has_only_one_day_return() {
        let r = compute_returns(100.0, &series(&[100.0, 103.0, 99.0])).unwrap();
        assert!((r.return_1d.unwrap() - 0.03).abs() < 1e-12);
        assert_eq!(r.return_3d, None);
        assert_eq!(r.return_10d, None);
    }

    #[test]
    fn eleven_bars_fill_every_horizon() {
        let closes: Vec<f64> = (0..11).map(|i| 100.0 + i as f64).collect();
        let r = compute_returns(100.0, &series(&closes)).unwrap();
        assert!((r.return_1d.unwrap() - 0.01).abs() < 1e-12);
        assert!((r.return_3d.unwrap() - 0.03).abs() < 1e-12);
        assert!((r.return_10d.unwrap() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn non_positive_entry_price_is_invalid() {
        let s = series(&[1.0, 2.0]);
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                compute_returns(bad, &s),
                Err(DataError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn empty_series_yields_no_returns() {
        let r = compute_returns(10.0, &PriceSeries::default()).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn entry_price_prefers_exact_date() {
        let s = series(&[10.0, 11.0, 12.0]);
        assert_eq!(resolve_entry_price(&s, d(2)), Some(11.0));
    }

    #[test]
    fn entry_price_falls_back_to_nearest_with_earlier_tie() {
        // Bars on the 3rd and 7th; the 5th is equidistant.
        let s = PriceSeries::new(vec![PricePoint::new(d(3), 30.0), PricePoint::new(d(7), 70.0)])
            .unwrap();
        assert_eq!(resolve_entry_price(&s, d(5)), Some(30.0));
        assert_eq!(resolve_entry_price(&s, d(6)), Some(70.0));
        assert_eq!(resolve_entry_price(&s, d(1)), Some(30.0));
        assert_eq!(resolve_entry_price(&PriceSeries::default(), d(5)), None);
    }
}
