//! Daily close-price series and the date ranges they are requested over.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::DataError;

/// A single daily close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Ordered close prices for one ticker.
///
/// Dates are unique and strictly ascending. Every constructor (including
/// deserialization) enforces this, so downstream code can index by bar
/// offset without re-checking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from points that are already in canonical order.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, DataError> {
        for window in points.windows(2) {
            if window[1].date <= window[0].date {
                return Err(DataError::InvalidInput(format!(
                    "price series dates not strictly ascending: {} then {}",
                    window[0].date, window[1].date
                )));
            }
        }
        if let Some(bad) = points.iter().find(|p| !p.close.is_finite()) {
            return Err(DataError::InvalidInput(format!(
                "non-finite close on {}",
                bad.date
            )));
        }
        Ok(Self { points })
    }

    /// Canonicalize raw upstream rows: drop non-finite closes, sort by date,
    /// keep the last row seen for a duplicated date.
    pub fn from_unsorted(mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.close.is_finite());
        // Stable sort keeps arrival order within a date, so the last
        // duplicate wins after the reverse dedup below.
        points.sort_by_key(|p| p.date);
        points.reverse();
        points.dedup_by_key(|p| p.date);
        points.reverse();
        Self { points }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PricePoint> {
        self.points.get(index)
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Close on an exact date, if that date has a bar.
    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].close)
    }

    /// Sub-series of bars dated on or after `date`.
    pub fn from_date(&self, date: NaiveDate) -> PriceSeries {
        let start = self.points.partition_point(|p| p.date < date);
        Self {
            points: self.points[start..].to_vec(),
        }
    }

    /// Sub-series of bars inside `range` (start inclusive, end exclusive).
    pub fn within(&self, range: DateRange) -> PriceSeries {
        let lo = self.points.partition_point(|p| p.date < range.start());
        let hi = self.points.partition_point(|p| p.date < range.end());
        Self {
            points: self.points[lo..hi].to_vec(),
        }
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.close)
    }
}

impl TryFrom<Vec<PricePoint>> for PriceSeries {
    type Error = DataError;

    fn try_from(points: Vec<PricePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<PriceSeries> for Vec<PricePoint> {
    fn from(series: PriceSeries) -> Self {
        series.points
    }
}

/// Half-open calendar range `[start, end)`, the convention the upstream
/// price source uses for history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Fails with `InvalidInput` unless `start < end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DataError> {
        if end <= start {
            return Err(DataError::InvalidInput(format!(
                "malformed date range: start {start} is not before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Range of `before` days ahead of `center` through `after` days past it
    /// (the last day included).
    pub fn around(center: NaiveDate, before: u32, after: u32) -> Result<Self, DataError> {
        let start = center.checked_sub_days(Days::new(u64::from(before)));
        let end = center.checked_add_days(Days::new(u64::from(after) + 1));
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(DataError::InvalidInput(format!(
                "date range around {center} (-{before}/+{after} days) is out of range"
            ))),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
