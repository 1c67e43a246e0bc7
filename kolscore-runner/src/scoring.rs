//! Attaching entry prices and forward returns to prediction events.
//!
//! For a prediction dated D:
//! - entry price: nearest close within `[D - lookaround, D + lookaround]`
//! - forward series: bars in `[D, D + forward_window)`, index 0 being the
//!   first bar on or after D
//!
//! Missing price data never fails scoring; the event just stays unscored.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use kolscore_core::data::{acquire_owned, BatchOptions, DataError, ResilientFetcher};
use kolscore_core::domain::{DateRange, HorizonReturns, PredictionEvent, PriceSeries, ScoredEvent};
use kolscore_core::{compute_returns, resolve_entry_price};

/// Calendar windows around a prediction date (`[scoring]` in config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringWindow {
    /// Days either side of the prediction date searched for an entry close.
    pub entry_lookaround_days: u32,
    /// Calendar days of history fetched from the prediction date onward.
    pub forward_window_days: u32,
}

impl Default for ScoringWindow {
    fn default() -> Self {
        Self {
            entry_lookaround_days: 5,
            forward_window_days: 20,
        }
    }
}

impl ScoringWindow {
    pub fn entry_range(&self, date: NaiveDate) -> Result<DateRange, DataError> {
        DateRange::around(date, self.entry_lookaround_days, self.entry_lookaround_days)
    }

    pub fn forward_range(&self, date: NaiveDate) -> Result<DateRange, DataError> {
        let end = date
            .checked_add_days(Days::new(u64::from(self.forward_window_days)))
            .ok_or_else(|| {
                DataError::InvalidInput(format!(
                    "forward window of {} days from {date} is out of range",
                    self.forward_window_days
                ))
            })?;
        DateRange::new(date, end)
    }
}

/// Scores prediction events against prices from one fetcher.
pub struct EventScorer<'a> {
    fetcher: &'a ResilientFetcher,
    window: ScoringWindow,
    batch: BatchOptions,
}

impl<'a> EventScorer<'a> {
    pub fn new(fetcher: &'a ResilientFetcher, window: ScoringWindow, batch: BatchOptions) -> Self {
        Self {
            fetcher,
            window,
            batch,
        }
    }

    pub fn window(&self) -> &ScoringWindow {
        &self.window
    }

    /// Score one event, fetching its two windows individually.
    pub fn score(&self, event: &PredictionEvent) -> ScoredEvent {
        let date = event.prediction_date();
        let (entry_range, forward_range) = match self.ranges(date) {
            Ok(ranges) => ranges,
            Err(e) => {
                tracing::warn!(ticker = %event.ticker, error = %e, "bad scoring window");
                return ScoredEvent::unscored(event.clone());
            }
        };

        let attempts = self.fetcher.policy().max_attempts;
        let entry = self.fetcher.fetch(&event.ticker, entry_range, attempts);
        // No entry price means nothing to measure against; skip the forward fetch.
        let forward = match entry.as_ref() {
            Some(_) => self.fetcher.fetch(&event.ticker, forward_range, attempts),
            None => None,
        };
        score_with(event, entry.as_ref(), forward.as_ref())
    }

    /// Score many events, prefetching every (window, ticker) pair through
    /// the batch acquirer. Output order matches input order.
    ///
    /// Fails only on invalid batch options.
    pub fn score_all(&self, events: &[PredictionEvent]) -> Result<Vec<ScoredEvent>, DataError> {
        self.batch.validate()?;

        let mut wanted: BTreeMap<DateRange, BTreeSet<String>> = BTreeMap::new();
        let mut ranges = Vec::with_capacity(events.len());
        for event in events {
            let r = self.ranges(event.prediction_date());
            if let Ok((entry, forward)) = &r {
                wanted.entry(*entry).or_default().insert(event.ticker.clone());
                wanted.entry(*forward).or_default().insert(event.ticker.clone());
            }
            ranges.push(r);
        }
        let acquired = self.prefetch(wanted)?;

        let scored: Vec<ScoredEvent> = events
            .iter()
            .zip(ranges)
            .map(|(event, r)| match r {
                Ok((entry, forward)) => score_with(
                    event,
                    lookup(&acquired, entry, &event.ticker),
                    lookup(&acquired, forward, &event.ticker),
                ),
                Err(e) => {
                    tracing::warn!(ticker = %event.ticker, error = %e, "bad scoring window");
                    ScoredEvent::unscored(event.clone())
                }
            })
            .collect();

        tracing::info!(
            events = scored.len(),
            scored = scored.iter().filter(|s| s.is_scored()).count(),
            "scoring pass complete"
        );
        Ok(scored)
    }

    /// Recompute forward returns of already-scored events against their
    /// stored entry price, filling horizons the forward series now reaches.
    /// Unscored events pass through unchanged.
    pub fn refresh_all(&self, scored: &[ScoredEvent]) -> Result<Vec<ScoredEvent>, DataError> {
        self.batch.validate()?;

        let mut wanted: BTreeMap<DateRange, BTreeSet<String>> = BTreeMap::new();
        let mut ranges = Vec::with_capacity(scored.len());
        for row in scored {
            let forward = if row.is_scored() {
                self.window.forward_range(row.event.prediction_date()).ok()
            } else {
                None
            };
            if let Some(forward) = forward {
                wanted.entry(forward).or_default().insert(row.event.ticker.clone());
            }
            ranges.push(forward);
        }
        let acquired = self.prefetch(wanted)?;

        let refreshed: Vec<ScoredEvent> = scored
            .iter()
            .zip(ranges)
            .map(|(row, forward)| {
                let series = forward.and_then(|r| lookup(&acquired, r, &row.event.ticker));
                refresh_with(row, series)
            })
            .collect();

        tracing::info!(
            events = refreshed.len(),
            complete = refreshed.iter().filter(|s| s.returns.is_complete()).count(),
            "return refresh complete"
        );
        Ok(refreshed)
    }

    /// Acquire every wanted (window, ticker) pair. Each window is its own
    /// batch sequence; a window that reached upstream is followed by
    /// `inter_batch_delay` before the next one starts.
    fn prefetch(
        &self,
        wanted: BTreeMap<DateRange, BTreeSet<String>>,
    ) -> Result<HashMap<DateRange, HashMap<String, PriceSeries>>, DataError> {
        let mut acquired = HashMap::new();
        let mut previous_touched_upstream = false;
        for (range, tickers) in wanted {
            if previous_touched_upstream {
                tracing::debug!(
                    delay_secs = self.batch.inter_batch_delay.as_secs_f64(),
                    %range,
                    "pacing between scoring windows"
                );
                self.fetcher.pause(self.batch.inter_batch_delay);
            }
            let tickers: Vec<String> = tickers.into_iter().collect();
            let acq = acquire_owned(self.fetcher, &tickers, range, &self.batch)?;
            previous_touched_upstream = acq.summary.touched_upstream();
            acquired.insert(range, acq.series);
        }
        Ok(acquired)
    }

    fn ranges(&self, date: NaiveDate) -> Result<(DateRange, DateRange), DataError> {
        Ok((self.window.entry_range(date)?, self.window.forward_range(date)?))
    }
}

fn lookup<'m>(
    acquired: &'m HashMap<DateRange, HashMap<String, PriceSeries>>,
    range: DateRange,
    ticker: &str,
) -> Option<&'m PriceSeries> {
    acquired.get(&range).and_then(|by_ticker| by_ticker.get(ticker))
}

/// Score `event` from already-fetched windows.
///
/// The forward series is trimmed to bars on or after the prediction date
/// before returns are taken.
pub fn score_with(
    event: &PredictionEvent,
    entry_window: Option<&PriceSeries>,
    forward_window: Option<&PriceSeries>,
) -> ScoredEvent {
    let date = event.prediction_date();
    let Some(entry_price) = entry_window.and_then(|s| resolve_entry_price(s, date)) else {
        tracing::debug!(ticker = %event.ticker, %date, "no entry price");
        return ScoredEvent::unscored(event.clone());
    };

    let returns = match forward_window {
        Some(series) => match compute_returns(entry_price, &series.from_date(date)) {
            Ok(returns) => returns,
            Err(e) => {
                tracing::warn!(ticker = %event.ticker, error = %e, "unusable entry price");
                return ScoredEvent::unscored(event.clone());
            }
        },
        None => HorizonReturns::default(),
    };

    ScoredEvent {
        event: event.clone(),
        entry_price: Some(entry_price),
        returns,
    }
}

/// Recompute `scored`'s returns from a fresh forward window, keeping its
/// entry price. Horizons the new series doesn't reach keep their old value.
pub fn refresh_with(scored: &ScoredEvent, forward_window: Option<&PriceSeries>) -> ScoredEvent {
    let (Some(entry_price), Some(series)) = (scored.entry_price, forward_window) else {
        return scored.clone();
    };
    let date = scored.event.prediction_date();
    match compute_returns(entry_price, &series.from_date(date)) {
        Ok(fresh) => ScoredEvent {
            returns: fresh.filled_from(scored.returns),
            ..scored.clone()
        },
        Err(e) => {
            tracing::warn!(ticker = %scored.event.ticker, error = %e, "unusable stored entry price");
            scored.clone()
        }
    }
}
