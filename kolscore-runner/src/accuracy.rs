//! Direction accuracy of sentiment calls against realized returns.
//!
//! An (event, horizon) pair with no realized return is never scored and
//! never counts toward a denominator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use kolscore_core::domain::{Horizon, ScoredEvent, Sentiment};

/// Band around zero inside which a neutral call counts as correct (1%).
pub const NEUTRAL_DEADBAND: f64 = 0.01;

/// Whether `sentiment` called the sign of `ret` correctly, using the default
/// neutral deadband.
pub fn direction_correct(sentiment: Sentiment, ret: f64) -> bool {
    direction_correct_with(sentiment, ret, NEUTRAL_DEADBAND)
}

/// Positive is correct iff `ret > 0`, negative iff `ret < 0`, neutral iff
/// `|ret| < deadband`.
pub fn direction_correct_with(sentiment: Sentiment, ret: f64, deadband: f64) -> bool {
    match sentiment {
        Sentiment::Positive => ret > 0.0,
        Sentiment::Negative => ret < 0.0,
        Sentiment::Neutral => ret.abs() < deadband,
    }
}

/// Correct calls over scored calls for one horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonAccuracy {
    pub correct: usize,
    pub total: usize,
}

impl HorizonAccuracy {
    /// 0.0 when nothing was scored.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }

    fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }
}

/// Accuracy at each horizon, each over its own denominator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyByHorizon {
    pub one_day: HorizonAccuracy,
    pub three_day: HorizonAccuracy,
    pub ten_day: HorizonAccuracy,
}

impl AccuracyByHorizon {
    pub fn get(&self, horizon: Horizon) -> &HorizonAccuracy {
        match horizon {
            Horizon::OneDay => &self.one_day,
            Horizon::ThreeDay => &self.three_day,
            Horizon::TenDay => &self.ten_day,
        }
    }

    fn get_mut(&mut self, horizon: Horizon) -> &mut HorizonAccuracy {
        match horizon {
            Horizon::OneDay => &mut self.one_day,
            Horizon::ThreeDay => &mut self.three_day,
            Horizon::TenDay => &mut self.ten_day,
        }
    }
}

/// Classifies scored events with a fixed neutral deadband.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyScorer {
    deadband: f64,
}

impl Default for AccuracyScorer {
    fn default() -> Self {
        Self::new(NEUTRAL_DEADBAND)
    }
}

impl AccuracyScorer {
    pub fn new(deadband: f64) -> Self {
        Self { deadband }
    }

    pub fn deadband(&self) -> f64 {
        self.deadband
    }

    pub fn is_correct(&self, sentiment: Sentiment, ret: f64) -> bool {
        direction_correct_with(sentiment, ret, self.deadband)
    }

    /// `None` when the event has no return at `horizon`.
    pub fn score(&self, event: &ScoredEvent, horizon: Horizon) -> Option<bool> {
        event
            .return_for(horizon)
            .map(|ret| self.is_correct(event.sentiment(), ret))
    }

    pub fn horizon_accuracy(&self, events: &[ScoredEvent], horizon: Horizon) -> HorizonAccuracy {
        let mut acc = HorizonAccuracy::default();
        for correct in events.iter().filter_map(|e| self.score(e, horizon)) {
            acc.record(correct);
        }
        acc
    }

    pub fn by_horizon(&self, events: &[ScoredEvent]) -> AccuracyByHorizon {
        let mut out = AccuracyByHorizon::default();
        for event in events {
            for horizon in Horizon::ALL {
                if let Some(correct) = self.score(event, horizon) {
                    out.get_mut(horizon).record(correct);
                }
            }
        }
        out
    }

    /// Per-horizon accuracy broken down by sentiment class. Every class
    /// appears in the result, zero-filled when it had no calls.
    pub fn by_sentiment(&self, events: &[ScoredEvent]) -> BTreeMap<Sentiment, AccuracyByHorizon> {
        let mut out: BTreeMap<Sentiment, AccuracyByHorizon> = Sentiment::ALL
            .iter()
            .map(|s| (*s, AccuracyByHorizon::default()))
            .collect();
        for event in events {
            let entry = out.entry(event.sentiment()).or_default();
            for horizon in Horizon::ALL {
                if let Some(correct) = self.score(event, horizon) {
                    entry.get_mut(horizon).record(correct);
                }
            }
        }
        out
    }
}
