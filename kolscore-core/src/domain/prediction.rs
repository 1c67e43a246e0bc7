//! Prediction events and their scored form.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::horizon::{Horizon, HorizonReturns};

/// Directional call extracted from a commentator's statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; upstream extraction tools emit `Positive`, `POSITIVE`, etc.
impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment '{other}'")),
        }
    }
}

/// A commentator's call on a ticker, as supplied by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEvent {
    pub entity_name: String,
    pub ticker: String,
    pub sector: String,
    pub sentiment: Sentiment,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
    pub prediction_timestamp: NaiveDateTime,
}

impl PredictionEvent {
    pub fn prediction_date(&self) -> NaiveDate {
        self.prediction_timestamp.date()
    }
}

/// A prediction augmented with its entry price and forward returns.
///
/// A horizon return is present only if the forward series had strictly more
/// bars than the horizon offset. When no entry price could be resolved every
/// return is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub event: PredictionEvent,
    pub entry_price: Option<f64>,
    pub returns: HorizonReturns,
}

impl ScoredEvent {
    /// An event with no price data attached yet.
    pub fn unscored(event: PredictionEvent) -> Self {
        Self {
            event,
            entry_price: None,
            returns: HorizonReturns::default(),
        }
    }

    pub fn return_for(&self, horizon: Horizon) -> Option<f64> {
        self.returns.get(horizon)
    }

    pub fn entity_name(&self) -> &str {
        &self.event.entity_name
    }

    pub fn sentiment(&self) -> Sentiment {
        self.event.sentiment
    }

    pub fn is_scored(&self) -> bool {
        self.entry_price.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parses_case_insensitively() {
        assert_eq!("Positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" NEGATIVE ".parse::<Sentiment>().unwrap(), Sentiment::Negative);
        assert_eq!("neutral".parse::<Sentiment>().unwrap(), Sentiment::Neutral);
        assert!("bullish".parse::<Sentiment>().is_err());
    }

    #[test]
    fn sentiment_serializes_lowercase() {
        let json = serde_json::to_string(&Sentiment::Negative).unwrap();
        assert_eq!(json, "\"negative\"");
    }

    #[test]
    fn unscored_event_has_no_returns() {
        let event = PredictionEvent {
            entity_name: "alice".into(),
            ticker: "AAPL".into(),
            sector: "Tech".into(),
            sentiment: Sentiment::Positive,
            confidence: 0.9,
            prediction_timestamp: NaiveDate::from_ymd_opt(2025, 6, 2)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
        };
        let scored = ScoredEvent::unscored(event);
        assert!(!scored.is_scored());
        assert!(scored.returns.is_empty());
        assert_eq!(
            scored.event.prediction_date(),
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
    }
}
