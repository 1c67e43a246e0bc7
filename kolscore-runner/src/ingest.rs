//! Turning raw extraction rows into prediction events.
//!
//! Column mapping from a particular extraction tool's output is the
//! caller's job; rows arrive here already keyed by field. A bad row is
//! reported and skipped, never fatal to the batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kolscore_core::domain::{PredictionEvent, Sentiment};

/// One row of extraction output, every field still text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPredictionRow {
    pub entity_name: String,
    pub ticker: String,
    #[serde(default)]
    pub sector: String,
    pub sentiment: String,
    pub confidence: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("bad sentiment: {0}")]
    Sentiment(String),

    #[error("bad confidence '{0}': expected a number in [0, 1]")]
    Confidence(String),

    #[error("unrecognised timestamp '{0}'")]
    Timestamp(String),
}

/// A skipped row and why.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// Zero-based position in the input.
    pub row: usize,
    pub error: IngestError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub events: Vec<PredictionEvent>,
    pub skipped: Vec<RowError>,
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// RFC 3339 (converted to UTC), `YYYY-MM-DDTHH:MM:SS[.f]`,
/// `YYYY-MM-DD HH:MM:SS[.f]`, or a bare date at midnight.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, IngestError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| IngestError::Timestamp(raw.to_string()))
}

/// Uppercased, with a leading cashtag `$` stripped.
pub fn normalize_ticker(raw: &str) -> String {
    let t = raw.trim();
    t.strip_prefix('$').unwrap_or(t).trim().to_ascii_uppercase()
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, IngestError> {
    let v = value.trim();
    if v.is_empty() {
        Err(IngestError::MissingField(field))
    } else {
        Ok(v)
    }
}

pub fn parse_row(row: &RawPredictionRow) -> Result<PredictionEvent, IngestError> {
    let entity_name = required(&row.entity_name, "entity_name")?.to_string();
    let ticker = normalize_ticker(required(&row.ticker, "ticker")?);
    if ticker.is_empty() {
        return Err(IngestError::MissingField("ticker"));
    }

    let sentiment: Sentiment = required(&row.sentiment, "sentiment")?
        .parse()
        .map_err(IngestError::Sentiment)?;

    let raw_conf = required(&row.confidence, "confidence")?;
    let confidence: f64 = raw_conf
        .parse()
        .map_err(|_| IngestError::Confidence(raw_conf.to_string()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(IngestError::Confidence(raw_conf.to_string()));
    }

    let prediction_timestamp = parse_timestamp(required(&row.timestamp, "timestamp")?)?;

    Ok(PredictionEvent {
        entity_name,
        ticker,
        sector: row.sector.trim().to_string(),
        sentiment,
        confidence,
        prediction_timestamp,
    })
}

/// Parse every row, keeping the good ones in input order.
pub fn parse_rows<'a, I>(rows: I) -> IngestReport
where
    I: IntoIterator<Item = &'a RawPredictionRow>,
{
    let mut report = IngestReport::default();
    for (i, row) in rows.into_iter().enumerate() {
        match parse_row(row) {
            Ok(event) => report.events.push(event),
            Err(error) => {
                tracing::warn!(row = i, %error, "skipping malformed prediction row");
                report.skipped.push(RowError { row: i, error });
            }
        }
    }
    tracing::info!(
        parsed = report.events.len(),
        skipped = report.skipped.len(),
        "ingested prediction rows"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sentiment: &str, confidence: &str, timestamp: &str) -> RawPredictionRow {
        RawPredictionRow {
            entity_name: "Cathie".into(),
            ticker: " $tsla ".into(),
            sector: "Automotive".into(),
            sentiment: sentiment.into(),
            confidence: confidence.into(),
            timestamp: timestamp.into(),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn parses_a_good_row() {
        let event = parse_row(&row("POSITIVE", "0.85", "2024-03-04 09:30:00")).unwrap();
        assert_eq!(event.ticker, "TSLA");
        assert_eq!(event.sentiment, Sentiment::Positive);
        assert_eq!(event.confidence, 0.85);
        assert_eq!(event.prediction_timestamp, at(2024, 3, 4, 9, 30, 0));
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(
            parse_timestamp("2024-03-04T09:30:00Z").unwrap(),
            at(2024, 3, 4, 9, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2024-03-04T09:30:00-05:00").unwrap(),
            at(2024, 3, 4, 14, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2024-03-04T09:30:00").unwrap(),
            at(2024, 3, 4, 9, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2024-03-04 09:30:00.250").unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
        assert_eq!(parse_timestamp("2024-03-04").unwrap(), at(2024, 3, 4, 0, 0, 0));
        assert!(matches!(
            parse_timestamp("March 4th"),
            Err(IngestError::Timestamp(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        assert!(matches!(
            parse_row(&row("neutral", "1.5", "2024-03-04")),
            Err(IngestError::Confidence(_))
        ));
        assert!(matches!(
            parse_row(&row("neutral", "high", "2024-03-04")),
            Err(IngestError::Confidence(_))
        ));
        assert!(matches!(
            parse_row(&row("neutral", "NaN", "2024-03-04")),
            Err(IngestError::Confidence(_))
        ));
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let rows = vec![
            row("positive", "0.9", "2024-03-04"),
            row("bullish", "0.9", "2024-03-04"),
            RawPredictionRow {
                ticker: "$".into(),
                ..row("negative", "0.2", "2024-03-05")
            },
            row("negative", "0.2", "2024-03-05"),
        ];
        let report = parse_rows(&rows);
        assert_eq!(report.events.len(), 2);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].row, 1);
        assert!(matches!(report.skipped[0].error, IngestError::Sentiment(_)));
        assert_eq!(
            report.skipped[1].error,
            IngestError::MissingField("ticker")
        );
    }

    #[test]
    fn rows_deserialize_from_json() {
        let json = r#"{"entity_name":"a","ticker":"msft","sentiment":"neutral","confidence":"0.5","timestamp":"2024-01-02"}"#;
        let raw: RawPredictionRow = serde_json::from_str(json).unwrap();
        let event = parse_row(&raw).unwrap();
        assert_eq!(event.ticker, "MSFT");
        assert_eq!(event.sector, "");
    }
}
