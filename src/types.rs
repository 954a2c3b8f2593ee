//! Core types shared across the engine

use crate::error::EngineError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Instant as supplied by a collaborator.
///
/// Upstream providers are not consistent: some send epoch milliseconds,
/// others RFC 3339 strings or plain `YYYY-MM-DD HH:MM:SS` text. Resolution
/// happens at bucketing time so that a bad value only drops one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ObservationTime {
    /// Milliseconds since the Unix epoch
    Millis(f64),
    /// Textual timestamp
    Text(String),
    /// Null or of an unusable JSON type
    Missing,
}

impl<'de> Deserialize<'de> for ObservationTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64().map_or(ObservationTime::Missing, ObservationTime::Millis),
            Value::String(text) => ObservationTime::Text(text),
            _ => ObservationTime::Missing,
        })
    }
}

impl ObservationTime {
    /// Resolve to a UTC instant, or `None` when unparseable or non-finite
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            ObservationTime::Millis(ms) => {
                if !ms.is_finite() {
                    return None;
                }
                DateTime::from_timestamp_millis(ms.floor() as i64)
            }
            ObservationTime::Text(text) => parse_text_timestamp(text.trim()),
            ObservationTime::Missing => None,
        }
    }
}

/// Numeric field that decodes to NaN instead of failing when null or not a
/// number. Numeric strings are accepted. The key itself is still required.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(text) => text.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

fn default_source_count() -> u32 {
    1
}

fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(ms) = text.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl From<DateTime<Utc>> for ObservationTime {
    fn from(dt: DateTime<Utc>) -> Self {
        ObservationTime::Millis(dt.timestamp_millis() as f64)
    }
}

impl From<i64> for ObservationTime {
    fn from(ms: i64) -> Self {
        ObservationTime::Millis(ms as f64)
    }
}

impl From<&str> for ObservationTime {
    fn from(text: &str) -> Self {
        ObservationTime::Text(text.to_string())
    }
}

/// One scored reading from the NLP pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentObservation {
    pub timestamp: ObservationTime,
    /// Sentiment score (-1.0 to 1.0)
    #[serde(deserialize_with = "lenient_f64")]
    pub score: f64,
    /// Number of articles behind this reading
    #[serde(default = "default_source_count")]
    pub source_count: u32,
}

impl SentimentObservation {
    pub fn new(timestamp: impl Into<ObservationTime>, score: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            score,
            source_count: default_source_count(),
        }
    }

    pub fn with_source_count(mut self, source_count: u32) -> Self {
        self.source_count = source_count;
        self
    }
}

/// One sample from the price feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    pub timestamp: ObservationTime,
    /// Close price, must be > 0
    #[serde(deserialize_with = "lenient_f64")]
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl PriceObservation {
    pub fn new(timestamp: impl Into<ObservationTime>, close: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Bucket-aggregated (sentiment, price) pair fed to the statistics stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedObservation {
    pub timestamp: DateTime<Utc>,
    pub sentiment: f64,
    pub price: f64,
}

impl PairedObservation {
    pub fn new(timestamp: DateTime<Utc>, sentiment: f64, price: f64) -> Self {
        Self {
            timestamp,
            sentiment,
            price,
        }
    }
}

/// Readings dropped before bucketing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedCounts {
    pub sentiment: usize,
    pub price: usize,
}

impl MalformedCounts {
    pub fn total(&self) -> usize {
        self.sentiment + self.price
    }
}

/// Look-back window of an analysis request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisWindow {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "14d")]
    FourteenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl AnalysisWindow {
    /// Window used when the caller passes something unrecognized
    pub const FALLBACK: AnalysisWindow = AnalysisWindow::SevenDays;

    pub const ALL: [AnalysisWindow; 4] = [
        AnalysisWindow::OneDay,
        AnalysisWindow::SevenDays,
        AnalysisWindow::FourteenDays,
        AnalysisWindow::ThirtyDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisWindow::OneDay => "1d",
            AnalysisWindow::SevenDays => "7d",
            AnalysisWindow::FourteenDays => "14d",
            AnalysisWindow::ThirtyDays => "30d",
        }
    }

    /// Parse a caller-supplied window, falling back to 7d.
    ///
    /// Returns the warning to surface when the fallback was taken.
    pub fn parse_lenient(raw: &str) -> (AnalysisWindow, Option<String>) {
        match raw.parse::<AnalysisWindow>() {
            Ok(window) => (window, None),
            Err(_) => {
                tracing::warn!(window = raw, "Unrecognized analysis window, falling back to 7d");
                (
                    Self::FALLBACK,
                    Some(format!(
                        "unrecognized window '{}', using {}",
                        raw,
                        Self::FALLBACK
                    )),
                )
            }
        }
    }
}

impl Default for AnalysisWindow {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl fmt::Display for AnalysisWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalysisWindow {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(AnalysisWindow::OneDay),
            "7d" => Ok(AnalysisWindow::SevenDays),
            "14d" => Ok(AnalysisWindow::FourteenDays),
            "30d" => Ok(AnalysisWindow::ThirtyDays),
            _ => Err(EngineError::InvalidWindow(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_millis() {
        let ts = ObservationTime::Millis(1_700_000_000_000.0);
        let resolved = ts.resolve().unwrap();
        assert_eq!(resolved.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_resolve_nan_and_infinite() {
        assert!(ObservationTime::Millis(f64::NAN).resolve().is_none());
        assert!(ObservationTime::Millis(f64::INFINITY).resolve().is_none());
    }

    #[test]
    fn test_resolve_rfc3339_with_offset() {
        let ts = ObservationTime::from("2024-03-01T11:00:00+02:00");
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(ts.resolve(), Some(expected));
    }

    #[test]
    fn test_resolve_naive_text() {
        let ts = ObservationTime::from("2024-03-01 09:20:00");
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 9, 20, 0).unwrap();
        assert_eq!(ts.resolve(), Some(expected));
    }

    #[test]
    fn test_resolve_millis_string() {
        let ts = ObservationTime::from("1700000000000");
        assert_eq!(ts.resolve().unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_resolve_garbage() {
        assert!(ObservationTime::from("yesterday-ish").resolve().is_none());
        assert!(ObservationTime::from("").resolve().is_none());
    }

    #[test]
    fn test_observation_deserialization() {
        let json = r#"[
            {"timestamp": "2024-03-01T09:00:00Z", "score": 0.4, "sourceCount": 12},
            {"timestamp": 1709283600000, "score": -0.2}
        ]"#;
        let observations: Vec<SentimentObservation> = serde_json::from_str(json).unwrap();

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].source_count, 12);
        assert_eq!(observations[1].source_count, 1);
        assert_eq!(
            observations[1].source_count,
            SentimentObservation::new(1_709_283_600_000i64, -0.2).source_count
        );
        assert!(matches!(observations[1].timestamp, ObservationTime::Millis(_)));
    }

    #[test]
    fn test_null_fields_decode_as_malformed_values() {
        let json = r#"[
            {"timestamp": null, "score": 0.4},
            {"timestamp": "2024-03-01T09:00:00Z", "score": null},
            {"score": "0.25", "timestamp": true}
        ]"#;
        let observations: Vec<SentimentObservation> = serde_json::from_str(json).unwrap();

        assert_eq!(observations[0].timestamp, ObservationTime::Missing);
        assert!(observations[0].timestamp.resolve().is_none());
        assert!(observations[1].score.is_nan());
        assert_eq!(observations[2].score, 0.25);
        assert_eq!(observations[2].timestamp, ObservationTime::Missing);

        let missing_key: std::result::Result<SentimentObservation, _> =
            serde_json::from_str(r#"{"timestamp": 1709283600000}"#);
        assert!(missing_key.is_err());

        let prices: Vec<PriceObservation> = serde_json::from_str(
            r#"[{"timestamp": null, "close": 10.0}, {"timestamp": 1709283600000, "close": null, "volume": null}]"#,
        )
        .unwrap();
        assert!(prices[0].timestamp.resolve().is_none());
        assert!(prices[1].close.is_nan());
        assert!(prices[1].volume.is_none());
    }

    #[test]
    fn test_price_deserialization_optional_volume() {
        let json = r#"{"timestamp": "2024-03-01T09:00:00Z", "close": 101.5}"#;
        let price: PriceObservation = serde_json::from_str(json).unwrap();
        assert_eq!(price.close, 101.5);
        assert!(price.volume.is_none());
    }

    #[test]
    fn test_window_parse() {
        assert_eq!("1d".parse::<AnalysisWindow>().unwrap(), AnalysisWindow::OneDay);
        assert_eq!(" 14D ".parse::<AnalysisWindow>().unwrap(), AnalysisWindow::FourteenDays);
        assert!("banana".parse::<AnalysisWindow>().is_err());
    }

    #[test]
    fn test_window_parse_lenient_fallback() {
        let (window, warning) = AnalysisWindow::parse_lenient("banana");
        assert_eq!(window, AnalysisWindow::SevenDays);
        assert!(warning.unwrap().contains("banana"));

        let (window, warning) = AnalysisWindow::parse_lenient("30d");
        assert_eq!(window, AnalysisWindow::ThirtyDays);
        assert!(warning.is_none());
    }

    #[test]
    fn test_window_display_round_trip() {
        for window in AnalysisWindow::ALL {
            assert_eq!(window.to_string().parse::<AnalysisWindow>().unwrap(), window);
        }
    }

    #[test]
    fn test_malformed_total() {
        let counts = MalformedCounts { sentiment: 2, price: 3 };
        assert_eq!(counts.total(), 5);
    }
}
