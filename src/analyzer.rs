//! Sentiment/price analysis pipeline
//!
//! Runs bucketing, merging, quality gating and statistics in order and
//! packages everything a chart or summary card needs into one result.

use crate::bucket::{BucketWidthPolicy, TimeBucketAggregator};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::quality::{DataQualityValidator, QualityReport};
use crate::stats::{
    CorrelationEngine, CorrelationResult, RegressionEstimator, RegressionLine, RegressionPoint,
};
use crate::timeline::{ensure_ascending, TimelineMerger, TimelinePoint};
use crate::types::{AnalysisWindow, MalformedCounts, PriceObservation, SentimentObservation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Observation arrays plus request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(rename = "sentimentObservations", default)]
    pub sentiment: Vec<SentimentObservation>,
    #[serde(rename = "priceObservations", default)]
    pub prices: Vec<PriceObservation>,
    /// Raw window parameter; unrecognized values fall back to 7d
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default)]
    pub bucket_width_override_ms: Option<u64>,
}

fn default_window() -> String {
    AnalysisWindow::FALLBACK.to_string()
}

impl AnalysisRequest {
    pub fn new(
        sentiment: Vec<SentimentObservation>,
        prices: Vec<PriceObservation>,
        window: impl Into<String>,
    ) -> Self {
        Self {
            sentiment,
            prices,
            window: window.into(),
            bucket_width_override_ms: None,
        }
    }

    pub fn with_bucket_width_ms(mut self, width_ms: u64) -> Self {
        self.bucket_width_override_ms = Some(width_ms);
        self
    }

    /// Decode a request handed over as JSON.
    ///
    /// A payload whose arrays do not have the observation shapes is a caller
    /// bug, not a data condition, so it surfaces as an invariant violation.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            EngineError::InvariantViolation(format!("malformed analysis request: {}", e))
        })
    }
}

/// Quality block of the result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySummary {
    pub reasons: Vec<String>,
    pub sample_size: usize,
    /// Parameter problems that were corrected
    pub warnings: Vec<String>,
    pub malformed: MalformedCounts,
}

/// Everything a consumer renders for one analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub window: AnalysisWindow,
    pub bucket_width_ms: i64,
    pub chart_series: Vec<TimelinePoint>,
    pub correlation: CorrelationResult,
    pub regression_line: Option<[RegressionPoint; 2]>,
    pub quality: QualitySummary,
    #[serde(skip)]
    pub regression: Option<RegressionLine>,
    #[serde(skip)]
    pub report: QualityReport,
}

impl AnalysisResult {
    pub fn is_computable(&self) -> bool {
        self.correlation.computable
    }

    /// Short explanation for a "not computable" state
    pub fn explanation(&self) -> Option<String> {
        if self.correlation.computable {
            return None;
        }
        let blocking: Vec<&str> = self.report.blocking_issues().map(|i| i.reason()).collect();
        Some(format!(
            "correlation not computed: {}",
            if blocking.is_empty() {
                "no usable pairs".to_string()
            } else {
                blocking.join(", ")
            }
        ))
    }
}

/// Stateless pipeline; one instance can serve concurrent callers
#[derive(Debug, Clone)]
pub struct SentimentPriceAnalyzer {
    policy: BucketWidthPolicy,
    validator: DataQualityValidator,
    correlation: CorrelationEngine,
    regression: RegressionEstimator,
}

impl Default for SentimentPriceAnalyzer {
    fn default() -> Self {
        Self {
            policy: BucketWidthPolicy::default(),
            validator: DataQualityValidator::default(),
            correlation: CorrelationEngine::default(),
            regression: RegressionEstimator::default(),
        }
    }
}

impl SentimentPriceAnalyzer {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policy: BucketWidthPolicy::from_config(&config.bucketing)?,
            validator: DataQualityValidator::new(config.quality.clone()),
            correlation: CorrelationEngine::new(&config.correlation),
            regression: RegressionEstimator::new(&config.regression),
        })
    }

    pub fn policy(&self) -> &BucketWidthPolicy {
        &self.policy
    }

    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        self.analyze_observations(
            &request.sentiment,
            &request.prices,
            &request.window,
            request.bucket_width_override_ms,
        )
    }

    pub fn analyze_observations(
        &self,
        sentiment: &[SentimentObservation],
        prices: &[PriceObservation],
        window: &str,
        bucket_width_override_ms: Option<u64>,
    ) -> Result<AnalysisResult> {
        let mut warnings = Vec::new();

        let (window, window_warning) = AnalysisWindow::parse_lenient(window);
        warnings.extend(window_warning);

        let resolved = self.policy.resolve(window, bucket_width_override_ms);
        warnings.extend(resolved.warning);
        let width = resolved.width;

        let aggregator = TimeBucketAggregator::new(width);
        let sentiment_buckets = aggregator.aggregate_sentiment(sentiment);
        let price_buckets = aggregator.aggregate_prices(prices);

        let folded = sentiment_buckets.observation_count() + sentiment_buckets.malformed;
        if folded != sentiment.len() {
            return Err(EngineError::InvariantViolation(format!(
                "sentiment bucketing lost readings: {} in, {} accounted for",
                sentiment.len(),
                folded
            )));
        }

        let chart_series = TimelineMerger::new(width).merge(&sentiment_buckets, &price_buckets)?;
        ensure_ascending(&chart_series)?;

        let (pairs, report) = self.validator.validate_timeline(&chart_series);
        let correlation = self.correlation.compute_gated(&pairs, &report);
        let regression = if report.computable {
            self.regression.fit(&pairs)
        } else {
            None
        };

        debug!(
            window = %window,
            width_ms = width.as_millis(),
            rows = chart_series.len(),
            pairs = pairs.len(),
            computable = correlation.computable,
            "Analysis complete"
        );

        Ok(AnalysisResult {
            window,
            bucket_width_ms: width.as_millis(),
            chart_series,
            correlation,
            regression_line: regression.as_ref().map(RegressionLine::endpoints),
            quality: QualitySummary {
                reasons: report.reasons.clone(),
                sample_size: report.sample_size,
                warnings,
                malformed: MalformedCounts {
                    sentiment: sentiment_buckets.malformed,
                    price: price_buckets.malformed,
                },
            },
            regression,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObservationTime;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    /// Hourly sentiment and price over `days`, price tracking sentiment
    fn tracking_series(days: i64) -> (Vec<SentimentObservation>, Vec<PriceObservation>) {
        let mut sentiment = Vec::new();
        let mut prices = Vec::new();
        for h in 0..days * 24 {
            let ts = start() + Duration::hours(h);
            let score = ((h % 12) as f64 - 6.0) / 10.0;
            sentiment.push(SentimentObservation::new(ts + Duration::minutes(5), score));
            prices.push(PriceObservation::new(ts + Duration::minutes(30), 100.0 + 20.0 * score));
        }
        (sentiment, prices)
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_analyzer_is_send_sync() {
        assert_send_sync::<SentimentPriceAnalyzer>();
        assert_send_sync::<AnalysisResult>();
    }

    #[test]
    fn test_full_pipeline_positive_correlation() {
        let (sentiment, prices) = tracking_series(5);
        let analyzer = SentimentPriceAnalyzer::default();

        let result = analyzer
            .analyze(&AnalysisRequest::new(sentiment, prices, "7d"))
            .unwrap();

        assert_eq!(result.window, AnalysisWindow::SevenDays);
        assert_eq!(result.bucket_width_ms, 3_600_000);
        assert_eq!(result.chart_series.len(), 5 * 24);
        assert!(result.is_computable());
        assert!(result.correlation.pearson_r.unwrap() > 0.99);
        assert!(result.correlation.confidence_interval.is_some());
        assert!(result.regression_line.is_some());
        assert!(result.regression.as_ref().unwrap().slope > 0.0);
        assert!(result.quality.reasons.is_empty());
        assert!(result.quality.warnings.is_empty());
        assert!(result.explanation().is_none());
    }

    #[test]
    fn test_one_day_window_uses_pipeline_cadence() {
        let (sentiment, prices) = tracking_series(1);
        let result = SentimentPriceAnalyzer::default()
            .analyze(&AnalysisRequest::new(sentiment, prices, "1d"))
            .unwrap();

        assert_eq!(result.window, AnalysisWindow::OneDay);
        assert_eq!(result.bucket_width_ms, 45 * 60_000);
        assert!(result.quality.reasons.iter().any(|r| r == "short time span"));
    }

    #[test]
    fn test_unrecognized_window_falls_back() {
        let (sentiment, prices) = tracking_series(3);
        let result = SentimentPriceAnalyzer::default()
            .analyze(&AnalysisRequest::new(sentiment, prices, "banana"))
            .unwrap();

        assert_eq!(result.window, AnalysisWindow::SevenDays);
        assert_eq!(result.bucket_width_ms, 3_600_000);
        assert_eq!(result.quality.warnings.len(), 1);
        assert!(result.quality.warnings[0].contains("banana"));
        assert!(result.is_computable());
    }

    #[test]
    fn test_bucket_override() {
        let (sentiment, prices) = tracking_series(3);
        let request =
            AnalysisRequest::new(sentiment, prices, "7d").with_bucket_width_ms(2 * 3_600_000);
        let result = SentimentPriceAnalyzer::default().analyze(&request).unwrap();

        assert_eq!(result.bucket_width_ms, 2 * 3_600_000);
        assert_eq!(result.chart_series.len(), 3 * 12);
        assert_eq!(result.chart_series[0].count, 2);
    }

    #[test]
    fn test_zero_override_ignored_with_warning() {
        let (sentiment, prices) = tracking_series(3);
        let request = AnalysisRequest::new(sentiment, prices, "14d").with_bucket_width_ms(0);
        let result = SentimentPriceAnalyzer::default().analyze(&request).unwrap();

        assert_eq!(result.bucket_width_ms, 3_600_000);
        assert!(result.quality.warnings[0].contains("override"));
    }

    #[test]
    fn test_two_pairs_not_computable() {
        let sentiment = vec![
            SentimentObservation::new(start(), 0.1),
            SentimentObservation::new(start() + Duration::days(1), 0.8),
        ];
        let prices = vec![
            PriceObservation::new(start(), 10.0),
            PriceObservation::new(start() + Duration::days(1), 25.0),
        ];
        let result = SentimentPriceAnalyzer::default()
            .analyze(&AnalysisRequest::new(sentiment, prices, "30d"))
            .unwrap();

        assert!(!result.is_computable());
        assert_eq!(result.quality.reasons, vec!["insufficient sample size".to_string()]);
        assert_eq!(result.quality.sample_size, 2);
        assert!(result.regression_line.is_none());
        assert!(result.explanation().unwrap().contains("insufficient sample size"));
    }

    #[test]
    fn test_flat_sentiment_not_computable() {
        let sentiment: Vec<_> = (0..3)
            .map(|d| SentimentObservation::new(start() + Duration::days(d), 0.5))
            .collect();
        let prices: Vec<_> = [10.0, 12.0, 9.0]
            .iter()
            .enumerate()
            .map(|(d, p)| PriceObservation::new(start() + Duration::days(d as i64), *p))
            .collect();

        let result = SentimentPriceAnalyzer::default()
            .analyze(&AnalysisRequest::new(sentiment, prices, "7d"))
            .unwrap();

        assert!(!result.is_computable());
        assert!(result.quality.reasons.iter().any(|r| r == "no sentiment variation"));
        assert!(result.correlation.pearson_r.is_none());
    }

    #[test]
    fn test_malformed_counts_reported() {
        let (mut sentiment, mut prices) = tracking_series(3);
        sentiment.push(SentimentObservation::new(ObservationTime::Millis(f64::NAN), 0.1));
        sentiment.push(SentimentObservation::new("garbage", 0.1));
        prices.push(PriceObservation::new(start(), -5.0));

        let result = SentimentPriceAnalyzer::default()
            .analyze(&AnalysisRequest::new(sentiment, prices, "7d"))
            .unwrap();

        assert_eq!(result.quality.malformed.sentiment, 2);
        assert_eq!(result.quality.malformed.price, 1);
        let counted: usize = result.chart_series.iter().map(|p| p.count).sum();
        assert_eq!(counted, 3 * 24);
    }

    #[test]
    fn test_empty_input() {
        let result = SentimentPriceAnalyzer::default()
            .analyze(&AnalysisRequest::new(vec![], vec![], "7d"))
            .unwrap();

        assert!(result.chart_series.is_empty());
        assert!(!result.is_computable());
        assert_eq!(result.correlation.sample_size, 0);
    }

    #[test]
    fn test_result_json_shape() {
        let (sentiment, prices) = tracking_series(3);
        let result = SentimentPriceAnalyzer::default()
            .analyze(&AnalysisRequest::new(sentiment, prices, "7d"))
            .unwrap();

        let json = serde_json::to_value(&result).unwrap();
        let first = &json["chartSeries"][0];
        for field in ["timestamp", "sentiment", "high", "low", "price", "count"] {
            assert!(first.get(field).is_some(), "missing {}", field);
        }
        assert!(json["correlation"]["computable"].as_bool().unwrap());
        assert_eq!(json["regressionLine"].as_array().unwrap().len(), 2);
        assert!(json["regressionLine"][0].get("x").is_some());
        assert!(json["quality"]["reasons"].is_array());
        assert!(json["quality"].get("sampleSize").is_some());
        assert!(json.get("report").is_none());
    }

    #[test]
    fn test_request_from_json() {
        let value = serde_json::json!({
            "sentimentObservations": [
                {"timestamp": "2024-03-01T09:00:00Z", "score": 0.2, "sourceCount": 4}
            ],
            "priceObservations": [
                {"timestamp": 1709283600000i64, "close": 101.0}
            ],
            "window": "1d",
            "bucketWidthOverrideMs": 900000
        });

        let request = AnalysisRequest::from_json(value).unwrap();
        assert_eq!(request.sentiment.len(), 1);
        assert_eq!(request.prices.len(), 1);
        assert_eq!(request.window, "1d");
        assert_eq!(request.bucket_width_override_ms, Some(900_000));
    }

    #[test]
    fn test_request_with_swapped_arrays_is_invariant_violation() {
        let value = serde_json::json!({
            "sentimentObservations": [
                {"timestamp": "2024-03-01T09:00:00Z", "close": 101.0}
            ],
            "priceObservations": [],
            "window": "7d"
        });

        let err = AnalysisRequest::from_json(value).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn test_request_with_null_fields_counts_malformed() {
        let value = serde_json::json!({
            "sentimentObservations": [
                {"timestamp": null, "score": 0.2},
                {"timestamp": "2024-03-01T10:00:00Z", "score": null},
                {"timestamp": "2024-03-01T11:00:00Z", "score": 0.4}
            ],
            "priceObservations": [
                {"timestamp": "2024-03-01T10:00:00Z", "close": null},
                {"timestamp": null, "close": 100.0, "volume": null},
                {"timestamp": "2024-03-01T11:00:00Z", "close": 101.0}
            ],
            "window": "7d"
        });

        let request = AnalysisRequest::from_json(value).unwrap();
        let result = SentimentPriceAnalyzer::default().analyze(&request).unwrap();

        assert_eq!(result.quality.malformed.sentiment, 2);
        assert_eq!(result.quality.malformed.price, 2);
        assert_eq!(result.quality.sample_size, 1);
        assert!(!result.is_computable());
    }

    #[test]
    fn test_request_defaults_window() {
        let request = AnalysisRequest::from_json(serde_json::json!({})).unwrap();
        assert_eq!(request.window, "7d");
        assert!(request.sentiment.is_empty());
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = EngineConfig::default();
        config.bucketing.long_window_bucket_minutes = 0;
        assert!(SentimentPriceAnalyzer::from_config(&config).is_err());
    }

    #[test]
    fn test_concurrent_calls() {
        let analyzer = std::sync::Arc::new(SentimentPriceAnalyzer::default());
        let (sentiment, prices) = tracking_series(4);
        let request = std::sync::Arc::new(AnalysisRequest::new(sentiment, prices, "7d"));
        let expected = analyzer.analyze(&request).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let analyzer = analyzer.clone();
                let request = request.clone();
                std::thread::spawn(move || analyzer.analyze(&request).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
