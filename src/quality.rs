//! Data quality gate
//!
//! Decides whether a paired sample can support a correlation at all.
//! Blocking issues make the result "not computable"; warnings are carried
//! through to the caller but do not stop the statistics.

use crate::config::QualityConfig;
use crate::timeline::{paired_observations, TimelinePoint};
use crate::types::PairedObservation;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// A data condition found by the validator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityIssue {
    InsufficientSampleSize { sample_size: usize, required: usize },
    NoSentimentVariation { range: f64 },
    NoPriceVariation { range: f64 },
    LimitedSample { sample_size: usize, recommended: usize },
    ShortTimeSpan { distinct_days: usize, recommended: usize },
}

impl QualityIssue {
    /// Blocking issues suppress the correlation entirely
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            QualityIssue::InsufficientSampleSize { .. }
                | QualityIssue::NoSentimentVariation { .. }
                | QualityIssue::NoPriceVariation { .. }
        )
    }

    /// Stable, human-readable reason string
    pub fn reason(&self) -> &'static str {
        match self {
            QualityIssue::InsufficientSampleSize { .. } => "insufficient sample size",
            QualityIssue::NoSentimentVariation { .. } => "no sentiment variation",
            QualityIssue::NoPriceVariation { .. } => "no price variation",
            QualityIssue::LimitedSample { .. } => "limited sample",
            QualityIssue::ShortTimeSpan { .. } => "short time span",
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Outcome of the quality gate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub computable: bool,
    pub sample_size: usize,
    pub has_price_variance: bool,
    pub has_sentiment_variance: bool,
    /// Reason strings for every issue, blocking ones first
    pub reasons: Vec<String>,
    pub issues: Vec<QualityIssue>,
    pub distinct_days: usize,
}

impl QualityReport {
    pub fn blocking_issues(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| i.is_blocking())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| !i.is_blocking())
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }
}

/// Spread between largest and smallest value
fn value_range(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
    .map(|(lo, hi)| hi - lo)
}

/// Sample size and variance checks ahead of the statistics stage
#[derive(Debug, Clone)]
pub struct DataQualityValidator {
    config: QualityConfig,
}

impl Default for DataQualityValidator {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

impl DataQualityValidator {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Drop half-empty rows, then classify the remaining pairs
    pub fn validate_timeline(
        &self,
        points: &[TimelinePoint],
    ) -> (Vec<PairedObservation>, QualityReport) {
        let pairs = paired_observations(points);
        let report = self.validate(&pairs);
        (pairs, report)
    }

    pub fn validate(&self, pairs: &[PairedObservation]) -> QualityReport {
        let n = pairs.len();
        let sentiment_range = value_range(pairs.iter().map(|p| p.sentiment));
        let price_range = value_range(pairs.iter().map(|p| p.price));

        // NaN ranges compare false and count as "no variance"
        let has_sentiment_variance = sentiment_range
            .map(|r| r >= self.config.sentiment_range_epsilon)
            .unwrap_or(false);
        let has_price_variance = price_range
            .map(|r| r >= self.config.price_range_epsilon)
            .unwrap_or(false);

        let distinct_days = pairs
            .iter()
            .map(|p| p.timestamp.date_naive())
            .collect::<HashSet<_>>()
            .len();

        let mut issues = Vec::new();

        if n < self.config.min_sample_size {
            issues.push(QualityIssue::InsufficientSampleSize {
                sample_size: n,
                required: self.config.min_sample_size,
            });
        } else {
            if !has_sentiment_variance {
                issues.push(QualityIssue::NoSentimentVariation {
                    range: sentiment_range.unwrap_or(0.0),
                });
            }
            if !has_price_variance {
                issues.push(QualityIssue::NoPriceVariation {
                    range: price_range.unwrap_or(0.0),
                });
            }
            if n < self.config.limited_sample_threshold {
                issues.push(QualityIssue::LimitedSample {
                    sample_size: n,
                    recommended: self.config.limited_sample_threshold,
                });
            }
            if distinct_days < self.config.min_distinct_days {
                issues.push(QualityIssue::ShortTimeSpan {
                    distinct_days,
                    recommended: self.config.min_distinct_days,
                });
            }
        }

        let computable = !issues.iter().any(QualityIssue::is_blocking);
        let reasons = issues.iter().map(|i| i.reason().to_string()).collect();

        debug!(
            sample_size = n,
            distinct_days,
            computable,
            "Quality validation complete"
        );

        QualityReport {
            computable,
            sample_size: n,
            has_price_variance,
            has_sentiment_variance,
            reasons,
            issues,
            distinct_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn pairs(values: &[(f64, f64)], step: Duration) -> Vec<PairedObservation> {
        values
            .iter()
            .enumerate()
            .map(|(i, (s, p))| PairedObservation::new(start() + step * i as i32, *s, *p))
            .collect()
    }

    #[test]
    fn test_insufficient_sample_regardless_of_variance() {
        let validator = DataQualityValidator::default();
        let report = validator.validate(&pairs(&[(0.1, 10.0), (0.9, 20.0)], Duration::days(1)));

        assert!(!report.computable);
        assert_eq!(report.sample_size, 2);
        assert!(report.has_reason("insufficient sample size"));
        assert_eq!(report.reasons.len(), 1);
        assert!(report.has_sentiment_variance);
        assert!(report.has_price_variance);
    }

    #[test]
    fn test_empty_sample() {
        let report = DataQualityValidator::default().validate(&[]);
        assert!(!report.computable);
        assert_eq!(report.sample_size, 0);
        assert!(!report.has_sentiment_variance);
        assert!(!report.has_price_variance);
        assert_eq!(report.distinct_days, 0);
    }

    #[test]
    fn test_no_sentiment_variation() {
        let validator = DataQualityValidator::default();
        let report = validator.validate(&pairs(
            &[(0.5, 10.0), (0.5, 12.0), (0.5, 9.0)],
            Duration::days(1),
        ));

        assert!(!report.computable);
        assert!(report.has_reason("no sentiment variation"));
        assert!(!report.has_reason("no price variation"));
        assert!(!report.has_sentiment_variance);
    }

    #[test]
    fn test_no_price_variation() {
        let validator = DataQualityValidator::default();
        let report = validator.validate(&pairs(
            &[(0.1, 50.0), (0.4, 50.004), (0.7, 50.0)],
            Duration::days(1),
        ));

        assert!(!report.computable);
        assert!(report.has_reason("no price variation"));
        assert!(report.has_sentiment_variance);
    }

    #[test]
    fn test_limited_sample_is_warning_only() {
        let validator = DataQualityValidator::default();
        let report = validator.validate(&pairs(
            &[(0.1, 10.0), (0.2, 12.0), (0.3, 14.0), (0.2, 11.0)],
            Duration::days(1),
        ));

        assert!(report.computable);
        assert!(report.has_reason("limited sample"));
        assert!(!report.has_reason("short time span"));
        assert_eq!(report.blocking_issues().count(), 0);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_short_time_span_warning() {
        let validator = DataQualityValidator::default();
        let values: Vec<(f64, f64)> = (0..12)
            .map(|i| (i as f64 / 20.0, 100.0 + i as f64))
            .collect();
        let report = validator.validate(&pairs(&values, Duration::hours(1)));

        assert!(report.computable);
        assert_eq!(report.distinct_days, 1);
        assert!(report.has_reason("short time span"));
        assert!(!report.has_reason("limited sample"));
    }

    #[test]
    fn test_clean_sample_has_no_issues() {
        let validator = DataQualityValidator::default();
        let values: Vec<(f64, f64)> = (0..12)
            .map(|i| ((i % 5) as f64 / 10.0, 100.0 + (i % 3) as f64))
            .collect();
        let report = validator.validate(&pairs(&values, Duration::days(1)));

        assert!(report.computable);
        assert!(report.issues.is_empty());
        assert!(report.reasons.is_empty());
        assert_eq!(report.distinct_days, 12);
    }

    #[test]
    fn test_custom_thresholds() {
        let validator = DataQualityValidator::new(QualityConfig {
            min_sample_size: 5,
            limited_sample_threshold: 5,
            sentiment_range_epsilon: 0.5,
            price_range_epsilon: 0.01,
            min_distinct_days: 1,
        });

        let report = validator.validate(&pairs(
            &[(0.1, 10.0), (0.2, 12.0), (0.3, 14.0), (0.2, 11.0)],
            Duration::days(1),
        ));
        assert!(report.has_reason("insufficient sample size"));

        let report = validator.validate(&pairs(
            &[(0.1, 10.0), (0.2, 12.0), (0.3, 14.0), (0.2, 11.0), (0.3, 9.0)],
            Duration::days(1),
        ));
        assert!(report.has_reason("no sentiment variation"));
    }

    #[test]
    fn test_nan_values_are_not_variance() {
        let validator = DataQualityValidator::default();
        let report = validator.validate(&pairs(
            &[(f64::NAN, 10.0), (f64::NAN, 12.0), (f64::NAN, 14.0)],
            Duration::days(1),
        ));
        assert!(!report.computable);
        assert!(report.has_reason("no sentiment variation"));
    }

    #[test]
    fn test_issue_serialization() {
        let issue = QualityIssue::ShortTimeSpan {
            distinct_days: 1,
            recommended: 3,
        };
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"kind\":\"short_time_span\""));
        assert_eq!(issue.to_string(), "short time span");
    }
}
