//! Time bucketing
//!
//! Aligns irregular sentiment events and periodic price samples onto one
//! fixed-width grid:
//! - Sentiment buckets fold readings into mean / min / max / count
//! - Price buckets keep the terminal (latest) value of the interval
//! - Width follows the upstream pipeline cadence for 1d windows


use crate::config::BucketingConfig;
use crate::error::{EngineError, Result};
use crate::types::{AnalysisWindow, PriceObservation, SentimentObservation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Positive bucket width in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BucketWidth(i64);

impl BucketWidth {
    pub fn from_millis(ms: i64) -> Option<Self> {
        (ms > 0).then_some(Self(ms))
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::from_millis(i64::from(minutes) * MILLIS_PER_MINUTE)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn as_minutes(&self) -> f64 {
        self.0 as f64 / MILLIS_PER_MINUTE as f64
    }

    /// Floor a timestamp (ms) onto this grid.
    ///
    /// Euclidean division, so instants before the epoch still floor downward.
    pub fn key(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms.div_euclid(self.0) * self.0
    }
}

/// Width chosen for a request, plus any parameter warning
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWidth {
    pub width: BucketWidth,
    pub warning: Option<String>,
}

/// Maps analysis windows to bucket widths
#[derive(Debug, Clone, Copy)]
pub struct BucketWidthPolicy {
    pipeline_cadence: BucketWidth,
    long_window: BucketWidth,
}

impl BucketWidthPolicy {
    pub fn from_config(config: &BucketingConfig) -> Result<Self> {
        let pipeline_cadence = BucketWidth::from_minutes(config.pipeline_cadence_minutes)
            .ok_or_else(|| {
                EngineError::Config("bucketing.pipeline_cadence_minutes must be > 0".to_string())
            })?;
        let long_window = BucketWidth::from_minutes(config.long_window_bucket_minutes)
            .ok_or_else(|| {
                EngineError::Config("bucketing.long_window_bucket_minutes must be > 0".to_string())
            })?;

        Ok(Self {
            pipeline_cadence,
            long_window,
        })
    }

    /// Width for a window without any caller override.
    ///
    /// A single day is bucketed at the pipeline's run interval; averaging
    /// finer than one run would mix one batch of articles with empty gaps.
    pub fn width_for(&self, window: AnalysisWindow) -> BucketWidth {
        match window {
            AnalysisWindow::OneDay => self.pipeline_cadence,
            AnalysisWindow::SevenDays
            | AnalysisWindow::FourteenDays
            | AnalysisWindow::ThirtyDays => self.long_window,
        }
    }

    /// Width for a window, honoring a positive caller override
    pub fn resolve(&self, window: AnalysisWindow, override_ms: Option<u64>) -> ResolvedWidth {
        let default = self.width_for(window);

        let Some(requested) = override_ms else {
            return ResolvedWidth {
                width: default,
                warning: None,
            };
        };

        match i64::try_from(requested).ok().and_then(BucketWidth::from_millis) {
            Some(width) => ResolvedWidth {
                width,
                warning: None,
            },
            None => {
                warn!(override_ms = requested, "Ignoring invalid bucket width override");
                ResolvedWidth {
                    width: default,
                    warning: Some(format!(
                        "invalid bucket width override {} ms, using {} ms",
                        requested,
                        default.as_millis()
                    )),
                }
            }
        }
    }
}

impl Default for BucketWidthPolicy {
    fn default() -> Self {
        Self {
            pipeline_cadence: BucketWidth(45 * MILLIS_PER_MINUTE),
            long_window: BucketWidth(60 * MILLIS_PER_MINUTE),
        }
    }
}

/// Aggregate of all sentiment readings inside one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentBucket {
    pub key_ms: i64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    /// Sum of upstream article counts
    pub source_count: u64,
    #[serde(skip)]
    sum: f64,
}

impl SentimentBucket {
    fn new(key_ms: i64, score: f64, source_count: u32) -> Self {
        Self {
            key_ms,
            mean: score,
            min: score,
            max: score,
            count: 1,
            source_count: u64::from(source_count),
            sum: score,
        }
    }

    fn add(&mut self, score: f64, source_count: u32) {
        self.sum += score;
        self.count += 1;
        self.mean = self.sum / self.count as f64;
        self.min = self.min.min(score);
        self.max = self.max.max(score);
        self.source_count += u64::from(source_count);
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.key_ms)
    }
}

/// Terminal price of one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBucket {
    pub key_ms: i64,
    pub close: f64,
    /// When the retained close was observed
    pub observed_at: DateTime<Utc>,
    pub volume: Option<f64>,
}

/// Ordered bucket map plus the number of readings dropped on the way in
#[derive(Debug, Clone, PartialEq)]
pub struct BucketMap<T> {
    pub buckets: BTreeMap<i64, T>,
    pub malformed: usize,
}

impl<T> BucketMap<T> {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl<T> Default for BucketMap<T> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            malformed: 0,
        }
    }
}

impl BucketMap<SentimentBucket> {
    /// Total readings folded into the buckets
    pub fn observation_count(&self) -> usize {
        self.buckets.values().map(|b| b.count).sum()
    }
}

/// Folds observations into fixed-width buckets
#[derive(Debug, Clone, Copy)]
pub struct TimeBucketAggregator {
    width: BucketWidth,
}

impl TimeBucketAggregator {
    pub fn new(width: BucketWidth) -> Self {
        Self { width }
    }

    /// Mean / min / max / count per bucket
    pub fn aggregate_sentiment(
        &self,
        observations: &[SentimentObservation],
    ) -> BucketMap<SentimentBucket> {
        let mut map: BucketMap<SentimentBucket> = BucketMap::default();

        for obs in observations {
            let Some(ts) = obs.timestamp.resolve() else {
                debug!(timestamp = ?obs.timestamp, "Dropping sentiment reading with bad timestamp");
                map.malformed += 1;
                continue;
            };
            if !obs.score.is_finite() || !(-1.0..=1.0).contains(&obs.score) {
                debug!(score = obs.score, "Dropping sentiment reading with invalid score");
                map.malformed += 1;
                continue;
            }

            let key = self.width.key(ts.timestamp_millis());
            map.buckets
                .entry(key)
                .and_modify(|bucket: &mut SentimentBucket| bucket.add(obs.score, obs.source_count))
                .or_insert_with(|| SentimentBucket::new(key, obs.score, obs.source_count));
        }

        if map.malformed > 0 {
            warn!(
                dropped = map.malformed,
                total = observations.len(),
                "Malformed sentiment observations dropped"
            );
        }
        debug!(
            buckets = map.len(),
            width_ms = self.width.as_millis(),
            "Sentiment bucketing complete"
        );

        map
    }

    /// Last observed close per bucket
    pub fn aggregate_prices(&self, observations: &[PriceObservation]) -> BucketMap<PriceBucket> {
        let mut map: BucketMap<PriceBucket> = BucketMap::default();

        for obs in observations {
            let Some(ts) = obs.timestamp.resolve() else {
                debug!(timestamp = ?obs.timestamp, "Dropping price sample with bad timestamp");
                map.malformed += 1;
                continue;
            };
            if !obs.close.is_finite() || obs.close <= 0.0 {
                debug!(close = obs.close, "Dropping price sample with invalid close");
                map.malformed += 1;
                continue;
            }
            if let Some(volume) = obs.volume {
                if !volume.is_finite() || volume < 0.0 {
                    debug!(volume, "Dropping price sample with invalid volume");
                    map.malformed += 1;
                    continue;
                }
            }

            let key = self.width.key(ts.timestamp_millis());
            let candidate = PriceBucket {
                key_ms: key,
                close: obs.close,
                observed_at: ts,
                volume: obs.volume,
            };

            match map.buckets.get_mut(&key) {
                // Later-or-equal observation replaces; input order breaks ties
                Some(existing) if ts >= existing.observed_at => *existing = candidate,
                Some(_) => {}
                None => {
                    map.buckets.insert(key, candidate);
                }
            }
        }

        if map.malformed > 0 {
            warn!(
                dropped = map.malformed,
                total = observations.len(),
                "Malformed price observations dropped"
            );
        }
        debug!(
            buckets = map.len(),
            width_ms = self.width.as_millis(),
            "Price bucketing complete"
        );

        map
    }
}
