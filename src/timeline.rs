//! Timeline merging
//!
//! Joins bucketed sentiment and price series on bucket key. A bucket present
//! on one side only is associated with the nearest bucket of the other side
//! within one bucket width; without one it keeps a null side.

use crate::bucket::{BucketMap, BucketWidth, PriceBucket, SentimentBucket};
use crate::error::{EngineError, Result};
use crate::types::PairedObservation;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// How a merged row was assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Both sides share the bucket key
    Exact,
    /// Sides sit in different buckets within tolerance
    Nearest,
    LeftOnly,
    RightOnly,
}

/// One row of a generic two-sided merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergedBucket<L, R> {
    pub key_ms: i64,
    pub left: Option<L>,
    pub right: Option<R>,
    pub kind: MatchKind,
}

/// Closest key of `map` within `tolerance_ms` of `key`; ties go to the earlier key
fn nearest_key<V>(map: &BTreeMap<i64, V>, key: i64, tolerance_ms: i64) -> Option<i64> {
    if tolerance_ms < 0 {
        return None;
    }
    let lo = key.saturating_sub(tolerance_ms);
    let hi = key.saturating_add(tolerance_ms);
    map.range(lo..=hi)
        .map(|(k, _)| *k)
        .min_by_key(|k| (k.abs_diff(key), *k))
}

/// Merge two keyed maps into one row per key, ascending.
///
/// A key present on one side only borrows the nearest bucket of the other
/// side within `tolerance_ms`, whether or not that bucket also has an exact
/// partner. Each side searches independently, so swapping `left` and `right`
/// yields the same rows with the sides swapped.
pub fn merge_keyed<L: Clone, R: Clone>(
    left: &BTreeMap<i64, L>,
    right: &BTreeMap<i64, R>,
    tolerance_ms: i64,
) -> Vec<MergedBucket<L, R>> {
    let keys: BTreeSet<i64> = left.keys().chain(right.keys()).copied().collect();

    keys.into_iter()
        .filter_map(|key| match (left.get(&key), right.get(&key)) {
            (Some(l), Some(r)) => Some(MergedBucket {
                key_ms: key,
                left: Some(l.clone()),
                right: Some(r.clone()),
                kind: MatchKind::Exact,
            }),
            (Some(l), None) => {
                let right_match = nearest_key(right, key, tolerance_ms).and_then(|k| right.get(&k));
                Some(MergedBucket {
                    key_ms: key,
                    left: Some(l.clone()),
                    kind: if right_match.is_some() {
                        MatchKind::Nearest
                    } else {
                        MatchKind::LeftOnly
                    },
                    right: right_match.cloned(),
                })
            }
            (None, Some(r)) => {
                let left_match = nearest_key(left, key, tolerance_ms).and_then(|k| left.get(&k));
                Some(MergedBucket {
                    key_ms: key,
                    right: Some(r.clone()),
                    kind: if left_match.is_some() {
                        MatchKind::Nearest
                    } else {
                        MatchKind::RightOnly
                    },
                    left: left_match.cloned(),
                })
            }
            (None, None) => None,
        })
        .collect()
}

/// One chart row of the merged timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub timestamp: DateTime<Utc>,
    /// Mean sentiment of the bucket
    pub sentiment: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub price: Option<f64>,
    /// Sentiment readings behind this row
    pub count: usize,
    #[serde(skip)]
    pub kind: MatchKind,
}

impl TimelinePoint {
    /// Both sides present
    pub fn as_pair(&self) -> Option<PairedObservation> {
        match (self.sentiment, self.price) {
            (Some(sentiment), Some(price)) => {
                Some(PairedObservation::new(self.timestamp, sentiment, price))
            }
            _ => None,
        }
    }
}

/// Joins sentiment and price buckets into one ordered timeline
#[derive(Debug, Clone, Copy)]
pub struct TimelineMerger {
    tolerance_ms: i64,
}

impl TimelineMerger {
    /// Tolerance of one bucket width
    pub fn new(width: BucketWidth) -> Self {
        Self {
            tolerance_ms: width.as_millis(),
        }
    }

    pub fn merge(
        &self,
        sentiment: &BucketMap<SentimentBucket>,
        prices: &BucketMap<PriceBucket>,
    ) -> Result<Vec<TimelinePoint>> {
        let merged = merge_keyed(&sentiment.buckets, &prices.buckets, self.tolerance_ms);

        let points = merged
            .into_iter()
            .map(|row| {
                let timestamp = DateTime::from_timestamp_millis(row.key_ms).ok_or_else(|| {
                    EngineError::InvariantViolation(format!(
                        "bucket key {} is outside the representable time range",
                        row.key_ms
                    ))
                })?;

                Ok(TimelinePoint {
                    timestamp,
                    sentiment: row.left.as_ref().map(|s| s.mean),
                    high: row.left.as_ref().map(|s| s.max),
                    low: row.left.as_ref().map(|s| s.min),
                    price: row.right.as_ref().map(|p| p.close),
                    // Borrowed sentiment is counted at its own key only
                    count: sentiment
                        .buckets
                        .get(&row.key_ms)
                        .map(|s| s.count)
                        .unwrap_or(0),
                    kind: row.kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            rows = points.len(),
            exact = points.iter().filter(|p| p.kind == MatchKind::Exact).count(),
            nearest = points.iter().filter(|p| p.kind == MatchKind::Nearest).count(),
            "Timeline merge complete"
        );

        Ok(points)
    }
}

/// Rows carrying both a sentiment and a price value
pub fn paired_observations(points: &[TimelinePoint]) -> Vec<PairedObservation> {
    points.iter().filter_map(TimelinePoint::as_pair).collect()
}

/// Fail if the timeline is not strictly ascending by timestamp
pub fn ensure_ascending(points: &[TimelinePoint]) -> Result<()> {
    match points.windows(2).find(|w| w[0].timestamp >= w[1].timestamp) {
        Some(w) => Err(EngineError::InvariantViolation(format!(
            "timeline out of order at {} -> {}",
            w[0].timestamp, w[1].timestamp
        ))),
        None => Ok(()),
    }
}
