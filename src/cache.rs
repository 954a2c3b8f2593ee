//! In-memory result cache
//!
//! Analyses are pure functions of their inputs, so a result can be reused
//! for repeated dashboard loads of the same symbol and window.

use crate::analyzer::{AnalysisRequest, AnalysisResult, SentimentPriceAnalyzer};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::types::{ObservationTime, PriceObservation, SentimentObservation};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl_secs: i64) -> Self {
        Self {
            value,
            expires_at: Duration::try_seconds(ttl_secs)
                .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Identity of one analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub window: String,
    pub bucket_width_override_ms: Option<u64>,
    pub input_hash: u64,
}

impl CacheKey {
    pub fn for_request(symbol: &str, request: &AnalysisRequest) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            window: request.window.trim().to_lowercase(),
            bucket_width_override_ms: request.bucket_width_override_ms,
            input_hash: input_hash(&request.sentiment, &request.prices),
        }
    }
}

fn hash_time<H: Hasher>(time: &ObservationTime, state: &mut H) {
    match time {
        ObservationTime::Millis(ms) => {
            0u8.hash(state);
            ms.to_bits().hash(state);
        }
        ObservationTime::Text(text) => {
            1u8.hash(state);
            text.hash(state);
        }
        ObservationTime::Missing => 2u8.hash(state),
    }
}

/// Fingerprint of both observation arrays, order included
pub fn input_hash(sentiment: &[SentimentObservation], prices: &[PriceObservation]) -> u64 {
    let mut hasher = DefaultHasher::new();

    sentiment.len().hash(&mut hasher);
    for obs in sentiment {
        hash_time(&obs.timestamp, &mut hasher);
        obs.score.to_bits().hash(&mut hasher);
        obs.source_count.hash(&mut hasher);
    }

    prices.len().hash(&mut hasher);
    for obs in prices {
        hash_time(&obs.timestamp, &mut hasher);
        obs.close.to_bits().hash(&mut hasher);
        obs.volume.map(f64::to_bits).hash(&mut hasher);
    }

    hasher.finish()
}

/// TTL cache of analysis results
#[derive(Debug, Clone)]
pub struct AnalysisCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry<AnalysisResult>>>>,
    default_ttl: i64,
    max_entries: usize,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl AnalysisCache {
    pub fn new(default_ttl_secs: i64, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl: default_ttl_secs,
            max_entries: max_entries.max(1),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl_secs, config.max_entries)
    }

    /// Get a result (None if expired or not found)
    pub fn get(&self, key: &CacheKey) -> Option<AnalysisResult> {
        let cache = self.entries.read();
        let found = cache
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone());

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a result, evicting the entry closest to expiry when full
    pub fn insert(&self, key: CacheKey, result: AnalysisResult) {
        let mut cache = self.entries.write();

        if !cache.contains_key(&key) && cache.len() >= self.max_entries {
            cache.retain(|_, entry| !entry.is_expired());
            if cache.len() >= self.max_entries {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }

        cache.insert(key, CacheEntry::new(result, self.default_ttl));
    }

    /// Cached result for the request, computing and storing it on a miss.
    ///
    /// Errors are never cached.
    pub fn get_or_compute(
        &self,
        symbol: &str,
        request: &AnalysisRequest,
        analyzer: &SentimentPriceAnalyzer,
    ) -> Result<AnalysisResult> {
        let key = CacheKey::for_request(symbol, request);
        if let Some(hit) = self.get(&key) {
            tracing::debug!(symbol = %key.symbol, window = %key.window, "Analysis cache hit");
            return Ok(hit);
        }

        let result = analyzer.analyze(request)?;
        self.insert(key, result.clone());
        Ok(result)
    }

    /// Remove expired entries
    pub fn cleanup(&self) {
        let mut cache = self.entries.write();
        cache.retain(|_, entry| !entry.is_expired());
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let cache = self.entries.read();
        let expired = cache.values().filter(|e| e.is_expired()).count();

        CacheStats {
            total_entries: cache.len(),
            expired_entries: expired,
            valid_entries: cache.len() - expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub valid_entries: usize,
    pub hits: u64,
    pub misses: u64,
}
