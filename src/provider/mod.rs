//! Observation sources
//!
//! The engine never fetches data itself. Collaborators hand it sentiment
//! and price arrays through [`ObservationProvider`]; the CLI uses the JSON
//! file provider, tests use the in-memory one or a generated mock.

use crate::analyzer::{AnalysisRequest, AnalysisResult, SentimentPriceAnalyzer};
use crate::cache::AnalysisCache;
use crate::error::{EngineError, Result};
use crate::types::{AnalysisWindow, PriceObservation, SentimentObservation};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};


/// Source of observation arrays for one symbol and window
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationProvider: Send + Sync {
    async fn fetch_sentiment(
        &self,
        symbol: &str,
        window: AnalysisWindow,
    ) -> Result<Vec<SentimentObservation>>;

    async fn fetch_prices(
        &self,
        symbol: &str,
        window: AnalysisWindow,
    ) -> Result<Vec<PriceObservation>>;
}

/// Reads `{symbol}_sentiment.json` and `{symbol}_prices.json` from a directory
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    data_dir: PathBuf,
}

impl JsonFileProvider {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Expand `~` and environment variables in the configured directory
    pub fn from_config_dir(data_dir: &str) -> Result<Self> {
        let expanded = shellexpand::full(data_dir)
            .map_err(|e| EngineError::Config(format!("data_dir: {}", e)))?;
        Ok(Self::new(expanded.as_ref()))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn file_for(&self, symbol: &str, kind: &str) -> Result<PathBuf> {
        let valid = !symbol.is_empty()
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'))
            && !symbol.starts_with('.');
        if !valid {
            return Err(EngineError::InvalidInput(format!("bad symbol: {:?}", symbol)));
        }
        Ok(self
            .data_dir
            .join(format!("{}_{}.json", symbol.to_lowercase(), kind)))
    }

    async fn read_array<T: serde::de::DeserializeOwned>(&self, path: PathBuf) -> Result<Vec<T>> {
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            EngineError::Provider(format!("failed to read {}: {}", path.display(), e))
        })?;
        let values: Vec<T> = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), count = values.len(), "Loaded observations");
        Ok(values)
    }
}

#[async_trait]
impl ObservationProvider for JsonFileProvider {
    async fn fetch_sentiment(
        &self,
        symbol: &str,
        _window: AnalysisWindow,
    ) -> Result<Vec<SentimentObservation>> {
        self.read_array(self.file_for(symbol, "sentiment")?).await
    }

    async fn fetch_prices(
        &self,
        symbol: &str,
        _window: AnalysisWindow,
    ) -> Result<Vec<PriceObservation>> {
        self.read_array(self.file_for(symbol, "prices")?).await
    }
}

/// Series held in memory, keyed by upper-cased symbol
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: Arc<RwLock<HashMap<String, (Vec<SentimentObservation>, Vec<PriceObservation>)>>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        symbol: &str,
        sentiment: Vec<SentimentObservation>,
        prices: Vec<PriceObservation>,
    ) {
        self.series
            .write()
            .insert(symbol.to_uppercase(), (sentiment, prices));
    }

    fn lookup<T>(
        &self,
        symbol: &str,
        pick: impl Fn(&(Vec<SentimentObservation>, Vec<PriceObservation>)) -> Vec<T>,
    ) -> Result<Vec<T>> {
        self.series
            .read()
            .get(&symbol.to_uppercase())
            .map(pick)
            .ok_or_else(|| EngineError::Provider(format!("unknown symbol: {}", symbol)))
    }
}

#[async_trait]
impl ObservationProvider for InMemoryProvider {
    async fn fetch_sentiment(
        &self,
        symbol: &str,
        _window: AnalysisWindow,
    ) -> Result<Vec<SentimentObservation>> {
        self.lookup(symbol, |(s, _)| s.clone())
    }

    async fn fetch_prices(
        &self,
        symbol: &str,
        _window: AnalysisWindow,
    ) -> Result<Vec<PriceObservation>> {
        self.lookup(symbol, |(_, p)| p.clone())
    }
}

/// Fetch both series concurrently and analyze them, all under `timeout`.
///
/// An unrecognized window is fetched as the fallback window; the analyzer
/// resolves the same fallback and reports it.
pub async fn fetch_then_analyze(
    provider: &dyn ObservationProvider,
    analyzer: &SentimentPriceAnalyzer,
    symbol: &str,
    window: &str,
    bucket_width_override_ms: Option<u64>,
    timeout: Duration,
) -> Result<AnalysisResult> {
    fetch_then_analyze_cached(
        provider,
        analyzer,
        None,
        symbol,
        window,
        bucket_width_override_ms,
        timeout,
    )
    .await
}

/// As [`fetch_then_analyze`], reusing a cached result for identical inputs
pub async fn fetch_then_analyze_cached(
    provider: &dyn ObservationProvider,
    analyzer: &SentimentPriceAnalyzer,
    cache: Option<&AnalysisCache>,
    symbol: &str,
    window: &str,
    bucket_width_override_ms: Option<u64>,
    timeout: Duration,
) -> Result<AnalysisResult> {
    let resolved = window.parse::<AnalysisWindow>().unwrap_or_default();

    let work = async {
        let (sentiment, prices) = tokio::try_join!(
            provider.fetch_sentiment(symbol, resolved),
            provider.fetch_prices(symbol, resolved),
        )?;

        info!(
            symbol,
            window = %resolved,
            sentiment = sentiment.len(),
            prices = prices.len(),
            "Fetched observations"
        );

        let request = AnalysisRequest {
            sentiment,
            prices,
            window: window.to_string(),
            bucket_width_override_ms,
        };
        match cache {
            Some(cache) => cache.get_or_compute(symbol, &request, analyzer),
            None => analyzer.analyze(&request),
        }
    };

    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| EngineError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })?
}
