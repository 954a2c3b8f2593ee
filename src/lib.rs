//! Sentiment/price correlation engine
//!
//! Aligns news-sentiment readings with closing prices on a shared time grid
//! and reports whether, and how strongly, they move together.

pub mod analyzer;
pub mod bucket;
pub mod cache;
pub mod config;
pub mod error;
pub mod provider;
pub mod quality;
pub mod stats;
pub mod testing;
pub mod timeline;
pub mod types;


pub use analyzer::{AnalysisRequest, AnalysisResult, SentimentPriceAnalyzer};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use types::{AnalysisWindow, PriceObservation, SentimentObservation};
