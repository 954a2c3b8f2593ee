//! Statistics over paired (sentiment, price) observations
//!
//! - Pearson correlation, R², Student-t p-value, Fisher-z interval
//! - OLS trend line for overlay rendering

mod correlation;
mod regression;


pub use correlation::{pearson, CorrelationEngine, CorrelationResult, CorrelationStrength};
pub use regression::{RegressionEstimator, RegressionLine, RegressionPoint};
