//! OLS trend line for chart overlays

use crate::config::RegressionConfig;
use crate::types::PairedObservation;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionPoint {
    pub x: f64,
    pub y: f64,
}

/// Fitted line, reported by its two endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionLine {
    pub slope: f64,
    pub intercept: f64,
    /// Projection at the smallest x
    pub start: RegressionPoint,
    /// Projection at the largest x
    pub end: RegressionPoint,
    pub sample_size: usize,
}

impl RegressionLine {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn endpoints(&self) -> [RegressionPoint; 2] {
        [self.start, self.end]
    }
}

/// Ordinary least squares over (sentiment, price)
#[derive(Debug, Clone)]
pub struct RegressionEstimator {
    denominator_epsilon: f64,
}

impl Default for RegressionEstimator {
    fn default() -> Self {
        Self::new(&RegressionConfig::default())
    }
}

impl RegressionEstimator {
    pub fn new(config: &RegressionConfig) -> Self {
        Self {
            denominator_epsilon: config.denominator_epsilon,
        }
    }

    pub fn fit(&self, pairs: &[PairedObservation]) -> Option<RegressionLine> {
        let xs: Vec<f64> = pairs.iter().map(|p| p.sentiment).collect();
        let ys: Vec<f64> = pairs.iter().map(|p| p.price).collect();
        self.fit_xy(&xs, &ys)
    }

    /// `None` when x has no spread or fewer than two points are given
    pub fn fit_xy(&self, xs: &[f64], ys: &[f64]) -> Option<RegressionLine> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return None;
        }

        let n = xs.len() as f64;
        let sum_x: f64 = xs.iter().sum();
        let sum_y: f64 = ys.iter().sum();
        let sum_xy: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| x * y).sum();
        let sum_x2: f64 = xs.iter().map(|x| x * x).sum();

        let denominator = n * sum_x2 - sum_x * sum_x;
        if !denominator.is_finite() || denominator.abs() < self.denominator_epsilon {
            return None;
        }

        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        let intercept = sum_y / n - slope * (sum_x / n);
        if !slope.is_finite() || !intercept.is_finite() {
            return None;
        }

        let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(RegressionLine {
            slope,
            intercept,
            start: RegressionPoint {
                x: min_x,
                y: slope * min_x + intercept,
            },
            end: RegressionPoint {
                x: max_x,
                y: slope * max_x + intercept,
            },
            sample_size: xs.len(),
        })
    }
}
