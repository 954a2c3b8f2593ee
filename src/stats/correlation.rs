//! Pearson correlation with significance and confidence interval

use crate::config::CorrelationConfig;
use crate::error::{EngineError, Result};
use crate::quality::QualityReport;
use crate::types::PairedObservation;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::debug;

/// Correlation statistics for one paired sample.
///
/// Every optional field is `None` when the sample cannot support a
/// correlation; no field ever holds NaN or infinity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationResult {
    pub computable: bool,
    pub pearson_r: Option<f64>,
    pub r_squared: Option<f64>,
    pub p_value: Option<f64>,
    /// p-value below the configured significance level
    pub significant: bool,
    pub confidence_interval: Option<(f64, f64)>,
    pub sample_size: usize,
}

impl CorrelationResult {
    /// The "not computable" shape
    pub fn undefined(sample_size: usize) -> Self {
        Self {
            computable: false,
            pearson_r: None,
            r_squared: None,
            p_value: None,
            significant: false,
            confidence_interval: None,
            sample_size,
        }
    }

    pub fn strength(&self) -> Option<CorrelationStrength> {
        self.pearson_r.map(CorrelationStrength::from_r)
    }

    /// p-value below `alpha`
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value.map(|p| p < alpha).unwrap_or(false)
    }
}

/// Verbal bucket for |r|, as shown on summary cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Negligible,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl CorrelationStrength {
    pub fn from_r(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude >= 0.7 {
            CorrelationStrength::VeryStrong
        } else if magnitude >= 0.5 {
            CorrelationStrength::Strong
        } else if magnitude >= 0.3 {
            CorrelationStrength::Moderate
        } else if magnitude >= 0.1 {
            CorrelationStrength::Weak
        } else {
            CorrelationStrength::Negligible
        }
    }
}

/// Pearson r, R², two-tailed p-value and Fisher-z interval
#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    confidence_z: f64,
    significance_alpha: f64,
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new(&CorrelationConfig::default())
    }
}

impl CorrelationEngine {
    pub fn new(config: &CorrelationConfig) -> Self {
        Self {
            confidence_z: config.confidence_z,
            significance_alpha: config.significance_alpha,
        }
    }

    /// Correlation gated on a quality report
    pub fn compute_gated(
        &self,
        pairs: &[PairedObservation],
        report: &QualityReport,
    ) -> CorrelationResult {
        if !report.computable {
            debug!(reasons = ?report.reasons, "Correlation skipped by quality gate");
            return CorrelationResult::undefined(report.sample_size);
        }
        self.compute(pairs)
    }

    /// Correlation over paired observations (x = sentiment, y = price)
    pub fn compute(&self, pairs: &[PairedObservation]) -> CorrelationResult {
        let xs: Vec<f64> = pairs.iter().map(|p| p.sentiment).collect();
        let ys: Vec<f64> = pairs.iter().map(|p| p.price).collect();
        self.compute_xy(&xs, &ys)
    }

    /// Correlation over two raw series, which must be the same length
    pub fn compute_slices(&self, xs: &[f64], ys: &[f64]) -> Result<CorrelationResult> {
        if xs.len() != ys.len() {
            return Err(EngineError::InvariantViolation(format!(
                "correlation series lengths differ: {} vs {}",
                xs.len(),
                ys.len()
            )));
        }
        Ok(self.compute_xy(xs, ys))
    }

    fn compute_xy(&self, xs: &[f64], ys: &[f64]) -> CorrelationResult {
        let n = xs.len().min(ys.len());

        let Some(r) = pearson(&xs[..n], &ys[..n]) else {
            return CorrelationResult::undefined(n);
        };

        let r_squared = r * r;
        let p_value = two_tailed_p_value(r, n);
        let confidence_interval = fisher_interval(r, n, self.confidence_z);

        CorrelationResult {
            computable: true,
            pearson_r: Some(r),
            r_squared: Some(r_squared),
            p_value,
            significant: p_value.is_some_and(|p| p < self.significance_alpha),
            confidence_interval,
            sample_size: n,
        }
    }
}

/// Pearson r clamped to [-1, 1].
///
/// `None` for fewer than 3 points, zero variance on either side, or any
/// non-finite intermediate.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 3 {
        return None;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (x, y) in xs.iter().zip(ys.iter()) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if !(var_x > 0.0 && var_y > 0.0) || !var_x.is_finite() || !var_y.is_finite() {
        return None;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    if !r.is_finite() {
        return None;
    }

    Some(r.clamp(-1.0, 1.0))
}

/// `p = 2 * (1 - CDF_t(|t|, n - 2))` with `t = r * sqrt((n - 2) / (1 - r²))`
fn two_tailed_p_value(r: f64, n: usize) -> Option<f64> {
    if n < 3 {
        return None;
    }

    let df = (n - 2) as f64;
    let one_minus_r2 = 1.0 - r * r;
    if one_minus_r2 <= 0.0 {
        // |r| == 1: t is unbounded
        return Some(0.0);
    }

    let t = r * (df / one_minus_r2).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));

    p.is_finite().then(|| p.clamp(0.0, 1.0))
}

/// Fisher z interval; needs `n >= 4` so that `n - 3 > 0`
fn fisher_interval(r: f64, n: usize, z_crit: f64) -> Option<(f64, f64)> {
    if n < 4 {
        return None;
    }

    let z = r.atanh();
    let se = 1.0 / ((n - 3) as f64).sqrt();
    let lower = (z - z_crit * se).tanh();
    let upper = (z + z_crit * se).tanh();

    (lower.is_finite() && upper.is_finite()).then_some((lower, upper))
}
