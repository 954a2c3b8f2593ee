//! Test Data Generators
//!
//! Utilities for generating observation series with a known relationship

use crate::types::{ObservationTime, PriceObservation, SentimentObservation};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generator for sentiment and price series.
///
/// Deterministic for a given seed, so failing tests can be replayed.
pub struct ObservationGenerator {
    rng: StdRng,
    start: DateTime<Utc>,
    step: Duration,
    base_price: f64,
    price_scale: f64,
}

impl ObservationGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            start: Utc
                .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            step: Duration::hours(1),
            base_price: 100.0,
            price_scale: 10.0,
        }
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Spacing between consecutive readings
    pub fn every(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn with_price(mut self, base_price: f64, scale: f64) -> Self {
        self.base_price = base_price;
        self.price_scale = scale;
        self
    }

    fn at(&self, i: usize) -> DateTime<Utc> {
        self.start + self.step * i as i32
    }

    /// Uniform scores in [-1, 1]
    pub fn sentiment(&mut self, count: usize) -> Vec<SentimentObservation> {
        let mut series = Vec::with_capacity(count);
        for i in 0..count {
            let score = self.rng.random_range(-1.0..=1.0);
            let sources = self.rng.random_range(1..=20);
            series.push(SentimentObservation::new(self.at(i), score).with_source_count(sources));
        }
        series
    }

    /// Sentiment plus prices whose population correlation with it is `strength`.
    ///
    /// `price = base + scale * (strength * s + sqrt(1 - strength²) * u)` with
    /// `s` and `u` independent and identically distributed.
    pub fn correlated(
        &mut self,
        count: usize,
        strength: f64,
    ) -> (Vec<SentimentObservation>, Vec<PriceObservation>) {
        let strength = strength.clamp(-1.0, 1.0);
        let noise_weight = (1.0 - strength * strength).sqrt();

        let sentiment = self.sentiment(count);
        let mut prices = Vec::with_capacity(count);
        for (i, obs) in sentiment.iter().enumerate() {
            let noise: f64 = self.rng.random_range(-1.0..=1.0);
            let close =
                self.base_price + self.price_scale * (strength * obs.score + noise_weight * noise);
            let volume = self.rng.random_range(1_000.0..50_000.0);
            prices.push(PriceObservation::new(self.at(i), close.max(0.01)).with_volume(volume));
        }

        (sentiment, prices)
    }

    /// Prices drifting independently of any sentiment
    pub fn random_walk(&mut self, count: usize) -> Vec<PriceObservation> {
        let mut close = self.base_price;
        let mut prices = Vec::with_capacity(count);
        for i in 0..count {
            close = (close + self.rng.random_range(-1.0..=1.0)).max(0.01);
            prices.push(PriceObservation::new(self.at(i), close));
        }
        prices
    }

    /// Replace roughly `fraction` of readings with malformed ones; returns how many
    pub fn corrupt_sentiment(
        &mut self,
        observations: &mut [SentimentObservation],
        fraction: f64,
    ) -> usize {
        let mut corrupted = 0;
        for obs in observations.iter_mut() {
            if !self.rng.random_bool(fraction.clamp(0.0, 1.0)) {
                continue;
            }
            match self.rng.random_range(0..3) {
                0 => obs.timestamp = ObservationTime::Text("not a time".to_string()),
                1 => obs.score = f64::NAN,
                _ => obs.score = 1.5,
            }
            corrupted += 1;
        }
        corrupted
    }

    /// Replace roughly `fraction` of prices with malformed ones; returns how many
    pub fn corrupt_prices(&mut self, observations: &mut [PriceObservation], fraction: f64) -> usize {
        let mut corrupted = 0;
        for obs in observations.iter_mut() {
            if !self.rng.random_bool(fraction.clamp(0.0, 1.0)) {
                continue;
            }
            match self.rng.random_range(0..3) {
                0 => obs.timestamp = ObservationTime::Millis(f64::INFINITY),
                1 => obs.close = 0.0,
                _ => obs.volume = Some(-1.0),
            }
            corrupted += 1;
        }
        corrupted
    }
}

impl Default for ObservationGenerator {
    fn default() -> Self {
        Self::new(42)
    }
}
