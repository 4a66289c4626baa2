use std::ops::RangeInclusive;

use hearttrack_types::{CandidateSample, MeasurementResult, RawReading, Timestamp};

use crate::helpers::stats::{mean, std_dev};

/// Turns a stream of raw readings into one accepted, confidence-scored
/// measurement. One instance lives for exactly one session.
#[derive(Debug, Clone)]
pub struct SampleAcceptor {
    started_at_ms: u64,
    samples: Vec<CandidateSample>,
    rejected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceptance {
    pub heart_rate: f32,
    pub spo2: f32,
    pub confidence: f32,
    pub samples: usize,
    /// Finalized on timeout before the normal acceptance criteria were met.
    pub partial: bool,
}

impl Acceptance {
    pub fn into_result(self, taken_at: Timestamp) -> MeasurementResult {
        MeasurementResult {
            heart_rate: self.heart_rate,
            spo2: self.spo2,
            taken_at,
            accepted: true,
            confidence: self.confidence,
            partial: self.partial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    /// Nothing admissible arrived before the session timeout.
    Timeout,
    /// The subject disengaged mid-session.
    PresenceLost,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionOutcome {
    Pending,
    Accepted(Acceptance),
    Failed(SessionFailure),
}

struct Spread {
    heart_rate_mean: f64,
    spo2_mean: f64,
    heart_rate_std_dev: f64,
    spo2_std_dev: f64,
}

impl SampleAcceptor {
    pub const MIN_SAMPLES: usize = 3;
    pub const MAX_SAMPLES: usize = 5;

    pub const HEART_RATE_RANGE: RangeInclusive<f32> = 40.0..=200.0;
    pub const SPO2_RANGE: RangeInclusive<f32> = 70.0..=100.0;

    pub const HEART_RATE_TOLERANCE: f64 = 10.0;
    pub const SPO2_TOLERANCE: f64 = 3.0;

    pub const SESSION_TIMEOUT_MS: u64 = 60_000;
    pub const PARTIAL_DISCOUNT: f64 = 0.8;

    pub fn new(started_at_ms: u64) -> Self {
        Self {
            started_at_ms,
            samples: Vec::with_capacity(Self::MAX_SAMPLES),
            rejected: 0,
        }
    }

    pub fn samples(&self) -> &[CandidateSample] {
        &self.samples
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Physiological bounds plus both validity flags of the primitive.
    pub fn admit(reading: &RawReading) -> Option<CandidateSample> {
        let admissible = reading.heart_rate_valid
            && reading.spo2_valid
            && Self::HEART_RATE_RANGE.contains(&reading.heart_rate)
            && Self::SPO2_RANGE.contains(&reading.spo2);

        admissible.then_some(CandidateSample {
            heart_rate: reading.heart_rate,
            spo2: reading.spo2,
        })
    }

    pub fn offer(&mut self, reading: RawReading) -> SessionOutcome {
        let Some(sample) = Self::admit(&reading) else {
            self.rejected += 1;
            return SessionOutcome::Pending;
        };
        self.samples.push(sample);

        if self.samples.len() < Self::MIN_SAMPLES {
            return SessionOutcome::Pending;
        }

        let spread = self.spread();
        let settled = spread.heart_rate_std_dev <= Self::HEART_RATE_TOLERANCE
            && spread.spo2_std_dev <= Self::SPO2_TOLERANCE;

        if settled || self.samples.len() >= Self::MAX_SAMPLES {
            SessionOutcome::Accepted(self.finalize(&spread, false))
        } else {
            SessionOutcome::Pending
        }
    }

    /// Checks the session timeout. A timed out session with at least one
    /// admitted sample still yields a (discounted) result.
    pub fn poll(&self, now_ms: u64) -> SessionOutcome {
        if now_ms.saturating_sub(self.started_at_ms) < Self::SESSION_TIMEOUT_MS {
            return SessionOutcome::Pending;
        }

        if self.samples.is_empty() {
            SessionOutcome::Failed(SessionFailure::Timeout)
        } else {
            SessionOutcome::Accepted(self.finalize(&self.spread(), true))
        }
    }

    /// Base 0.7, up to +0.2 for sample count, up to -0.2 for dispersion,
    /// clamped to `[0.5, 0.99]`.
    pub fn confidence(samples: usize, heart_rate_std_dev: f64, spo2_std_dev: f64) -> f64 {
        let bonus = 0.2 * samples as f64 / Self::MAX_SAMPLES as f64;
        let dispersion = ((heart_rate_std_dev / Self::HEART_RATE_TOLERANCE).min(1.0)
            + (spo2_std_dev / Self::SPO2_TOLERANCE).min(1.0))
            / 2.0;

        (0.7 + bonus - 0.2 * dispersion).clamp(0.5, 0.99)
    }

    fn spread(&self) -> Spread {
        let heart_rates: Vec<f64> = self.samples.iter().map(|s| f64::from(s.heart_rate)).collect();
        let spo2s: Vec<f64> = self.samples.iter().map(|s| f64::from(s.spo2)).collect();

        let heart_rate_mean = mean(&heart_rates);
        let spo2_mean = mean(&spo2s);

        Spread {
            heart_rate_mean,
            spo2_mean,
            heart_rate_std_dev: std_dev(&heart_rates, heart_rate_mean),
            spo2_std_dev: std_dev(&spo2s, spo2_mean),
        }
    }

    fn finalize(&self, spread: &Spread, partial: bool) -> Acceptance {
        let mut confidence = Self::confidence(
            self.samples.len(),
            spread.heart_rate_std_dev,
            spread.spo2_std_dev,
        );
        if partial {
            confidence *= Self::PARTIAL_DISCOUNT;
        }

        Acceptance {
            heart_rate: spread.heart_rate_mean as f32,
            spo2: spread.spo2_mean as f32,
            confidence: confidence as f32,
            samples: self.samples.len(),
            partial,
        }
    }
}
