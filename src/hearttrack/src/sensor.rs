use std::time::{Duration, Instant};

use hearttrack_device::Acquisition;
use hearttrack_types::RawReading;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Stand-in for the optical sensor: a finger shows up at random, readings
/// arrive about once a second around a resting baseline with occasional
/// invalid or wild values.
pub struct SimulatedSensor {
    rng: StdRng,
    present: bool,
    engaged: bool,
    running: bool,
    next_reading_at: Instant,
    baseline_heart_rate: f32,
    baseline_spo2: f32,
}

impl SimulatedSensor {
    const READING_PERIOD: Duration = Duration::from_secs(1);
    /// Per presence check while nobody is engaged.
    const ENGAGE_PROBABILITY: f64 = 0.02;
    const RELEASE_PROBABILITY: f64 = 0.005;
    const INVALID_PROBABILITY: f64 = 0.1;

    pub fn new(present: bool) -> Self {
        Self::with_rng(present, StdRng::from_os_rng())
    }

    pub fn with_rng(present: bool, mut rng: StdRng) -> Self {
        let baseline_heart_rate = rng.random_range(58.0_f32..=85.0);
        let baseline_spo2 = rng.random_range(95.0_f32..=99.0);
        Self {
            rng,
            present,
            engaged: false,
            running: false,
            next_reading_at: Instant::now(),
            baseline_heart_rate,
            baseline_spo2,
        }
    }

    fn reading(&mut self) -> RawReading {
        let heart_rate = self.baseline_heart_rate + self.rng.random_range(-4.0_f32..=4.0);
        let spo2 = (self.baseline_spo2 + self.rng.random_range(-1.5_f32..=1.5)).min(100.0);

        RawReading {
            heart_rate,
            spo2,
            heart_rate_valid: !self.rng.random_bool(Self::INVALID_PROBABILITY),
            spo2_valid: !self.rng.random_bool(Self::INVALID_PROBABILITY),
        }
    }
}

impl Acquisition for SimulatedSensor {
    fn probe(&mut self) -> bool {
        self.present
    }

    fn presence(&mut self) -> bool {
        if self.engaged {
            if self.rng.random_bool(Self::RELEASE_PROBABILITY) {
                info!("Finger removed");
                self.engaged = false;
            }
        } else if self.rng.random_bool(Self::ENGAGE_PROBABILITY) {
            info!("Finger detected");
            self.engaged = true;
        }
        self.engaged
    }

    fn start(&mut self) {
        self.running = true;
        self.next_reading_at = Instant::now() + Self::READING_PERIOD;
    }

    fn measure(&mut self) -> Option<RawReading> {
        if !self.running || Instant::now() < self.next_reading_at {
            return None;
        }
        self.next_reading_at += Self::READING_PERIOD;
        Some(self.reading())
    }

    fn stop(&mut self) {
        self.running = false;
        self.engaged = false;
    }
}
