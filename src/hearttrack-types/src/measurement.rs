/// Seconds since the Unix epoch. Zero is reserved for "no timestamp".
pub type Timestamp = u32;

/// 2024-01-01. A synchronised clock never reads earlier, so smaller
/// timestamps are seconds of uptime taken before the clock was set.
pub const WALL_CLOCK_EPOCH: Timestamp = 1_704_067_200;

pub fn is_wall_clock(timestamp: Timestamp) -> bool {
    timestamp >= WALL_CLOCK_EPOCH
}

/// One output of the acquisition primitive, before any acceptance policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub heart_rate: f32,
    pub spo2: f32,
    pub heart_rate_valid: bool,
    pub spo2_valid: bool,
}

impl RawReading {
    pub fn valid(heart_rate: f32, spo2: f32) -> Self {
        Self {
            heart_rate,
            spo2,
            heart_rate_valid: true,
            spo2_valid: true,
        }
    }
}

/// A reading admitted into an acquisition session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateSample {
    pub heart_rate: f32,
    pub spo2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementResult {
    pub heart_rate: f32,
    pub spo2: f32,
    pub taken_at: Timestamp,
    pub accepted: bool,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    /// Finalized from fewer samples than a full session on timeout.
    pub partial: bool,
}

/// One slot of the durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResult {
    pub heart_rate: f32,
    pub spo2: f32,
    pub taken_at: Timestamp,
    pub delivered: bool,
}

impl QueuedResult {
    pub const EMPTY: Self = Self {
        heart_rate: 0.0,
        spo2: 0.0,
        taken_at: 0,
        delivered: false,
    };

    pub fn is_empty(&self) -> bool {
        self.taken_at == 0
    }

    /// Holds a result that still has to be delivered.
    pub fn is_pending(&self) -> bool {
        !self.is_empty() && !self.delivered
    }

    /// Slot can be overwritten without losing undelivered data.
    pub fn is_free(&self) -> bool {
        !self.is_pending()
    }
}

impl From<&MeasurementResult> for QueuedResult {
    fn from(result: &MeasurementResult) -> Self {
        Self {
            heart_rate: result.heart_rate,
            spo2: result.spo2,
            taken_at: result.taken_at,
            delivered: false,
        }
    }
}
