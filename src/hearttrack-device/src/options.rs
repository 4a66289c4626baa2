/// Runtime tunables of the controller. All durations are monotonic
/// milliseconds unless the name says otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// How long to wait for the subject to engage before giving up on a cycle.
    pub engagement_timeout_ms: u64,
    pub max_session_retries: u32,
    pub queue_capacity: usize,
    /// Reattempts after the first failed live delivery.
    pub send_retries: u32,
    /// Attempt `k` waits `k` units before resending.
    pub backoff_unit_ms: u64,
    /// Upper bound on waiting for any single response.
    pub response_timeout_ms: u64,
    pub connectivity_poll_ms: u64,
    pub housekeeping_interval_ms: u64,
    pub retention_secs: u32,
    pub config_fetch_interval_ms: u64,
    pub initial_config_fetch_ms: u64,
    pub config_fetch_early_retries: u32,
    pub config_fetch_retry_ms: u64,
    pub countdown_log_ms: u64,
    /// Delay before the first scheduled measurement. `None` waits one full
    /// interval.
    pub first_measurement_delay_ms: Option<u64>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            engagement_timeout_ms: 300_000,
            max_session_retries: 3,
            queue_capacity: 96,
            send_retries: 3,
            backoff_unit_ms: 1_000,
            response_timeout_ms: 15_000,
            connectivity_poll_ms: 5_000,
            housekeeping_interval_ms: 3_600_000,
            retention_secs: 24 * 60 * 60,
            config_fetch_interval_ms: 3_600_000,
            initial_config_fetch_ms: 10_000,
            config_fetch_early_retries: 3,
            config_fetch_retry_ms: 30_000,
            countdown_log_ms: 10_000,
            first_measurement_delay_ms: None,
        }
    }
}
