use hearttrack_algos::{ActiveWindow, SampleAcceptor, SessionFailure, SessionOutcome};
use hearttrack_codec::RemoteConfig;
use hearttrack_types::{DeviceState, MeasurementResult, ScheduleConfig, TimeOfDay, Timestamp};

use crate::{Acquisition, Clock, ControllerOptions, DeviceEvent, Scheduler};

/// Work the state machine hands to the transmission pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    None,
    NotifyUserTimeout(Timestamp),
    Transmit(MeasurementResult),
}

/// Single authority over [`DeviceState`] and the scheduling policy.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: DeviceState,
    config: ScheduleConfig,
    scheduler: Scheduler,
    retries: u32,
    max_retries: u32,
    engagement_timeout_ms: u64,
    countdown_log_ms: u64,
    state_entered_ms: u64,
    last_countdown_ms: Option<u64>,
    session: Option<SampleAcceptor>,
}

impl StateMachine {
    pub fn new(config: ScheduleConfig, options: &ControllerOptions, now: u64) -> Self {
        let first_delay = options
            .first_measurement_delay_ms
            .unwrap_or(u64::from(config.interval_ms));
        info!(
            "Active window: {} - {}, next measurement in {} seconds",
            config.active_window_start,
            config.active_window_end,
            first_delay / 1000
        );

        Self {
            state: DeviceState::Idle,
            config,
            scheduler: Scheduler::new(now + first_delay),
            retries: 0,
            max_retries: options.max_session_retries,
            engagement_timeout_ms: options.engagement_timeout_ms,
            countdown_log_ms: options.countdown_log_ms,
            state_entered_ms: now,
            last_countdown_ms: None,
            session: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn step<C: Clock, A: Acquisition>(
        &mut self,
        now: u64,
        clock: &C,
        sensor: &mut A,
        events: &mut Vec<DeviceEvent>,
    ) -> Action {
        match self.state {
            state if state.is_measuring() => self.step_session(now, clock, sensor, events),
            DeviceState::Idle => self.step_idle(now, clock, events),
            DeviceState::AwaitingEngagement => self.step_awaiting(now, clock, sensor, events),
            // waits for the pipeline
            _ => Action::None,
        }
    }

    /// The pipeline finished with the result, whether sent or queued.
    pub fn transmission_finished(&mut self, now: u64, events: &mut Vec<DeviceEvent>) {
        if self.state == DeviceState::Transmitting {
            self.finish_cycle(now, events);
        }
    }

    /// Merges a fetched configuration field by field. Out-of-range or
    /// malformed values keep the previous value. Returns the new timezone
    /// offset when it changed.
    pub fn apply_configuration(&mut self, remote: &RemoteConfig, now: u64) -> Option<f32> {
        if remote.is_empty() {
            debug!("Configuration response carried no settings");
        }
        for field in &remote.malformed {
            warn!("Ignoring malformed {} in configuration", field);
        }

        if let Some(seconds) = remote.frequency_seconds {
            let interval_ms = u32::try_from(seconds)
                .ok()
                .and_then(|seconds| seconds.checked_mul(1000))
                .filter(|&ms| ScheduleConfig::interval_in_range(ms));
            match interval_ms {
                Some(ms) => self.config.interval_ms = ms,
                None => warn!("Invalid frequency {} seconds - ignoring", seconds),
            }
        }

        if let Some(text) = &remote.start_time {
            self.config.active_window_start = parse_time(text, "start");
        }
        if let Some(text) = &remote.end_time {
            self.config.active_window_end = parse_time(text, "end");
        }

        let mut zone_changed = None;
        if let Some(offset) = remote.timezone_offset {
            let offset = offset as f32;
            if !ScheduleConfig::timezone_in_range(offset) {
                warn!("Invalid timezone offset {} - ignoring", offset);
            } else if offset != self.config.timezone_offset_hours {
                self.config.timezone_offset_hours = offset;
                zone_changed = Some(offset);
            }
        }

        self.config.source_is_remote = true;
        self.scheduler.apply_interval(now, &self.config);
        info!("Configuration updated from server:\n{}", self.config);

        zone_changed
    }

    fn step_idle<C: Clock>(&mut self, now: u64, clock: &C, events: &mut Vec<DeviceEvent>) -> Action {
        self.log_countdown(now, clock);
        if !self.scheduler.due(now) {
            return Action::None;
        }

        let local = clock.local().map(|t| t.time());
        if !ActiveWindow::from(&self.config).contains_local(local) {
            info!("Outside active window - skipping measurement");
            self.scheduler
                .schedule_for_window_open(now, &self.config, local);
            return Action::None;
        }

        self.retries = 0;
        self.transition(DeviceState::AwaitingEngagement, now, events);
        Action::None
    }

    fn step_awaiting<C: Clock, A: Acquisition>(
        &mut self,
        now: u64,
        clock: &C,
        sensor: &mut A,
        events: &mut Vec<DeviceEvent>,
    ) -> Action {
        if sensor.presence() {
            sensor.start();
            self.session = Some(SampleAcceptor::new(now));
            self.transition(DeviceState::Acquiring, now, events);
            return Action::None;
        }

        if now.saturating_sub(self.state_entered_ms) < self.engagement_timeout_ms {
            return Action::None;
        }

        info!("User timeout - skipping measurement");
        events.push(DeviceEvent::UserTimeout);
        self.finish_cycle(now, events);
        Action::NotifyUserTimeout(clock.timestamp_or_uptime())
    }

    fn step_session<C: Clock, A: Acquisition>(
        &mut self,
        now: u64,
        clock: &C,
        sensor: &mut A,
        events: &mut Vec<DeviceEvent>,
    ) -> Action {
        let mut session = self
            .session
            .take()
            .unwrap_or_else(|| SampleAcceptor::new(now));

        let mut outcome = SessionOutcome::Pending;
        if !sensor.presence() {
            outcome = SessionOutcome::Failed(SessionFailure::PresenceLost);
        } else if let Some(reading) = sensor.measure() {
            let rejected = session.rejected();
            outcome = session.offer(reading);
            if session.rejected() > rejected {
                debug!(
                    "Rejected reading: HR {:.1} ({}), SpO2 {:.1} ({})",
                    reading.heart_rate,
                    reading.heart_rate_valid,
                    reading.spo2,
                    reading.spo2_valid
                );
            } else {
                debug!(
                    "Sample {}/{}: HR {:.1} bpm, SpO2 {:.1}%",
                    session.samples().len(),
                    SampleAcceptor::MAX_SAMPLES,
                    reading.heart_rate,
                    reading.spo2
                );
            }

            if self.state == DeviceState::Acquiring {
                self.transition(DeviceState::Stabilizing, now, events);
            }
        }

        if outcome == SessionOutcome::Pending {
            outcome = session.poll(now);
        }

        match outcome {
            SessionOutcome::Pending => {
                self.session = Some(session);
                Action::None
            }
            SessionOutcome::Accepted(acceptance) => {
                sensor.stop();
                let result = acceptance.into_result(clock.timestamp_or_uptime());
                info!(
                    "Measurement accepted: HR {:.1} bpm, SpO2 {:.1}%, confidence {:.2} from {} samples{}",
                    result.heart_rate,
                    result.spo2,
                    result.confidence,
                    acceptance.samples,
                    if acceptance.partial { " (partial)" } else { "" }
                );
                self.transition(DeviceState::Transmitting, now, events);
                Action::Transmit(result)
            }
            SessionOutcome::Failed(failure) => {
                sensor.stop();
                self.session_failed(failure, now, events);
                Action::None
            }
        }
    }

    fn session_failed(&mut self, failure: SessionFailure, now: u64, events: &mut Vec<DeviceEvent>) {
        if self.retries < self.max_retries {
            self.retries += 1;
            info!(
                "Measurement failed ({:?}) - retry {}/{}",
                failure, self.retries, self.max_retries
            );
            self.transition(DeviceState::AwaitingEngagement, now, events);
        } else {
            info!("Measurement failed ({:?}) - max retries reached, skipping", failure);
            self.finish_cycle(now, events);
        }
    }

    fn finish_cycle(&mut self, now: u64, events: &mut Vec<DeviceEvent>) {
        self.retries = 0;
        self.session = None;
        self.scheduler.schedule_next(now, &self.config);
        self.transition(DeviceState::Idle, now, events);
    }

    fn transition(&mut self, to: DeviceState, now: u64, events: &mut Vec<DeviceEvent>) {
        let from = self.state;
        if from == to {
            return;
        }

        self.state = to;
        self.state_entered_ms = now;
        info!("State: {} -> {}", from, to);
        events.push(DeviceEvent::StateChanged { from, to });

        match to {
            DeviceState::Idle => {
                self.last_countdown_ms = None;
            }
            DeviceState::AwaitingEngagement => info!(">>> Place finger on sensor <<<"),
            _ => {}
        }
    }

    fn log_countdown<C: Clock>(&mut self, now: u64, clock: &C) {
        if self
            .last_countdown_ms
            .is_some_and(|last| now.saturating_sub(last) < self.countdown_log_ms)
        {
            return;
        }
        self.last_countdown_ms = Some(now);

        let seconds = self.scheduler.remaining_ms(now) / 1000;
        debug!(
            "Next measurement in {} seconds ({}:{:02})",
            seconds,
            seconds / 60,
            seconds % 60
        );
        if let Some(local) = clock.local() {
            let active = ActiveWindow::from(&self.config).contains(local.time().into());
            debug!(
                "Current time: {}, Active: {}",
                local.format("%H:%M"),
                if active { "YES" } else { "NO" }
            );
        }
    }
}

/// Unparsable times degrade to midnight.
fn parse_time(text: &str, which: &str) -> TimeOfDay {
    text.parse().unwrap_or_else(|error| {
        warn!("{}, using {} time {}", error, which, TimeOfDay::MIDNIGHT);
        TimeOfDay::MIDNIGHT
    })
}
