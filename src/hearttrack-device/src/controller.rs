use hearttrack_codec::RemoteConfig;
use hearttrack_types::{DeviceState, ScheduleConfig, StatusPattern};

use crate::{
    Acquisition, Action, BootError, Clock, ConfigStore, ControllerOptions, DeviceEvent,
    DurableQueue, StateMachine, Storage, TransmissionPipeline, Transport,
};

/// Owns every component and collaborator; [`tick`](Self::tick) is the only
/// place anything happens.
pub struct Controller<C, A, T, S> {
    clock: C,
    sensor: A,
    transport: T,
    storage: S,
    machine: StateMachine,
    pipeline: TransmissionPipeline,
    events: Vec<DeviceEvent>,
}

impl<C, A, T, S> Controller<C, A, T, S>
where
    C: Clock,
    A: Acquisition,
    T: Transport,
    S: Storage,
{
    /// Probes the sensor and restores persisted state. A missing sensor is
    /// the only condition the device cannot run without.
    pub fn boot(
        device_id: impl Into<String>,
        options: ControllerOptions,
        mut clock: C,
        mut sensor: A,
        transport: T,
        storage: S,
    ) -> Result<Self, BootError> {
        if !sensor.probe() {
            error!("Heart rate sensor not found");
            return Err(BootError::SensorNotFound);
        }

        let config = ConfigStore::load(&storage)?;
        clock.apply_zone(config.timezone_offset_hours);
        let queue = DurableQueue::load(&storage, options.queue_capacity)?;

        let now = clock.monotonic_ms();
        let machine = StateMachine::new(config, &options, now);
        let pipeline = TransmissionPipeline::new(device_id, options, queue, now);

        Ok(Self {
            clock,
            sensor,
            transport,
            storage,
            machine,
            pipeline,
            events: Vec::new(),
        })
    }

    pub fn tick(&mut self) {
        let now = self.clock.monotonic_ms();

        let fetched = self.pipeline.service(
            now,
            &self.clock,
            &mut self.transport,
            &mut self.storage,
            &mut self.events,
        );
        if let Some(remote) = fetched {
            self.merge_configuration(&remote, now);
        }

        match self
            .machine
            .step(now, &self.clock, &mut self.sensor, &mut self.events)
        {
            Action::None => {}
            Action::NotifyUserTimeout(at) => {
                self.pipeline
                    .notify_user_timeout(at, now, &mut self.transport);
            }
            Action::Transmit(result) => self.pipeline.transmit(
                result,
                now,
                &mut self.transport,
                &mut self.storage,
                &mut self.events,
            ),
        }

        if self.pipeline.take_finished().is_some() {
            self.machine.transmission_finished(now, &mut self.events);
        }
    }

    pub fn state(&self) -> DeviceState {
        self.machine.state()
    }

    pub fn status_pattern(&self) -> StatusPattern {
        self.machine.state().into()
    }

    pub fn config(&self) -> &ScheduleConfig {
        self.machine.config()
    }

    pub fn queue(&self) -> &DurableQueue {
        self.pipeline.queue()
    }

    /// Events since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events)
    }

    fn merge_configuration(&mut self, remote: &RemoteConfig, now: u64) {
        if let Some(offset) = self.machine.apply_configuration(remote, now) {
            info!("Timezone offset now {:+.1} h", offset);
            self.clock.apply_zone(offset);
        }

        let config = *self.machine.config();
        if let Err(error) = ConfigStore::save(&mut self.storage, &config) {
            error!("Failed to persist configuration: {}", error);
        }
        self.events.push(DeviceEvent::ConfigApplied(config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Request,
        testing::{FakeClock, FakeSensor, FakeTransport, SharedStorage, base_time},
    };
    use hearttrack_codec::{ConfigRecord, layout::CONFIG_REGION_OFFSET};
    use hearttrack_types::{MeasurementResult, TimeOfDay, Timestamp};

    type TestController = Controller<FakeClock, FakeSensor, FakeTransport, SharedStorage>;

    struct Rig {
        controller: TestController,
        clock: FakeClock,
        sensor: FakeSensor,
        transport: FakeTransport,
        storage: SharedStorage,
    }

    impl Rig {
        fn boot(transport: FakeTransport, storage: SharedStorage) -> Self {
            let options = ControllerOptions {
                first_measurement_delay_ms: Some(0),
                ..ControllerOptions::default()
            };
            Self::boot_with(options, FakeClock::synced(base_time()), transport, storage)
        }

        fn boot_with(
            options: ControllerOptions,
            clock: FakeClock,
            transport: FakeTransport,
            storage: SharedStorage,
        ) -> Self {
            let sensor = FakeSensor::new();
            let controller = Controller::boot(
                "dev-1",
                options,
                clock.clone(),
                sensor.clone(),
                transport.clone(),
                storage.clone(),
            )
            .unwrap();

            Self {
                controller,
                clock,
                sensor,
                transport,
                storage,
            }
        }

        fn advance(&mut self, ms: u64) {
            self.clock.advance(ms);
            self.controller.tick();
        }

        /// Runs one full cycle from the scheduled fire time to a finished
        /// transmission attempt.
        fn measure(&mut self, heart_rate: f32) {
            self.advance(0);
            assert_eq!(self.controller.state(), DeviceState::AwaitingEngagement);
            self.sensor.engage(true);
            self.advance(100);
            for _ in 0..3 {
                self.sensor.push(heart_rate, 98.0);
                self.advance(1_000);
            }
            self.sensor.engage(false);
        }

        fn pending(&self) -> usize {
            self.controller.queue().pending_count()
        }
    }

    #[test]
    fn missing_sensor_is_fatal() {
        let result = Controller::boot(
            "dev-1",
            ControllerOptions::default(),
            FakeClock::synced(base_time()),
            FakeSensor::missing(),
            FakeTransport::online(),
            SharedStorage::new(),
        );
        assert!(matches!(result, Err(BootError::SensorNotFound)));
    }

    #[test]
    fn offline_results_are_stored_then_drained_one_per_tick() {
        let mut rig = Rig::boot(FakeTransport::offline(), SharedStorage::new());

        rig.measure(70.0);
        assert_eq!(rig.controller.state(), DeviceState::Idle);
        rig.advance(900_000);
        rig.measure(80.0);
        rig.advance(900_000);
        rig.measure(90.0);

        assert_eq!(rig.pending(), 3);
        assert!(rig.transport.submissions().is_empty());
        let events = rig.controller.take_events();
        let stored = events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Stored { .. }))
            .count();
        assert_eq!(stored, 3);

        rig.transport.set_connected(true);
        rig.transport.auto_reply(Some(201));

        // first tick only aligns the drain timer
        rig.advance(5_000);
        let mut pending = vec![rig.pending()];
        for _ in 0..5 {
            rig.advance(5_000);
            pending.push(rig.pending());
        }
        assert!(pending.windows(2).all(|w| w[0] - w[1] <= 1));
        assert_eq!(pending.last(), Some(&0));

        let heart_rates: Vec<_> = rig
            .transport
            .submissions()
            .iter()
            .filter_map(|body| body["heartRate"].as_f64())
            .collect();
        assert_eq!(heart_rates, vec![70.0, 80.0, 90.0]);
    }

    #[test]
    fn online_results_are_delivered_live() {
        let transport = FakeTransport::online();
        transport.auto_reply(Some(201));
        let mut rig = Rig::boot(transport, SharedStorage::new());

        rig.measure(70.0);
        assert_eq!(rig.controller.state(), DeviceState::Transmitting);
        rig.advance(100);

        assert_eq!(rig.controller.state(), DeviceState::Idle);
        assert_eq!(rig.pending(), 0);
        let events = rig.controller.take_events();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, DeviceEvent::Delivered { .. }))
        );
        assert_eq!(rig.controller.status_pattern(), StatusPattern::Off);
    }

    #[test]
    fn fetched_configuration_is_merged_and_persisted() {
        let mut rig = Rig::boot(FakeTransport::online(), SharedStorage::new());
        rig.advance(10_000);

        let fetch = rig
            .transport
            .posted()
            .into_iter()
            .find(|(_, r)| *r == Request::FetchConfig)
            .map(|(id, _)| id)
            .unwrap();
        rig.transport.reply(
            fetch,
            200,
            br#"{"success":true,"data":{"config":{"measurementFrequency":1800,"activeStartTime":"06:30","activeEndTime":"","timezoneOffset":-7}}}"#,
        );
        rig.advance(100);

        let config = *rig.controller.config();
        assert_eq!(config.interval_ms, 1_800_000);
        assert_eq!(config.active_window_start.to_string(), "06:30");
        assert_eq!(config.active_window_end, ScheduleConfig::DEFAULT_WINDOW_END);
        assert_eq!(config.timezone_offset_hours, -7.0);
        assert!(config.source_is_remote);

        assert_eq!(rig.clock.zone_applications(), vec![0.0, -7.0]);
        assert_eq!(ConfigStore::load(&rig.storage).unwrap(), config);
        assert!(
            rig.controller
                .take_events()
                .contains(&DeviceEvent::ConfigApplied(config))
        );
    }

    #[test]
    fn boot_restores_persisted_state_per_region() {
        let mut storage = SharedStorage::new();
        let mut queue = DurableQueue::new(96);
        let result = MeasurementResult {
            heart_rate: 66.0,
            spo2: 97.0,
            taken_at: base_time().timestamp() as Timestamp - 60,
            accepted: true,
            confidence: 0.9,
            partial: false,
        };
        queue.enqueue(&result, &mut storage);

        // valid marker, interval far out of range
        let mut record = ConfigRecord::encode(&ScheduleConfig {
            timezone_offset_hours: 3.0,
            ..ScheduleConfig::default()
        });
        record[2..6].copy_from_slice(&1u32.to_le_bytes());
        storage.write(CONFIG_REGION_OFFSET, &record).unwrap();

        let rig = Rig::boot(FakeTransport::offline(), storage);
        assert_eq!(rig.controller.config().interval_ms, ScheduleConfig::DEFAULT_INTERVAL_MS);
        assert_eq!(rig.controller.config().timezone_offset_hours, 3.0);
        assert_eq!(rig.clock.zone_applications(), vec![3.0]);
        assert_eq!(rig.pending(), 1);
    }

    #[test]
    fn hourly_configuration_does_not_starve_long_intervals() {
        let mut storage = SharedStorage::new();
        let config = ScheduleConfig {
            interval_ms: 7_200_000,
            active_window_start: TimeOfDay::MIDNIGHT,
            active_window_end: TimeOfDay::MIDNIGHT,
            ..ScheduleConfig::default()
        };
        ConfigStore::save(&mut storage, &config).unwrap();

        let transport = FakeTransport::online();
        transport.auto_reply(Some(201));
        transport.serve_config(br#"{"measurementFrequency":7200}"#);
        let clock = FakeClock::synced(base_time());
        let mut rig = Rig::boot_with(ControllerOptions::default(), clock, transport, storage);

        let mut events = Vec::new();
        for _ in 0..3 * 3_600 {
            rig.advance(1_000);
            events.extend(rig.controller.take_events());
        }

        let merges = events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::ConfigApplied(_)))
            .count();
        assert_eq!(merges, 3);
        assert!(events.contains(&DeviceEvent::StateChanged {
            from: DeviceState::Idle,
            to: DeviceState::AwaitingEngagement,
        }));
    }

    #[test]
    fn result_stored_before_clock_sync_survives_housekeeping() {
        let options = ControllerOptions {
            first_measurement_delay_ms: Some(0),
            ..ControllerOptions::default()
        };
        let mut rig = Rig::boot_with(
            options,
            FakeClock::unsynced(),
            FakeTransport::offline(),
            SharedStorage::new(),
        );

        rig.measure(70.0);
        assert_eq!(
            rig.controller.queue().oldest_pending().map(|(_, e)| e.taken_at),
            Some(3)
        );

        rig.clock.sync(base_time());
        rig.advance(1_000);
        rig.advance(3_600_000);
        rig.advance(3_600_000);
        assert_eq!(rig.pending(), 1);

        rig.transport.set_connected(true);
        rig.transport.auto_reply(Some(201));
        rig.advance(5_000);
        rig.advance(5_000);

        let submissions = rig.transport.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0]["heartRate"], 70.0);
        assert_eq!(submissions[0]["timestamp"], "2025-01-06T12:00:00Z");
        assert_eq!(rig.pending(), 0);
    }

    #[test]
    fn engagement_timeout_notifies_when_online() {
        let mut rig = Rig::boot(FakeTransport::online(), SharedStorage::new());
        rig.advance(0);
        rig.advance(300_000);

        assert_eq!(rig.controller.state(), DeviceState::Idle);
        assert!(
            rig.transport
                .posted()
                .iter()
                .any(|(_, r)| matches!(r, Request::Notify(_)))
        );
        assert!(rig.controller.take_events().contains(&DeviceEvent::UserTimeout));
    }
}
