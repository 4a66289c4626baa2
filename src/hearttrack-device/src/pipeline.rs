use hearttrack_codec::{MeasurementPayload, NotificationPayload, RemoteConfig};
use hearttrack_types::{MeasurementResult, QueuedResult, Timestamp, is_wall_clock};

use crate::{
    Clock, ControllerOptions, DeviceEvent, DurableQueue, Request, RequestId, Response, Storage,
    Transport, TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    Delivered,
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    id: RequestId,
    posted_at: u64,
}

impl InFlight {
    fn expired(&self, now: u64, timeout_ms: u64) -> bool {
        now.saturating_sub(self.posted_at) >= timeout_ms
    }
}

#[derive(Debug, Clone, Copy)]
enum LivePhase {
    InFlight(InFlight),
    Backoff { resume_at: u64 },
}

/// The one result currently being delivered live.
#[derive(Debug, Clone)]
struct LiveSend {
    result: MeasurementResult,
    body: Vec<u8>,
    attempts: u32,
    phase: LivePhase,
}

impl LiveSend {
    fn in_flight(&self) -> Option<InFlight> {
        match self.phase {
            LivePhase::InFlight(request) => Some(request),
            LivePhase::Backoff { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Replay {
    request: InFlight,
    slot: usize,
    entry: QueuedResult,
}

#[derive(Debug, Clone, Copy)]
struct ConfigFetch {
    next_at: u64,
    in_flight: Option<InFlight>,
    early_retries_left: u32,
}

/// Gets results to the collector: live delivery with bounded backoff,
/// falling back to the [`DurableQueue`], which is drained one entry per
/// connectivity tick. Also owns the remote configuration fetch timer.
#[derive(Debug)]
pub struct TransmissionPipeline {
    device_id: String,
    options: ControllerOptions,
    queue: DurableQueue,
    live: Option<LiveSend>,
    finished: Option<TransmitOutcome>,
    replay: Option<Replay>,
    config_fetch: ConfigFetch,
    notifications: Vec<InFlight>,
    /// Slots stored this boot with an uptime stamp, restamped once the
    /// clock is synchronised.
    unsynced: Vec<(usize, Timestamp)>,
    next_drain_at: u64,
    next_housekeeping_at: u64,
}

impl TransmissionPipeline {
    pub fn new(
        device_id: impl Into<String>,
        options: ControllerOptions,
        queue: DurableQueue,
        now: u64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            queue,
            live: None,
            finished: None,
            replay: None,
            config_fetch: ConfigFetch {
                next_at: now + options.initial_config_fetch_ms,
                in_flight: None,
                early_retries_left: options.config_fetch_early_retries,
            },
            notifications: Vec::new(),
            unsynced: Vec::new(),
            next_drain_at: now + options.connectivity_poll_ms,
            next_housekeeping_at: now,
            options,
        }
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    /// Outcome of the last [`transmit`](Self::transmit), once known.
    pub fn take_finished(&mut self) -> Option<TransmitOutcome> {
        self.finished.take()
    }

    /// Starts delivering `result`. Offline results go straight to the queue;
    /// otherwise the outcome is reported through
    /// [`take_finished`](Self::take_finished) on a later tick.
    pub fn transmit<T: Transport, S: Storage>(
        &mut self,
        result: MeasurementResult,
        now: u64,
        transport: &mut T,
        storage: &mut S,
        events: &mut Vec<DeviceEvent>,
    ) {
        let live = LiveSend {
            result,
            body: Vec::new(),
            attempts: 0,
            phase: LivePhase::Backoff { resume_at: now },
        };

        match MeasurementPayload::from_result(&self.device_id, &result).to_bytes() {
            Ok(body) => self.live = Some(LiveSend { body, ..live }),
            Err(error) => {
                error!("Failed to encode measurement, storing it: {}", error);
                self.live = Some(live);
                self.store_live(storage, events);
                return;
            }
        }

        if !transport.is_connected() {
            info!("Offline, storing result for later");
            self.store_live(storage, events);
            return;
        }
        self.send_live(now, transport, storage, events);
    }

    /// Fire and forget. Nothing is queued when offline.
    pub fn notify_user_timeout<T: Transport>(&mut self, at: Timestamp, now: u64, transport: &mut T) {
        if !transport.is_connected() {
            info!("Offline, user timeout notification dropped");
            return;
        }

        match NotificationPayload::user_timeout(&self.device_id, at).to_bytes() {
            Ok(body) => {
                let id = transport.post(Request::Notify(body));
                self.notifications.push(InFlight { id, posted_at: now });
            }
            Err(error) => error!("Failed to encode notification: {}", error),
        }
    }

    /// Periodic work for one tick: routes responses, resumes backoff,
    /// drains, runs housekeeping and the config timer. Returns a freshly
    /// fetched configuration for the caller to merge.
    pub fn service<C: Clock, T: Transport, S: Storage>(
        &mut self,
        now: u64,
        clock: &C,
        transport: &mut T,
        storage: &mut S,
        events: &mut Vec<DeviceEvent>,
    ) -> Option<RemoteConfig> {
        let mut fetched = None;
        while let Some(response) = transport.poll() {
            if let Some(config) = self.route(response, now, storage, events) {
                fetched = Some(config);
            }
        }

        self.expire_requests(now, storage, events);

        if let Some(LiveSend {
            phase: LivePhase::Backoff { resume_at },
            ..
        }) = self.live
        {
            if now >= resume_at {
                self.send_live(now, transport, storage, events);
            }
        }

        if !self.unsynced.is_empty() {
            self.restamp_unsynced(clock, storage);
        }

        if now >= self.next_drain_at {
            self.next_drain_at = now + self.options.connectivity_poll_ms;
            self.drain(now, transport);
        }

        if now >= self.next_housekeeping_at {
            self.next_housekeeping_at = now + self.options.housekeeping_interval_ms;
            self.housekeeping(clock, storage);
        }

        self.fetch_config(now, transport);

        fetched
    }

    fn route<S: Storage>(
        &mut self,
        response: Response,
        now: u64,
        storage: &mut S,
        events: &mut Vec<DeviceEvent>,
    ) -> Option<RemoteConfig> {
        let id = response.id;

        if self
            .live
            .as_ref()
            .and_then(LiveSend::in_flight)
            .is_some_and(|request| request.id == id)
        {
            match response.into_success() {
                Ok(_) => self.live_delivered(events),
                Err(error) => self.live_failed(error, now, storage, events),
            }
        } else if self.replay.is_some_and(|replay| replay.request.id == id) {
            self.replay_finished(response, storage, events);
        } else if self
            .config_fetch
            .in_flight
            .is_some_and(|request| request.id == id)
        {
            return self.config_received(response, now);
        } else if let Some(index) = self.notifications.iter().position(|n| n.id == id) {
            self.notifications.swap_remove(index);
            match response.into_success() {
                Ok(_) => debug!("Notification sent"),
                Err(error) => warn!("Notification failed: {}", error),
            }
        } else {
            debug!("Ignoring response to unknown request {:?}", id);
        }
        None
    }

    fn send_live<T: Transport, S: Storage>(
        &mut self,
        now: u64,
        transport: &mut T,
        storage: &mut S,
        events: &mut Vec<DeviceEvent>,
    ) {
        if !transport.is_connected() {
            info!("Connection lost before resend, storing result");
            self.store_live(storage, events);
            return;
        }

        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.attempts += 1;
        let id = transport.post(Request::SubmitMeasurement(live.body.clone()));
        live.phase = LivePhase::InFlight(InFlight { id, posted_at: now });
        info!(
            "Sending measurement (attempt {}/{})",
            live.attempts,
            self.options.send_retries + 1
        );
    }

    fn live_delivered(&mut self, events: &mut Vec<DeviceEvent>) {
        let Some(live) = self.live.take() else {
            return;
        };
        info!("Measurement delivered");
        events.push(DeviceEvent::Delivered {
            taken_at: live.result.taken_at,
        });
        self.finished = Some(TransmitOutcome::Delivered);
    }

    /// Attempt `k` waits `k` backoff units before the next one.
    fn live_failed<S: Storage>(
        &mut self,
        error: TransportError,
        now: u64,
        storage: &mut S,
        events: &mut Vec<DeviceEvent>,
    ) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        warn!("Send attempt {} failed: {}", live.attempts, error);

        if live.attempts > self.options.send_retries {
            events.push(DeviceEvent::SendFailed {
                attempts: live.attempts,
            });
            self.store_live(storage, events);
        } else {
            let delay = u64::from(live.attempts) * self.options.backoff_unit_ms;
            debug!("Retrying in {} ms", delay);
            live.phase = LivePhase::Backoff {
                resume_at: now + delay,
            };
        }
    }

    fn store_live<S: Storage>(&mut self, storage: &mut S, events: &mut Vec<DeviceEvent>) {
        let Some(live) = self.live.take() else {
            return;
        };
        if let Some(enqueued) = self.queue.enqueue(&live.result, storage) {
            if !is_wall_clock(live.result.taken_at) {
                self.unsynced.push((enqueued.slot, live.result.taken_at));
            }
            events.push(DeviceEvent::Stored {
                taken_at: live.result.taken_at,
                evicted: enqueued.evicted.map(|entry| entry.taken_at),
            });
        }
        self.finished = Some(TransmitOutcome::Queued);
    }

    /// Replays the oldest pending entry. At most one replay is in flight
    /// and live delivery takes precedence.
    fn drain<T: Transport>(&mut self, now: u64, transport: &mut T) {
        if self.replay.is_some() || self.live.is_some() || !transport.is_connected() {
            return;
        }
        let Some((slot, entry)) = self.queue.oldest_pending() else {
            return;
        };

        match MeasurementPayload::replay(&self.device_id, &entry).to_bytes() {
            Ok(body) => {
                let id = transport.post(Request::SubmitMeasurement(body));
                debug!("Replaying result taken at {}", entry.taken_at);
                self.replay = Some(Replay {
                    request: InFlight { id, posted_at: now },
                    slot,
                    entry,
                });
            }
            Err(error) => error!("Failed to encode queued result: {}", error),
        }
    }

    fn replay_finished<S: Storage>(
        &mut self,
        response: Response,
        storage: &mut S,
        events: &mut Vec<DeviceEvent>,
    ) {
        let Some(replay) = self.replay.take() else {
            return;
        };

        match response.into_success() {
            Ok(_) => {
                if self.queue.mark_delivered(replay.slot, &replay.entry, storage) {
                    let remaining = self.queue.pending_count();
                    info!("Synced ({} remaining)", remaining);
                    events.push(DeviceEvent::Replayed {
                        taken_at: replay.entry.taken_at,
                        remaining,
                    });
                }
            }
            Err(error) => warn!("Replay failed, will retry: {}", error),
        }
    }

    /// Uptime stamps become wall-clock time by subtracting their age from
    /// the synchronised clock. The replay in flight keeps its stamp until
    /// it finishes.
    fn restamp_unsynced<C: Clock, S: Storage>(&mut self, clock: &C, storage: &mut S) {
        let Some(now) = clock.unix_seconds() else {
            return;
        };
        let uptime = Timestamp::try_from(clock.monotonic_ms() / 1000).unwrap_or(Timestamp::MAX);
        let replaying = self.replay.map(|replay| replay.slot);

        self.unsynced.retain(|&(slot, stamp)| {
            if replaying == Some(slot) {
                return true;
            }
            let taken_at = now.saturating_sub(uptime.saturating_sub(stamp));
            if self.queue.restamp(slot, stamp, taken_at, storage) {
                info!("Result from {} s after boot restamped to {}", stamp, taken_at);
            }
            false
        });
    }

    fn housekeeping<C: Clock, S: Storage>(&mut self, clock: &C, storage: &mut S) {
        match clock.unix_seconds() {
            Some(now) => {
                self.queue
                    .purge_expired(now, self.options.retention_secs, storage);
            }
            None => debug!("Clock not synchronised, skipping queue housekeeping"),
        }
    }

    fn fetch_config<T: Transport>(&mut self, now: u64, transport: &mut T) {
        if self.config_fetch.in_flight.is_some() || now < self.config_fetch.next_at {
            return;
        }
        if !transport.is_connected() {
            debug!("Offline, configuration fetch postponed");
            self.config_fetch_done(now, false);
            return;
        }

        info!("Fetching configuration");
        let id = transport.post(Request::FetchConfig);
        self.config_fetch.in_flight = Some(InFlight { id, posted_at: now });
    }

    fn config_received(&mut self, response: Response, now: u64) -> Option<RemoteConfig> {
        let parsed = response
            .into_success()
            .map_err(|error| warn!("Configuration fetch failed: {}", error))
            .and_then(|reply| {
                RemoteConfig::parse(&reply.body)
                    .map_err(|error| warn!("Ignoring unparsable configuration: {}", error))
            })
            .ok();

        self.config_fetch_done(now, parsed.is_some());
        parsed
    }

    /// Early retries only apply until the first successful fetch.
    fn config_fetch_done(&mut self, now: u64, succeeded: bool) {
        let fetch = &mut self.config_fetch;
        fetch.in_flight = None;

        if succeeded {
            fetch.early_retries_left = 0;
            fetch.next_at = now + self.options.config_fetch_interval_ms;
        } else if fetch.early_retries_left > 0 {
            fetch.early_retries_left -= 1;
            fetch.next_at = now + self.options.config_fetch_retry_ms;
        } else {
            fetch.next_at = now + self.options.config_fetch_interval_ms;
        }
    }

    fn expire_requests<S: Storage>(
        &mut self,
        now: u64,
        storage: &mut S,
        events: &mut Vec<DeviceEvent>,
    ) {
        let timeout = self.options.response_timeout_ms;

        if self
            .live
            .as_ref()
            .and_then(LiveSend::in_flight)
            .is_some_and(|request| request.expired(now, timeout))
        {
            self.live_failed(TransportError::Timeout, now, storage, events);
        }

        if self
            .replay
            .is_some_and(|replay| replay.request.expired(now, timeout))
        {
            warn!("Replay timed out, will retry");
            self.replay = None;
        }

        if self
            .config_fetch
            .in_flight
            .is_some_and(|request| request.expired(now, timeout))
        {
            warn!("Configuration fetch timed out");
            self.config_fetch_done(now, false);
        }

        self.notifications
            .retain(|request| !request.expired(now, timeout));
    }
}
