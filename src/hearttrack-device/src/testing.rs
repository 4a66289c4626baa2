//! In-memory fakes for the collaborator traits. Each fake is a cheap handle
//! to shared state so a test can keep steering it after handing a clone to
//! the controller.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use hearttrack_types::RawReading;

use crate::{
    Acquisition, Clock, Reply, Request, RequestId, Response, Storage, StorageError, Transport,
    TransportError,
};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap()
}

#[derive(Debug)]
struct ClockState {
    monotonic_ms: u64,
    utc: Option<DateTime<Utc>>,
    zone: f32,
    applied: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct FakeClock(Rc<RefCell<ClockState>>);

impl FakeClock {
    pub fn synced(at: DateTime<Utc>) -> Self {
        Self(Rc::new(RefCell::new(ClockState {
            monotonic_ms: 0,
            utc: Some(at),
            zone: 0.0,
            applied: Vec::new(),
        })))
    }

    pub fn unsynced() -> Self {
        Self(Rc::new(RefCell::new(ClockState {
            monotonic_ms: 0,
            utc: None,
            zone: 0.0,
            applied: Vec::new(),
        })))
    }

    pub fn advance(&self, ms: u64) {
        let mut state = self.0.borrow_mut();
        state.monotonic_ms += ms;
        if let Some(utc) = state.utc.as_mut() {
            *utc += TimeDelta::milliseconds(ms as i64);
        }
    }

    pub fn sync(&self, at: DateTime<Utc>) {
        self.0.borrow_mut().utc = Some(at);
    }

    pub fn zone_applications(&self) -> Vec<f32> {
        self.0.borrow().applied.clone()
    }
}

impl Clock for FakeClock {
    fn monotonic_ms(&self) -> u64 {
        self.0.borrow().monotonic_ms
    }

    fn utc(&self) -> Option<DateTime<Utc>> {
        self.0.borrow().utc
    }

    fn zone_offset_hours(&self) -> f32 {
        self.0.borrow().zone
    }

    fn apply_zone(&mut self, offset_hours: f32) {
        let mut state = self.0.borrow_mut();
        state.zone = offset_hours;
        state.applied.push(offset_hours);
    }
}

#[derive(Debug, Default)]
struct SensorState {
    present: bool,
    engaged: bool,
    readings: VecDeque<RawReading>,
    starts: usize,
    stops: usize,
}

#[derive(Debug, Clone)]
pub struct FakeSensor(Rc<RefCell<SensorState>>);

impl FakeSensor {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(SensorState {
            present: true,
            ..SensorState::default()
        })))
    }

    pub fn missing() -> Self {
        Self(Rc::new(RefCell::new(SensorState::default())))
    }

    pub fn engage(&self, engaged: bool) {
        self.0.borrow_mut().engaged = engaged;
    }

    pub fn push(&self, heart_rate: f32, spo2: f32) {
        self.0
            .borrow_mut()
            .readings
            .push_back(RawReading::valid(heart_rate, spo2));
    }

    pub fn push_raw(&self, reading: RawReading) {
        self.0.borrow_mut().readings.push_back(reading);
    }

    pub fn starts(&self) -> usize {
        self.0.borrow().starts
    }

    pub fn stops(&self) -> usize {
        self.0.borrow().stops
    }
}

impl Acquisition for FakeSensor {
    fn probe(&mut self) -> bool {
        self.0.borrow().present
    }

    fn presence(&mut self) -> bool {
        self.0.borrow().engaged
    }

    fn start(&mut self) {
        self.0.borrow_mut().starts += 1;
    }

    fn measure(&mut self) -> Option<RawReading> {
        self.0.borrow_mut().readings.pop_front()
    }

    fn stop(&mut self) {
        self.0.borrow_mut().stops += 1;
    }
}

#[derive(Debug, Default)]
struct TransportState {
    connected: bool,
    next_id: u32,
    posted: Vec<(RequestId, Request)>,
    responses: VecDeque<Response>,
    /// Status answered immediately to measurement and notification posts.
    auto_reply: Option<u16>,
    /// Body answered with 200 to every configuration fetch.
    config: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct FakeTransport(Rc<RefCell<TransportState>>);

impl FakeTransport {
    pub fn offline() -> Self {
        Self(Rc::new(RefCell::new(TransportState::default())))
    }

    pub fn online() -> Self {
        let transport = Self::offline();
        transport.set_connected(true);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.borrow_mut().connected = connected;
    }

    pub fn auto_reply(&self, status: Option<u16>) {
        self.0.borrow_mut().auto_reply = status;
    }

    pub fn serve_config(&self, body: &[u8]) {
        self.0.borrow_mut().config = Some(body.to_vec());
    }

    pub fn posted(&self) -> Vec<(RequestId, Request)> {
        self.0.borrow().posted.clone()
    }

    pub fn submissions(&self) -> Vec<serde_json::Value> {
        self.posted()
            .into_iter()
            .filter_map(|(_, request)| match request {
                Request::SubmitMeasurement(body) => serde_json::from_slice(&body).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn last_id(&self) -> Option<RequestId> {
        self.0.borrow().posted.last().map(|(id, _)| *id)
    }

    pub fn reply(&self, id: RequestId, status: u16, body: &[u8]) {
        self.0.borrow_mut().responses.push_back(Response {
            id,
            outcome: Ok(Reply {
                status,
                body: body.to_vec(),
            }),
        });
    }

    pub fn fail(&self, id: RequestId, error: TransportError) {
        self.0.borrow_mut().responses.push_back(Response {
            id,
            outcome: Err(error),
        });
    }
}

impl Transport for FakeTransport {
    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    fn post(&mut self, request: Request) -> RequestId {
        let mut state = self.0.borrow_mut();
        let id = RequestId(state.next_id);
        state.next_id += 1;

        let config = match request {
            Request::FetchConfig => state.config.clone(),
            _ => None,
        };
        if let Some(body) = config {
            state.responses.push_back(Response {
                id,
                outcome: Ok(Reply { status: 200, body }),
            });
        } else if let Some(status) = state.auto_reply {
            let status = match request {
                Request::FetchConfig => 404,
                _ => status,
            };
            state.responses.push_back(Response {
                id,
                outcome: Ok(Reply {
                    status,
                    body: Vec::new(),
                }),
            });
        }
        state.posted.push((id, request));
        id
    }

    fn poll(&mut self) -> Option<Response> {
        self.0.borrow_mut().responses.pop_front()
    }
}

/// Storage handle shared with the test.
#[derive(Debug, Clone, Default)]
pub struct SharedStorage(Rc<RefCell<crate::MemoryStorage>>);

impl SharedStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for SharedStorage {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.0.borrow().read(offset, buf)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        self.0.borrow_mut().write(offset, bytes)
    }
}
