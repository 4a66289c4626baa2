use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    time::Duration,
};

use anyhow::Context;
use hearttrack_device::{Reply, Request, RequestId, Response, Transport, TransportError};
use reqwest::{RequestBuilder, header::CONTENT_TYPE};
use tokio::runtime::Handle;

/// [`Transport`] over the collector's REST API. Requests run on the tokio
/// runtime and their responses come back over a channel, so the controller
/// never blocks on the network.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    device_id: String,
    api_key: String,
    runtime: Handle,
    connected: Arc<AtomicBool>,
    next_id: u32,
    responses_tx: mpsc::Sender<Response>,
    responses_rx: mpsc::Receiver<Response>,
}

impl HttpTransport {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);

    /// Must be called from within a tokio runtime. Starts the background
    /// connectivity probe.
    pub fn new(base_url: &str, api_key: &str, device_id: &str) -> anyhow::Result<Self> {
        let runtime = Handle::try_current().context("HTTP transport needs a tokio runtime")?;
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let (responses_tx, responses_rx) = mpsc::channel();
        let transport = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id: device_id.to_string(),
            api_key: api_key.to_string(),
            runtime,
            connected: Arc::new(AtomicBool::new(false)),
            next_id: 0,
            responses_tx,
            responses_rx,
        };
        transport.spawn_probe();

        Ok(transport)
    }

    /// Any HTTP answer from the base URL counts as connected.
    fn spawn_probe(&self) {
        let client = self.client.clone();
        let url = self.base_url.clone();
        let connected = self.connected.clone();

        self.runtime.spawn(async move {
            loop {
                let reachable = client.get(&url).send().await.is_ok();
                if connected.swap(reachable, Ordering::Relaxed) != reachable {
                    if reachable {
                        info!("Connected to {}", url);
                    } else {
                        warn!("Lost connection to {}", url);
                    }
                }
                tokio::time::sleep(Self::PROBE_INTERVAL).await;
            }
        });
    }

    fn build(&self, request: Request) -> RequestBuilder {
        let builder = match request {
            Request::SubmitMeasurement(body) => self
                .client
                .post(format!("{}/measurements", self.base_url))
                .header(CONTENT_TYPE, "application/json")
                .body(body),
            Request::Notify(body) => self
                .client
                .post(format!("{}/notifications", self.base_url))
                .header(CONTENT_TYPE, "application/json")
                .body(body),
            Request::FetchConfig => self
                .client
                .get(format!("{}/devices/{}/config", self.base_url, self.device_id)),
        };

        builder.header("X-API-Key", &self.api_key)
    }
}

impl Transport for HttpTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn post(&mut self, request: Request) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let builder = self.build(request);
        let responses = self.responses_tx.clone();
        self.runtime.spawn(async move {
            let outcome = send(builder).await;
            if let Err(error) = &outcome {
                debug!("Request {:?} failed: {}", id, error);
            }
            // the receiver is gone once the controller has shut down
            let _ = responses.send(Response { id, outcome });
        });

        id
    }

    fn poll(&mut self) -> Option<Response> {
        self.responses_rx.try_recv().ok()
    }
}

async fn send(builder: RequestBuilder) -> Result<Reply, TransportError> {
    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(transport_error)?;

    Ok(Reply {
        status,
        body: body.to_vec(),
    })
}

fn transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connect(error.to_string())
    }
}
