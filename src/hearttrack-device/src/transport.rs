use crate::TransportError;

/// Correlates a [`Response`] with the [`Request`] that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// JSON body for the measurements endpoint.
    SubmitMeasurement(Vec<u8>),
    /// JSON body for the notifications endpoint.
    Notify(Vec<u8>),
    FetchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<Reply, TransportError>,
}

impl Response {
    /// Folds non-2xx replies into a [`TransportError::Status`].
    pub fn into_success(self) -> Result<Reply, TransportError> {
        let reply = self.outcome?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(TransportError::Status(reply.status))
        }
    }
}

/// Message-passing view of the network: requests are posted and their
/// responses are picked up by polling on a later tick.
pub trait Transport {
    fn is_connected(&self) -> bool;

    fn post(&mut self, request: Request) -> RequestId;

    fn poll(&mut self) -> Option<Response>;
}
