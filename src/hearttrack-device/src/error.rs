use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("access of {len} bytes at offset {offset} is outside the storage image")]
    OutOfBounds { offset: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no response before the request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("server answered with status {0}")]
    Status(u16),
}

/// Failures that stop the device from starting at all.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("heart rate sensor not found")]
    SensorNotFound,
    #[error("failed to load persisted state")]
    Storage(#[from] StorageError),
}
