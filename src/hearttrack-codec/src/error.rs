use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected a json object")]
    NotAnObject,
}
