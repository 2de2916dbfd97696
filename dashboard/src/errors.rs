use crate::model::DeviceId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} already has a command in flight")]
    Busy(DeviceId),

    #[error("Channel send error")]
    ChannelSend,
}

impl Error {
    /// True for failures on the remote side (transport, status, payload shape).
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Status { .. } | Error::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
