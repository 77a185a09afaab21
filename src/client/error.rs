use crate::protocol::{ErrorBody, ErrorCode};
use thiserror::Error;

/// Every failure a terminal call can report.
#[derive(Error, Debug)]
pub enum LipoError {
    /// The endpoint rejected the pipeline or its parameters.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The upload exceeded one of the endpoint's limits.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// Input or requested output format is not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Connection failure, timeout or an interrupted response.
    #[error("network error: {0}")]
    Network(String),
    /// The endpoint failed while processing.
    #[error("remote processing failed: {0}")]
    RemoteProcessing(String),
    /// Reading the source or writing the output file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid client config: {0}")]
    InvalidConfig(String),
}

impl LipoError {
    /// Whether sending the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LipoError::Network(_) | LipoError::RemoteProcessing(_))
    }

    /// Map a non-2xx reply to an error kind.
    ///
    /// Uses the body's `code` when it parses, else falls back to the status.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(ErrorBody { message, code }) => match code {
                ErrorCode::Validation | ErrorCode::NotFound => LipoError::Validation(message),
                ErrorCode::PayloadTooLarge => LipoError::PayloadTooLarge(message),
                ErrorCode::UnsupportedFormat => LipoError::UnsupportedFormat(message),
                ErrorCode::Processing => LipoError::RemoteProcessing(message),
                ErrorCode::Unknown => Self::from_status(status, message),
            },
            Err(_) => {
                let text = String::from_utf8_lossy(body);
                let message = if text.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {}", text.trim())
                };
                Self::from_status(status, message)
            }
        }
    }

    fn from_status(status: u16, message: String) -> Self {
        match status {
            413 => LipoError::PayloadTooLarge(message),
            415 => LipoError::UnsupportedFormat(message),
            400..=499 => LipoError::Validation(message),
            _ => LipoError::RemoteProcessing(message),
        }
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> LipoError {
    if e.is_timeout() {
        LipoError::Network(format!("request timed out: {e}"))
    } else if e.is_connect() {
        LipoError::Network(format!("cannot connect: {e}"))
    } else if e.is_builder() {
        LipoError::InvalidConfig(e.to_string())
    } else {
        LipoError::Network(format!("request failed: {e}"))
    }
}
