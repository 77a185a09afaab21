use crate::config::ConfigError;
use crate::imaging::PipelineError;
use crate::protocol::{ErrorBody, ErrorCode};
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("malformed multipart body: {0}")]
    Multipart(warp::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine worker stopped before finishing the request")]
    WorkerLost,
    #[error("failed to encode response: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build engine pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: warp::Error,
    },
}

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::Validation(_) | ServerError::Multipart(_) => ErrorCode::Validation,
            ServerError::PayloadTooLarge(_) => ErrorCode::PayloadTooLarge,
            ServerError::Pipeline(e) => e.code(),
            _ => ErrorCode::Processing,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
            code: self.code(),
        }
    }
}
