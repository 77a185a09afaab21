//! Request handlers.

use super::upload::{self, Upload};
use super::{AppState, ServerError};
use crate::cache::cache_key;
use crate::imaging::{Input, Processed, execute};
use crate::protocol::{
    BufferResponse, ErrorBody, ErrorCode, HealthResponse, MetadataResponse, REQUEST_ID_HEADER,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use warp::http::header::{CONTENT_TYPE, HeaderValue};
use warp::http::StatusCode;
use warp::multipart::FormData;
use warp::reply::Response;
use warp::{Rejection, Reply};

fn json_response(status: StatusCode, body: Bytes) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(body: &ErrorBody) -> Response {
    let status =
        StatusCode::from_u16(body.code.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match serde_json::to_vec(body) {
        Ok(json) => json_response(status, Bytes::from(json)),
        Err(_) => {
            let mut response = Response::new(Bytes::new().into());
            *response.status_mut() = status;
            response
        }
    }
}

/// Run `work` on the engine pool and wait for it without blocking the reactor.
async fn run_on_pool<T, F>(pool: &rayon::ThreadPool, work: F) -> Result<T, ServerError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    pool.spawn(move || {
        let _ = tx.send(work());
    });
    rx.await.map_err(|_| ServerError::WorkerLost)
}

/// Execute a parsed upload and render the success envelope.
pub fn render(state: &AppState, upload: &Upload) -> Result<Bytes, ServerError> {
    let input = Input::resolve(upload.input.as_deref(), upload.options.source.as_ref())?;
    let processed = execute(
        &state.backend,
        input,
        &upload.options,
        state.config.processing.size_limits(),
    )?;

    let json = match processed {
        Processed::Buffer { data, info } => {
            debug!(format = %info.format, width = info.width, height = info.height, size = info.size, "encoded");
            serde_json::to_vec(&BufferResponse {
                data: STANDARD.encode(&data),
                info,
            })?
        }
        Processed::Metadata(metadata) => serde_json::to_vec(&MetadataResponse { metadata })?,
    };
    Ok(Bytes::from(json))
}

async fn respond(form: FormData, state: Arc<AppState>) -> Result<Bytes, ServerError> {
    let upload = upload::read_form(form, &state.config.limits).await?;
    debug!(
        operations = upload.options.operations.len(),
        input_bytes = upload.input.as_ref().map_or(0, Bytes::len),
        "request parsed"
    );

    let key = cache_key(upload.input.as_deref(), &upload.options_raw);
    if let Some(body) = state.cache.get(&key).await {
        debug!("served from cache");
        return Ok(body);
    }

    let worker_state = Arc::clone(&state);
    let body = run_on_pool(&state.pool, move || render(&worker_state, &upload)).await??;
    state.cache.insert(key, body.clone()).await;
    Ok(body)
}

/// `POST /`: run one pipeline.
pub async fn process(form: FormData, state: Arc<AppState>) -> Result<Response, Rejection> {
    let request_id = Uuid::new_v4();
    let span = info_span!("request", id = %request_id);

    let mut response = async move {
        let started = Instant::now();
        match respond(form, state).await {
            Ok(body) => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "processed");
                json_response(StatusCode::OK, body)
            }
            Err(err) => {
                let body = err.body();
                warn!(code = ?body.code, error = %err, "request failed");
                error_response(&body)
            }
        }
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(response)
}

/// `GET /health`.
pub fn health(state: Arc<AppState>) -> impl Reply {
    let stats = state.cache.stats();
    warp::reply::json(&HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_hits: stats.hits,
        cache_misses: stats.misses,
    })
}

/// Turn warp's own rejections into the JSON error body.
pub async fn rejection(err: Rejection) -> Result<Response, Infallible> {
    let (code, message) = if err.is_not_found() {
        (ErrorCode::NotFound, "no such route".to_string())
    } else if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        (ErrorCode::PayloadTooLarge, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (ErrorCode::NotFound, "no such route for this method".to_string())
    } else {
        (ErrorCode::Validation, format!("bad request: {err:?}"))
    };
    debug!(?code, %message, "rejected");
    Ok(error_response(&ErrorBody { message, code }))
}
