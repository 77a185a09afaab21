//! One terminal call, one multipart request.

use super::error::{LipoError, map_reqwest_error};
use super::pipeline::Source;
use crate::protocol::{INPUT_FIELD, OPTIONS_FIELD, RequestOptions};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Snapshot of a pipeline taken by a terminal call.
#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub source: Arc<Source>,
    pub options: RequestOptions,
}

/// HTTP half of the client. Cheap to clone.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: Client,
    endpoint: Url,
}

fn upload_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input")
        .to_string()
}

async fn input_part(source: &Source) -> Result<Option<Part>, LipoError> {
    match source {
        Source::Path(path) => {
            let file = tokio::fs::File::open(path).await?;
            let length = file.metadata().await?.len();
            let body = Body::wrap_stream(ReaderStream::new(file));
            Ok(Some(
                Part::stream_with_length(body, length).file_name(upload_name(path)),
            ))
        }
        Source::Buffer(bytes) => {
            let length = bytes.len() as u64;
            Ok(Some(
                Part::stream_with_length(Body::from(bytes.clone()), length).file_name("input"),
            ))
        }
        Source::Create(_) => Ok(None),
    }
}

/// Build the multipart body: the `input` file part (unless the source is a
/// create-spec) followed by the `options` JSON.
pub(crate) async fn build_form(request: &Request) -> Result<Form, LipoError> {
    let options = serde_json::to_string(&request.options)
        .map_err(|e| LipoError::Validation(format!("cannot serialize options: {e}")))?;

    let mut form = Form::new();
    if let Some(part) = input_part(&request.source).await? {
        form = form.part(INPUT_FIELD, part);
    }
    Ok(form.text(OPTIONS_FIELD, options))
}

impl Transport {
    pub fn new(http: Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send the request and return the raw success body.
    pub async fn post(&self, request: Request) -> Result<Bytes, LipoError> {
        let form = build_form(&request).await?;
        debug!(
            endpoint = %self.endpoint,
            operations = request.options.operations.len(),
            output = ?request.options.output,
            "sending pipeline"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        if status.is_success() {
            Ok(body)
        } else {
            Err(LipoError::from_response(status.as_u16(), &body))
        }
    }
}
