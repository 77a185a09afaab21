//! Streaming multipart reader.
//!
//! Limits are checked part by part as chunks arrive, so an oversized upload
//! is rejected without buffering more than one limit's worth of bytes.

use super::ServerError;
use crate::config::{ByteSize, UploadLimits};
use crate::protocol::{INPUT_FIELD, OPTIONS_FIELD, RequestOptions};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::TryStreamExt;
use tracing::debug;
use warp::multipart::{FormData, Part};

/// A fully read and parsed request body.
#[derive(Debug)]
pub struct Upload {
    /// Encoded source image; absent for create-spec requests.
    pub input: Option<Bytes>,
    pub options: RequestOptions,
    /// The `options` part as sent, used for cache keys.
    pub options_raw: Bytes,
}

/// Counts parts against the configured limits.
#[derive(Debug)]
struct PartBudget<'a> {
    limits: &'a UploadLimits,
    fields: usize,
    files: usize,
}

impl<'a> PartBudget<'a> {
    fn new(limits: &'a UploadLimits) -> Self {
        Self {
            limits,
            fields: 0,
            files: 0,
        }
    }

    /// Admit one part and return its size cap.
    fn admit(&mut self, name: &str, is_file: bool) -> Result<ByteSize, ServerError> {
        if name.len() > self.limits.field_name_size {
            return Err(ServerError::PayloadTooLarge(format!(
                "field name exceeds {} bytes",
                self.limits.field_name_size
            )));
        }
        if is_file {
            self.files += 1;
            if self.files > self.limits.files {
                return Err(ServerError::PayloadTooLarge(format!(
                    "more than {} file(s) in request",
                    self.limits.files
                )));
            }
            Ok(self.limits.file_size)
        } else {
            self.fields += 1;
            if self.fields > self.limits.fields {
                return Err(ServerError::PayloadTooLarge(format!(
                    "more than {} field(s) in request",
                    self.limits.fields
                )));
            }
            Ok(self.limits.field_size)
        }
    }
}

async fn read_part(mut part: Part, limit: ByteSize, name: &str) -> Result<Bytes, ServerError> {
    let mut out = BytesMut::new();
    while let Some(chunk) = part.data().await {
        let chunk = chunk.map_err(ServerError::Multipart)?;
        if (out.len() + chunk.remaining()) as u64 > limit.bytes() {
            return Err(ServerError::PayloadTooLarge(format!(
                "field '{name}' exceeds {limit}"
            )));
        }
        out.put(chunk);
    }
    Ok(out.freeze())
}

/// Parse the `options` part.
pub fn parse_options(raw: &[u8]) -> Result<RequestOptions, ServerError> {
    serde_json::from_slice(raw).map_err(|e| ServerError::Validation(format!("invalid options: {e}")))
}

/// Read every part of the form, enforcing `limits`.
pub async fn read_form(form: FormData, limits: &UploadLimits) -> Result<Upload, ServerError> {
    let mut form = std::pin::pin!(form);
    let mut budget = PartBudget::new(limits);
    let mut input = None;
    let mut options_raw = None;

    while let Some(part) = form.try_next().await.map_err(ServerError::Multipart)? {
        let name = part.name().to_string();
        let is_file = part.filename().is_some();
        let limit = budget.admit(&name, is_file)?;

        match name.as_str() {
            INPUT_FIELD => {
                if input.is_some() {
                    return Err(ServerError::Validation("duplicate input field".to_string()));
                }
                input = Some(read_part(part, limit, &name).await?);
            }
            OPTIONS_FIELD if !is_file => {
                if options_raw.is_some() {
                    return Err(ServerError::Validation(
                        "duplicate options field".to_string(),
                    ));
                }
                options_raw = Some(read_part(part, limit, &name).await?);
            }
            _ if is_file => {
                return Err(ServerError::Validation(format!(
                    "unexpected file field '{name}'"
                )));
            }
            _ => {
                // Unknown text fields still count against the limits.
                let ignored = read_part(part, limit, &name).await?;
                debug!(field = %name, bytes = ignored.len(), "ignoring unknown field");
            }
        }
    }

    let options_raw = options_raw
        .ok_or_else(|| ServerError::Validation("missing options field".to_string()))?;
    let options = parse_options(&options_raw)?;

    Ok(Upload {
        input,
        options,
        options_raw,
    })
}
