//! Turning response envelopes into bytes, infos and files.

use super::error::LipoError;
use crate::protocol::{BufferResponse, ImageMetadata, MetadataResponse, OutputInfo};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Encoded image plus the facts the endpoint reported about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub data: Bytes,
    pub info: OutputInfo,
}

fn malformed(what: &str, e: impl std::fmt::Display) -> LipoError {
    LipoError::RemoteProcessing(format!("malformed {what} response: {e}"))
}

pub(crate) fn decode_buffer(body: &[u8]) -> Result<Output, LipoError> {
    let envelope: BufferResponse =
        serde_json::from_slice(body).map_err(|e| malformed("buffer", e))?;
    let data = STANDARD
        .decode(envelope.data.as_bytes())
        .map_err(|e| malformed("buffer", e))?;
    Ok(Output {
        data: Bytes::from(data),
        info: envelope.info,
    })
}

pub(crate) fn decode_metadata(body: &[u8]) -> Result<ImageMetadata, LipoError> {
    let envelope: MetadataResponse =
        serde_json::from_slice(body).map_err(|e| malformed("metadata", e))?;
    Ok(envelope.metadata)
}

/// Write `data` next to `path` and rename it into place.
///
/// The temporary file is removed on every failure path, so `path` either
/// holds the complete output or is untouched.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".lipo-")
        .suffix(".part")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub(crate) async fn write_file(path: PathBuf, output: Output) -> Result<OutputInfo, LipoError> {
    let Output { data, info } = output;
    tokio::task::spawn_blocking(move || write_atomic(&path, &data))
        .await
        .map_err(|e| LipoError::Io(io::Error::other(e)))??;
    Ok(info)
}
