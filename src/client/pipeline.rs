//! Fluent pipeline builder.
//!
//! Chain methods consume the builder and return it with one more operation
//! queued. Terminal methods borrow it, snapshot the source and the operations,
//! and send exactly one request, so a builder can be reused or cloned and
//! executed concurrently:
//!
//! ```no_run
//! # async fn demo(lipo: lipo::Lipo) -> Result<(), lipo::LipoError> {
//! let base = lipo.input("photo.jpg").resize(300, 300);
//! let small = base.clone().resize(100, 100);
//! let large = base.clone().png();
//! let (small, large) = tokio::join!(small.to_buffer(), large.to_file("large.png"));
//! let (_small, _large) = (small?, large?);
//! # Ok(())
//! # }
//! ```

use super::Lipo;
use super::error::LipoError;
use super::materialize::{self, Output};
use super::transport::Request;
use crate::protocol::{
    CreateSpec, FormatOptions, ImageMetadata, Operation, OutputFormat, OutputInfo, OutputKind,
    Region, RequestOptions, ResizeOptions,
};
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a pipeline's pixels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Local file, streamed to the endpoint at call time.
    Path(PathBuf),
    /// In-memory encoded image.
    Buffer(Bytes),
    /// Blank canvas synthesized by the endpoint.
    Create(CreateSpec),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for Source {
    fn from(data: Vec<u8>) -> Self {
        Source::Buffer(Bytes::from(data))
    }
}

impl From<Bytes> for Source {
    fn from(data: Bytes) -> Self {
        Source::Buffer(data)
    }
}

impl From<CreateSpec> for Source {
    fn from(spec: CreateSpec) -> Self {
        Source::Create(spec)
    }
}

/// Ordered operations bound to one source.
///
/// `Clone` is O(1): the source is shared and the operation list is a
/// persistent vector, so appends on a clone never show up in the original.
#[derive(Clone)]
pub struct Pipeline {
    client: Lipo,
    source: Arc<Source>,
    operations: im::Vector<Operation>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("endpoint", &self.client.endpoint().as_str())
            .field("source", &self.source)
            .field("operations", &self.operations)
            .finish()
    }
}

impl Pipeline {
    pub(crate) fn new(client: Lipo, source: Source) -> Self {
        Self {
            client,
            source: Arc::new(source),
            operations: im::Vector::new(),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Queued operations in execution order.
    pub fn operations(&self) -> Vec<Operation> {
        self.operations.iter().cloned().collect()
    }

    fn push(mut self, op: Operation) -> Self {
        self.operations.push_back(op);
        self
    }

    // =========================================================================
    // Chain
    // =========================================================================

    /// Resize to `width`x`height` with the default `cover` fit.
    pub fn resize(self, width: u32, height: u32) -> Self {
        self.resize_with(ResizeOptions::new(width, height))
    }

    pub fn resize_with(self, options: ResizeOptions) -> Self {
        self.push(Operation::Resize(options))
    }

    /// Crop a region out of the current image.
    pub fn extract(self, left: u32, top: u32, width: u32, height: u32) -> Self {
        self.push(Operation::Extract(Region {
            left,
            top,
            width,
            height,
        }))
    }

    pub fn jpeg(self) -> Self {
        self.to_format(OutputFormat::Jpeg.as_str())
    }

    pub fn png(self) -> Self {
        self.to_format(OutputFormat::Png.as_str())
    }

    pub fn webp(self) -> Self {
        self.to_format(OutputFormat::Webp.as_str())
    }

    pub fn tiff(self) -> Self {
        self.to_format(OutputFormat::Tiff.as_str())
    }

    /// Select the output format by name. The endpoint decides whether the
    /// name is supported; if several are queued, the last one wins.
    pub fn to_format(self, format: impl Into<String>) -> Self {
        self.to_format_with(format, FormatOptions::default())
    }

    pub fn to_format_with(self, format: impl Into<String>, options: FormatOptions) -> Self {
        self.push(Operation::format(format, options))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    fn has_format(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, Operation::Format { .. }))
    }

    fn request(&self, output: OutputKind, extra: Option<Operation>) -> Request {
        let source = match &*self.source {
            Source::Create(spec) => Some(spec.clone()),
            _ => None,
        };
        let operations = self.operations.iter().cloned().chain(extra).collect();
        Request {
            source: Arc::clone(&self.source),
            options: RequestOptions {
                source,
                operations,
                output,
            },
        }
    }

    /// Request for `to_file`: without a queued format, the extension picks one.
    fn file_request(&self, path: &Path) -> Request {
        let inferred = if self.has_format() {
            None
        } else {
            OutputFormat::from_path(path)
                .map(|format| Operation::format(format.as_str(), FormatOptions::default()))
        };
        self.request(OutputKind::Buffer, inferred)
    }

    // =========================================================================
    // Jobs (one future per terminal; the three conventions share them)
    // =========================================================================

    fn buffer_job(&self) -> BoxFuture<'static, Result<Output, LipoError>> {
        let transport = self.client.transport();
        let request = self.request(OutputKind::Buffer, None);
        async move {
            let body = transport.post(request).await?;
            materialize::decode_buffer(&body)
        }
        .boxed()
    }

    fn file_job(&self, path: &Path) -> BoxFuture<'static, Result<OutputInfo, LipoError>> {
        let transport = self.client.transport();
        let request = self.file_request(path);
        let path = path.to_path_buf();
        async move {
            let body = transport.post(request).await?;
            let output = materialize::decode_buffer(&body)?;
            materialize::write_file(path, output).await
        }
        .boxed()
    }

    fn metadata_job(&self) -> BoxFuture<'static, Result<ImageMetadata, LipoError>> {
        let transport = self.client.transport();
        let request = self.request(OutputKind::Metadata, None);
        async move {
            let body = transport.post(request).await?;
            materialize::decode_metadata(&body)
        }
        .boxed()
    }

    // =========================================================================
    // Terminals
    // =========================================================================

    /// Write the output to `path`; on failure no file is left there.
    pub async fn to_file(&self, path: impl AsRef<Path>) -> Result<OutputInfo, LipoError> {
        self.client.run(self.file_job(path.as_ref())).await
    }

    pub async fn to_buffer(&self) -> Result<Bytes, LipoError> {
        Ok(self.client.run(self.buffer_job()).await?.data)
    }

    pub async fn to_buffer_with_info(&self) -> Result<Output, LipoError> {
        self.client.run(self.buffer_job()).await
    }

    /// Metadata of the untouched source. Queued operations are still
    /// validated by the endpoint.
    pub async fn metadata(&self) -> Result<ImageMetadata, LipoError> {
        self.client.run(self.metadata_job()).await
    }

    pub fn to_file_sync(&self, path: impl AsRef<Path>) -> Result<OutputInfo, LipoError> {
        self.client.run_blocking(self.file_job(path.as_ref()))
    }

    pub fn to_buffer_sync(&self) -> Result<Bytes, LipoError> {
        Ok(self.client.run_blocking(self.buffer_job())?.data)
    }

    pub fn to_buffer_with_info_sync(&self) -> Result<Output, LipoError> {
        self.client.run_blocking(self.buffer_job())
    }

    pub fn metadata_sync(&self) -> Result<ImageMetadata, LipoError> {
        self.client.run_blocking(self.metadata_job())
    }

    pub fn to_file_callback<F>(&self, path: impl AsRef<Path>, callback: F)
    where
        F: FnOnce(Result<OutputInfo, LipoError>) + Send + 'static,
    {
        self.client.run_callback(self.file_job(path.as_ref()), callback);
    }

    pub fn to_buffer_callback<F>(&self, callback: F)
    where
        F: FnOnce(Result<Bytes, LipoError>) + Send + 'static,
    {
        self.client.run_callback(self.buffer_job(), move |result| {
            callback(result.map(|output| output.data))
        });
    }

    pub fn to_buffer_with_info_callback<F>(&self, callback: F)
    where
        F: FnOnce(Result<Output, LipoError>) + Send + 'static,
    {
        self.client.run_callback(self.buffer_job(), callback);
    }

    pub fn metadata_callback<F>(&self, callback: F)
    where
        F: FnOnce(Result<ImageMetadata, LipoError>) + Send + 'static,
    {
        self.client.run_callback(self.metadata_job(), callback);
    }
}
