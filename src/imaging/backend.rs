//! Image engine trait and shared types.
//!
//! The [`ImageBackend`] trait defines the six operations every engine must
//! support: identify, decode, create, resize, extract and encode. Pipelines
//! are planned in [`operations`](super::operations) and only ever talk to the
//! engine through this trait.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::params::{CanvasParams, EncodeParams, ResizeParams};
use crate::protocol::{ImageMetadata, Region};
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The bytes look like an image but cannot be decoded.
    #[error("Decode failed: {0}")]
    Decode(String),
    /// The container format is not recognised or not compiled in.
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),
    /// Decoding would exceed the configured dimension limits.
    #[error("Image too large: {0}")]
    TooLarge(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel dimensions of an in-memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A decoded upload and the container it came in.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Encoded output and the facts the client reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Trait for image processing engines.
///
/// Implementations must be `Sync`: one engine instance serves every
/// concurrent request on the server's worker pool.
pub trait ImageBackend: Sync {
    /// Read format, dimensions and channel layout without a full decode.
    fn identify(&self, bytes: &[u8]) -> Result<ImageMetadata, BackendError>;

    /// Decode an uploaded image.
    fn decode(&self, bytes: &[u8]) -> Result<Decoded, BackendError>;

    /// Synthesize a blank canvas.
    fn create(&self, params: &CanvasParams) -> Result<DynamicImage, BackendError>;

    /// Resample, then crop or letterbox as planned.
    fn resize(&self, image: &DynamicImage, params: &ResizeParams)
    -> Result<DynamicImage, BackendError>;

    /// Cut a region out of the image. The region is already bounds-checked.
    fn extract(&self, image: &DynamicImage, region: &Region) -> Result<DynamicImage, BackendError>;

    /// Encode to the requested output format.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Encoded, BackendError>;
}
