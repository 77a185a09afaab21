//! Parameter types for engine operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`operations`](super::operations) module (which
//! plans each step from the wire-level request) and the
//! [`backend`](super::backend) (which does the actual pixel work). This
//! separation allows swapping backends (e.g. for testing with a mock) without
//! changing planning logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`Compression`]: PNG zlib level (0–9, default 6). Clamped on construction.
//! - [`ResizeParams`]: Resample target plus the optional crop or letterbox that follows.
//! - [`CanvasParams`]: A blank canvas to synthesize.
//! - [`EncodeParams`]: Output format and encoder settings.
//! - [`SizeLimits`]: Largest side and largest pixel count any image may reach.

use crate::protocol::{CreateSpec, OutputFormat};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// zlib compression level for PNG output (0-9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression(pub u8);

impl Compression {
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self(6)
    }
}

/// What happens to the resampled image before the next operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reframe {
    /// Keep the resampled image as is.
    None,
    /// Cut a window out of an oversized (cover) resample.
    Crop(CropPlan),
    /// Paste an undersized (contain) resample onto a canvas.
    Embed(EmbedPlan),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropAnchor {
    At { left: u32, top: u32 },
    /// Backend picks the highest-entropy window.
    Entropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropPlan {
    pub width: u32,
    pub height: u32,
    pub anchor: CropAnchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedPlan {
    /// Final canvas size.
    pub width: u32,
    pub height: u32,
    /// Offset of the resampled image on the canvas.
    pub left: u32,
    pub top: u32,
    pub background: [u8; 4],
}

/// Parameters for a single resize step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeParams {
    /// Resample dimensions.
    pub width: u32,
    pub height: u32,
    pub reframe: Reframe,
}

/// Upper bounds on every image a request decodes, creates or resamples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    pub max_dimension: u32,
    pub max_pixels: u64,
}

impl SizeLimits {
    pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;
    /// 8192 x 8192.
    pub const DEFAULT_MAX_PIXELS: u64 = 67_108_864;

    pub fn new(max_dimension: u32, max_pixels: u64) -> Self {
        Self {
            max_dimension,
            max_pixels,
        }
    }

    /// Describe why `width` x `height` is out of bounds, or `None` if it fits.
    pub fn exceeded_by(&self, width: u32, height: u32) -> Option<String> {
        let pixels = u64::from(width) * u64::from(height);
        if width > self.max_dimension || height > self.max_dimension {
            Some(format!(
                "{width}x{height} exceeds the maximum side of {}",
                self.max_dimension
            ))
        } else if pixels > self.max_pixels {
            Some(format!(
                "{width}x{height} is {pixels} pixels, over the limit of {}",
                self.max_pixels
            ))
        } else {
            None
        }
    }
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_DIMENSION, Self::DEFAULT_MAX_PIXELS)
    }
}

/// Parameters for synthesizing a blank canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasParams {
    pub width: u32,
    pub height: u32,
    pub with_alpha: bool,
    pub color: [u8; 4],
}

impl From<&CreateSpec> for CanvasParams {
    fn from(spec: &CreateSpec) -> Self {
        Self {
            width: spec.width,
            height: spec.height,
            with_alpha: spec.channels == 4,
            color: spec.background.to_rgba8(),
        }
    }
}

/// Parameters for the final encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
    pub compression: Compression,
}

impl EncodeParams {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            quality: Quality::default(),
            compression: Compression::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Background;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }

    #[test]
    fn compression_clamps_to_nine() {
        assert_eq!(Compression::new(12).value(), 9);
        assert_eq!(Compression::default().value(), 6);
    }

    #[test]
    fn size_limits_bound_sides_and_area() {
        let limits = SizeLimits::new(1000, 250_000);
        assert_eq!(limits.exceeded_by(500, 500), None);
        assert!(limits.exceeded_by(1001, 1).unwrap().contains("maximum side"));
        assert!(limits.exceeded_by(1000, 1000).unwrap().contains("1000000 pixels"));
    }

    #[test]
    fn default_limits_reject_a_full_size_square() {
        let limits = SizeLimits::default();
        assert!(limits.exceeded_by(8192, 8192).is_none());
        assert!(limits.exceeded_by(16_384, 16_384).is_some());
    }

    #[test]
    fn canvas_params_from_create_spec() {
        let spec = CreateSpec::new(300, 200, 4, Background::rgba(255, 0, 0, 0.5));
        let params = CanvasParams::from(&spec);
        assert_eq!(params.width, 300);
        assert_eq!(params.height, 200);
        assert!(params.with_alpha);
        assert_eq!(params.color, [255, 0, 0, 128]);
    }
}
