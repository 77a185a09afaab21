//! Wire protocol shared by the client and the remote endpoint.
//!
//! One terminal call is one `POST /` with a `multipart/form-data` body:
//!
//! | Part | Kind | Content |
//! |---|---|---|
//! | `input` | file | Encoded source image. Absent for create-spec sources. |
//! | `options` | text | JSON [`RequestOptions`]: `{source, operations, output}` |
//!
//! Successful responses are a single JSON envelope. A buffer request returns
//! [`BufferResponse`] (`data` is standard base64), a metadata request returns
//! [`MetadataResponse`]. Failures carry a non-2xx status and an [`ErrorBody`]
//! whose [`ErrorCode`] tells the client which error kind to raise.
//!
//! Operations are serialized as an ordered array of objects tagged by `op`:
//!
//! ```json
//! [
//!   {"op": "resize", "width": 300, "height": 300, "fit": "cover", "position": "centre"},
//!   {"op": "extract", "left": 10, "top": 10, "width": 100, "height": 100},
//!   {"op": "format", "format": "png", "compression": 9}
//! ]
//! ```
//!
//! Format names travel as plain strings so that the endpoint, not the client,
//! decides what is supported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Multipart field holding the uploaded image.
pub const INPUT_FIELD: &str = "input";
/// Multipart field holding the JSON [`RequestOptions`].
pub const OPTIONS_FIELD: &str = "options";
/// Response header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// Operations
// =============================================================================

/// How a resize reconciles the target box with the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Fill the box, cropping the overflow. Output is exactly the box.
    #[default]
    Cover,
    /// Fit inside the box and letterbox the rest. Output is exactly the box.
    Contain,
    /// Stretch to the box, ignoring aspect ratio.
    Fill,
    /// Fit inside the box, no letterboxing. Output may be smaller.
    Inside,
    /// Cover the box, no cropping. Output may be larger.
    Outside,
}

/// Crop anchor for `cover`, and image placement for `contain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    #[serde(alias = "center")]
    Centre,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    /// Keep the window with the highest Shannon entropy (cover only).
    Entropy,
}

/// An RGB color with a 0.0–1.0 alpha.
///
/// Alpha values outside the range are clamped when the color is used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Background {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub alpha: f64,
}

fn opaque() -> f64 {
    1.0
}

impl Background {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    pub fn rgba(r: u8, g: u8, b: u8, alpha: f64) -> Self {
        Self { r, g, b, alpha }
    }

    /// Pixel value with alpha scaled to 0–255.
    pub fn to_rgba8(self) -> [u8; 4] {
        let alpha = if self.alpha.is_nan() {
            1.0
        } else {
            self.alpha.clamp(0.0, 1.0)
        };
        [self.r, self.g, self.b, (alpha * 255.0).round() as u8]
    }
}

impl Default for Background {
    fn default() -> Self {
        Self::rgb(0, 0, 0)
    }
}

/// Parameters of a resize step.
///
/// Either dimension may be omitted; the missing one is derived from the
/// source aspect ratio.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResizeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub fit: Fit,
    #[serde(default)]
    pub position: Position,
    /// Letterbox color for `contain`. Defaults to opaque black.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    /// Leave the image untouched when the resize would upscale it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub without_enlargement: bool,
}

impl ResizeOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn width(width: u32) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }

    pub fn height(height: u32) -> Self {
        Self {
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn fit(mut self, fit: Fit) -> Self {
        self.fit = fit;
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn background(mut self, background: Background) -> Self {
        self.background = Some(background);
        self
    }

    pub fn without_enlargement(mut self) -> Self {
        self.without_enlargement = true;
        self
    }
}

/// A rectangular region in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Encoder options attached to a format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Lossy quality, 1–100 (JPEG).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// zlib compression level, 0–9 (PNG).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<u8>,
}

impl FormatOptions {
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn compression(mut self, level: u8) -> Self {
        self.compression = Some(level);
        self
    }
}

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Resize(ResizeOptions),
    Extract(Region),
    Format {
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compression: Option<u8>,
    },
}

impl Operation {
    pub fn format(format: impl Into<String>, options: FormatOptions) -> Self {
        Operation::Format {
            format: format.into(),
            quality: options.quality,
            compression: options.compression,
        }
    }
}

// =============================================================================
// Output formats
// =============================================================================

/// Encoders the endpoint can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Tiff,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported output format: {0}")]
pub struct UnknownFormat(pub String);

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "tiff" | "tif" => Ok(OutputFormat::Tiff),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl FromStr for Fit {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cover" => Ok(Fit::Cover),
            "contain" => Ok(Fit::Contain),
            "fill" => Ok(Fit::Fill),
            "inside" => Ok(Fit::Inside),
            "outside" => Ok(Fit::Outside),
            _ => Err(UnknownVariant {
                kind: "fit",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Position {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "centre" | "center" => Ok(Position::Centre),
            "north" => Ok(Position::North),
            "northeast" => Ok(Position::NorthEast),
            "east" => Ok(Position::East),
            "southeast" => Ok(Position::SouthEast),
            "south" => Ok(Position::South),
            "southwest" => Ok(Position::SouthWest),
            "west" => Ok(Position::West),
            "northwest" => Ok(Position::NorthWest),
            "entropy" => Ok(Position::Entropy),
            _ => Err(UnknownVariant {
                kind: "position",
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Blank canvas the endpoint synthesizes instead of decoding an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSpec {
    pub width: u32,
    pub height: u32,
    /// 3 (RGB) or 4 (RGBA).
    pub channels: u8,
    #[serde(default)]
    pub background: Background,
}

impl CreateSpec {
    pub fn new(width: u32, height: u32, channels: u8, background: Background) -> Self {
        Self {
            width,
            height,
            channels,
            background,
        }
    }
}

/// What the terminal call wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Encoded bytes plus [`OutputInfo`].
    #[default]
    Buffer,
    /// [`ImageMetadata`] of the untouched source.
    Metadata,
}

/// JSON body of the `options` part.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestOptions {
    #[serde(default)]
    pub source: Option<CreateSpec>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub output: OutputKind,
}

// =============================================================================
// Responses
// =============================================================================

/// Facts about an encoded output image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub format: String,
    /// Encoded size in bytes.
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub premultiplied: bool,
}

/// Facts about a source image, before any operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Container format, or `"raw"` for a synthesized canvas.
    pub format: String,
    /// Encoded size in bytes; absent for a synthesized canvas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub has_alpha: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferResponse {
    /// Standard base64 of the encoded image.
    pub data: String,
    pub info: OutputInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub metadata: ImageMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Error kinds as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    PayloadTooLarge,
    UnsupportedFormat,
    NotFound,
    Processing,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn status(self) -> u16 {
        match self {
            ErrorCode::Validation => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::UnsupportedFormat => 415,
            ErrorCode::Processing | ErrorCode::Unknown => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: ErrorCode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operations_serialize_tagged_in_order() {
        let ops = vec![
            Operation::Resize(ResizeOptions::new(300, 200)),
            Operation::format("png", FormatOptions::default().compression(9)),
        ];
        let value = serde_json::to_value(&ops).unwrap();
        assert_eq!(
            value,
            json!([
                {"op": "resize", "width": 300, "height": 200, "fit": "cover", "position": "centre"},
                {"op": "format", "format": "png", "compression": 9}
            ])
        );
    }

    #[test]
    fn resize_defaults_fill_in_when_absent() {
        let op: Operation = serde_json::from_value(json!({"op": "resize", "width": 50})).unwrap();
        assert_eq!(op, Operation::Resize(ResizeOptions::width(50)));
    }

    #[test]
    fn position_accepts_american_spelling() {
        let p: Position = serde_json::from_value(json!("center")).unwrap();
        assert_eq!(p, Position::Centre);
        assert_eq!("northeast".parse::<Position>().unwrap(), Position::NorthEast);
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let result: Result<Operation, _> = serde_json::from_value(json!({"op": "rotate"}));
        assert!(result.is_err());
    }

    #[test]
    fn request_options_default_to_buffer() {
        let opts: RequestOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.output, OutputKind::Buffer);
        assert!(opts.operations.is_empty());
        assert!(opts.source.is_none());
    }

    #[test]
    fn request_options_reject_unknown_keys() {
        let result: Result<RequestOptions, _> = serde_json::from_str(r#"{"queue": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn output_format_parses_aliases_case_insensitively() {
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("tif".parse::<OutputFormat>().unwrap(), OutputFormat::Tiff);
        assert!("bmp".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_from_path_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("/tmp/a.PNG")),
            Some(OutputFormat::Png)
        );
        assert_eq!(OutputFormat::from_path(Path::new("/tmp/a.raw")), None);
        assert_eq!(OutputFormat::from_path(Path::new("/tmp/a")), None);
    }

    #[test]
    fn background_alpha_clamps() {
        assert_eq!(Background::rgba(255, 255, 255, 128.0).to_rgba8(), [255, 255, 255, 255]);
        assert_eq!(Background::rgba(1, 2, 3, 0.5).to_rgba8(), [1, 2, 3, 128]);
        assert_eq!(Background::rgba(1, 2, 3, -1.0).to_rgba8(), [1, 2, 3, 0]);
    }

    #[test]
    fn error_code_statuses() {
        assert_eq!(ErrorCode::Validation.status(), 400);
        assert_eq!(ErrorCode::PayloadTooLarge.status(), 413);
        assert_eq!(ErrorCode::UnsupportedFormat.status(), 415);
        assert_eq!(ErrorCode::Processing.status(), 500);
    }

    #[test]
    fn unknown_error_code_deserializes() {
        let body: ErrorBody =
            serde_json::from_value(json!({"message": "x", "code": "teapot"})).unwrap();
        assert_eq!(body.code, ErrorCode::Unknown);
    }
}
