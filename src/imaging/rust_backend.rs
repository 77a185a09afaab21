//! Pure Rust image engine built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `ImageReader::with_guessed_format` + `ImageDecoder` header read |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate decoders, bounded by `image::Limits` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Cover crop | `crop_imm`; entropy windows scored in parallel with `rayon` |
//! | Contain letterbox | `imageops::overlay` onto an RGBA canvas |
//! | Encode → JPEG / PNG / WebP / TIFF | `image::codecs::*` encoders |

use super::backend::{BackendError, Decoded, Encoded, ImageBackend};
use super::calculations::{entropy_candidates, shannon_entropy};
use super::params::{
    CanvasParams, CropAnchor, CropPlan, EmbedPlan, EncodeParams, Reframe, ResizeParams, SizeLimits,
};
use crate::protocol::{ImageMetadata, OutputFormat, Region};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{self, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{
    ColorType, DynamicImage, GrayImage, ImageDecoder, ImageError, ImageFormat, ImageReader,
    Limits, Rgb, RgbImage, Rgba, RgbaImage,
};
use rayon::prelude::*;
use std::borrow::Cow;
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy)]
pub struct RustBackend {
    limits: SizeLimits,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_limits(SizeLimits::default())
    }

    pub fn with_limits(limits: SizeLimits) -> Self {
        Self { limits }
    }

    fn decoder_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.limits.max_dimension);
        limits.max_image_height = Some(self.limits.max_dimension);
        limits
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), BackendError> {
        match self.limits.exceeded_by(width, height) {
            Some(reason) => Err(BackendError::TooLarge(reason)),
            None => Ok(()),
        }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire name of a container format.
pub fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

/// The encoder that matches a decoded container, if we have one.
pub fn output_format_for(format: ImageFormat) -> Option<OutputFormat> {
    match format {
        ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
        ImageFormat::Png => Some(OutputFormat::Png),
        ImageFormat::WebP => Some(OutputFormat::Webp),
        ImageFormat::Tiff => Some(OutputFormat::Tiff),
        _ => None,
    }
}

fn map_image_error(err: ImageError) -> BackendError {
    match err {
        ImageError::Unsupported(e) => BackendError::UnsupportedInput(e.to_string()),
        ImageError::Limits(e) => BackendError::TooLarge(e.to_string()),
        ImageError::Decoding(e) => BackendError::Decode(e.to_string()),
        ImageError::IoError(e) => BackendError::Io(e),
        other => BackendError::ProcessingFailed(other.to_string()),
    }
}

fn guess_reader(bytes: &[u8]) -> Result<(ImageReader<Cursor<&[u8]>>, ImageFormat), BackendError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| BackendError::UnsupportedInput("unrecognised image data".to_string()))?;
    Ok((reader, format))
}

/// Pick the window of `plan` size with the highest luminance entropy.
///
/// Ties go to the window closest to the top-left corner.
fn entropy_anchor(image: &DynamicImage, plan: &CropPlan) -> (u32, u32) {
    let luma = image.to_luma8();
    let xs = entropy_candidates(image.width().saturating_sub(plan.width));
    let ys = entropy_candidates(image.height().saturating_sub(plan.height));

    let candidates: Vec<(u32, u32)> = ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
        .collect();

    let scores: Vec<f64> = candidates
        .par_iter()
        .map(|&(x, y)| window_entropy(&luma, x, y, plan.width, plan.height))
        .collect();

    let mut best = (0, 0);
    let mut best_score = f64::NEG_INFINITY;
    for (&offset, &score) in candidates.iter().zip(&scores) {
        if score > best_score {
            best = offset;
            best_score = score;
        }
    }
    best
}

fn window_entropy(luma: &GrayImage, left: u32, top: u32, width: u32, height: u32) -> f64 {
    let mut histogram = [0u64; 256];
    for y in top..top + height {
        for x in left..left + width {
            histogram[luma.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    shannon_entropy(&histogram)
}

fn crop(image: DynamicImage, plan: &CropPlan) -> DynamicImage {
    if image.width() == plan.width && image.height() == plan.height {
        return image;
    }
    let (left, top) = match plan.anchor {
        CropAnchor::At { left, top } => (left, top),
        CropAnchor::Entropy => entropy_anchor(&image, plan),
    };
    image.crop_imm(left, top, plan.width, plan.height)
}

fn embed(image: &DynamicImage, plan: &EmbedPlan) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(plan.width, plan.height, Rgba(plan.background));
    image::imageops::overlay(&mut canvas, &image.to_rgba8(), plan.left as i64, plan.top as i64);

    let canvas = DynamicImage::ImageRgba8(canvas);
    if image.color().has_alpha() || plan.background[3] < 255 {
        canvas
    } else {
        DynamicImage::ImageRgb8(canvas.to_rgb8())
    }
}

/// Convert to a pixel layout the target encoder accepts.
fn normalize_for(image: &DynamicImage, format: OutputFormat) -> Cow<'_, DynamicImage> {
    let color = image.color();
    match format {
        OutputFormat::Jpeg => match color {
            ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(image),
            ColorType::L16 | ColorType::La8 | ColorType::La16 => {
                Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8()))
            }
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        OutputFormat::Webp => match color {
            ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(image),
            c if c.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        OutputFormat::Png | OutputFormat::Tiff => match color {
            ColorType::L8
            | ColorType::L16
            | ColorType::Rgb8
            | ColorType::Rgba8
            | ColorType::Rgb16
            | ColorType::Rgba16 => Cow::Borrowed(image),
            ColorType::La8 if format == OutputFormat::Png => Cow::Borrowed(image),
            ColorType::La16 if format == OutputFormat::Png => Cow::Borrowed(image),
            ColorType::La16 => Cow::Owned(DynamicImage::ImageRgba16(image.to_rgba16())),
            c if c.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
    }
}

fn png_compression(level: u8) -> png::CompressionType {
    match level {
        0..=3 => png::CompressionType::Fast,
        4..=6 => png::CompressionType::Default,
        _ => png::CompressionType::Best,
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<ImageMetadata, BackendError> {
        let (reader, format) = guess_reader(bytes)?;
        let decoder = reader.into_decoder().map_err(map_image_error)?;
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();
        Ok(ImageMetadata {
            format: format_name(format),
            size: Some(bytes.len() as u64),
            width,
            height,
            channels: color.channel_count(),
            has_alpha: color.has_alpha(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, BackendError> {
        let (mut reader, format) = guess_reader(bytes)?;
        reader.limits(self.decoder_limits());
        let decoder = reader.into_decoder().map_err(map_image_error)?;
        let (width, height) = decoder.dimensions();
        self.check_size(width, height)?;
        let image = DynamicImage::from_decoder(decoder).map_err(map_image_error)?;
        Ok(Decoded { image, format })
    }

    fn create(&self, params: &CanvasParams) -> Result<DynamicImage, BackendError> {
        self.check_size(params.width, params.height)?;
        let [r, g, b, a] = params.color;
        Ok(if params.with_alpha {
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                params.width,
                params.height,
                Rgba([r, g, b, a]),
            ))
        } else {
            DynamicImage::ImageRgb8(RgbImage::from_pixel(params.width, params.height, Rgb([r, g, b])))
        })
    }

    fn resize(
        &self,
        image: &DynamicImage,
        params: &ResizeParams,
    ) -> Result<DynamicImage, BackendError> {
        self.check_size(params.width, params.height)?;
        if let Reframe::Embed(plan) = &params.reframe {
            self.check_size(plan.width, plan.height)?;
        }
        let resampled = if image.width() == params.width && image.height() == params.height {
            image.clone()
        } else {
            image.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };

        Ok(match &params.reframe {
            Reframe::None => resampled,
            Reframe::Crop(plan) => crop(resampled, plan),
            Reframe::Embed(plan) => embed(&resampled, plan),
        })
    }

    fn extract(&self, image: &DynamicImage, region: &Region) -> Result<DynamicImage, BackendError> {
        let fits = region.left.checked_add(region.width).is_some_and(|r| r <= image.width())
            && region.top.checked_add(region.height).is_some_and(|b| b <= image.height());
        if !fits {
            return Err(BackendError::ProcessingFailed(format!(
                "region {}x{}+{}+{} outside {}x{} image",
                region.width,
                region.height,
                region.left,
                region.top,
                image.width(),
                image.height()
            )));
        }
        Ok(image.crop_imm(region.left, region.top, region.width, region.height))
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Encoded, BackendError> {
        let image = normalize_for(image, params.format);
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);

        let written = match params.format {
            OutputFormat::Jpeg => image.write_with_encoder(JpegEncoder::new_with_quality(
                &mut cursor,
                params.quality.value(),
            )),
            OutputFormat::Png => image.write_with_encoder(PngEncoder::new_with_quality(
                &mut cursor,
                png_compression(params.compression.value()),
                png::FilterType::Adaptive,
            )),
            OutputFormat::Webp => image.write_with_encoder(WebPEncoder::new_lossless(&mut cursor)),
            OutputFormat::Tiff => image.write_with_encoder(TiffEncoder::new(&mut cursor)),
        };
        written.map_err(|e| {
            BackendError::ProcessingFailed(format!("{} encode failed: {e}", params.format))
        })?;

        Ok(Encoded {
            data,
            width: image.width(),
            height: image.height(),
            channels: image.color().channel_count(),
        })
    }
}
