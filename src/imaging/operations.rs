//! Pipeline planning and execution.
//!
//! These functions combine calculations with backend execution. They take a
//! wire-level [`RequestOptions`], validate it before any pixel work, plan
//! each step and call the backend in order.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{
    calculate_fill_dimensions, calculate_fit_dimensions, gravity_offset, resolve_target,
};
use super::params::{
    CanvasParams, Compression, CropAnchor, CropPlan, EmbedPlan, EncodeParams, Quality, Reframe,
    ResizeParams, SizeLimits,
};
use super::rust_backend::output_format_for;
use crate::protocol::{
    CreateSpec, ErrorCode, Fit, ImageMetadata, Operation, OutputFormat, OutputInfo, OutputKind,
    Position, Region, RequestOptions, ResizeOptions,
};
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PipelineError {
    /// Wire error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Validation(_) => ErrorCode::Validation,
            PipelineError::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            PipelineError::Backend(BackendError::UnsupportedInput(_)) => {
                ErrorCode::UnsupportedFormat
            }
            PipelineError::Backend(BackendError::TooLarge(_)) => ErrorCode::PayloadTooLarge,
            PipelineError::Backend(_) => ErrorCode::Processing,
        }
    }
}

/// Where the pixels come from.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Upload(&'a [u8]),
    Create(&'a CreateSpec),
}

impl<'a> Input<'a> {
    /// Pick the source from an optional upload and an optional create-spec.
    /// Exactly one must be present.
    pub fn resolve(upload: Option<&'a [u8]>, source: Option<&'a CreateSpec>) -> Result<Self> {
        match (upload, source) {
            (Some(bytes), None) => Ok(Input::Upload(bytes)),
            (None, Some(spec)) => Ok(Input::Create(spec)),
            (Some(_), Some(_)) => Err(PipelineError::Validation(
                "request carries both an input file and a create source".to_string(),
            )),
            (None, None) => Err(PipelineError::Validation(
                "request has neither an input file nor a create source".to_string(),
            )),
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Buffer { data: Vec<u8>, info: OutputInfo },
    Metadata(ImageMetadata),
}

// =============================================================================
// Validation
// =============================================================================

fn check_dimension(what: &str, value: u32, max_dimension: u32) -> Result<()> {
    if value == 0 {
        return Err(PipelineError::Validation(format!("{what} must be positive")));
    }
    if value > max_dimension {
        return Err(PipelineError::Validation(format!(
            "{what} {value} exceeds the maximum of {max_dimension}"
        )));
    }
    Ok(())
}

fn check_area(what: &str, width: u32, height: u32, limits: SizeLimits) -> Result<()> {
    match limits.exceeded_by(width, height) {
        Some(reason) => Err(PipelineError::Validation(format!("{what} {reason}"))),
        None => Ok(()),
    }
}

/// Validate every queued operation and resolve the output encoder.
///
/// Returns the parameters of the last format operation, if any.
pub fn validate_operations(
    operations: &[Operation],
    limits: SizeLimits,
) -> Result<Option<EncodeParams>> {
    let mut encode = None;

    for op in operations {
        match op {
            Operation::Resize(options) => {
                if options.width.is_none() && options.height.is_none() {
                    return Err(PipelineError::Validation(
                        "resize needs a width or a height".to_string(),
                    ));
                }
                if let Some(w) = options.width {
                    check_dimension("resize width", w, limits.max_dimension)?;
                }
                if let Some(h) = options.height {
                    check_dimension("resize height", h, limits.max_dimension)?;
                }
                if let (Some(w), Some(h)) = (options.width, options.height) {
                    check_area("resize target", w, h, limits)?;
                }
            }
            Operation::Extract(region) => {
                check_dimension("extract width", region.width, u32::MAX)?;
                check_dimension("extract height", region.height, u32::MAX)?;
            }
            Operation::Format {
                format,
                quality,
                compression,
            } => {
                let parsed: OutputFormat = format
                    .parse()
                    .map_err(|e: crate::protocol::UnknownFormat| {
                        PipelineError::UnsupportedFormat(e.to_string())
                    })?;
                let mut params = EncodeParams::new(parsed);
                if let Some(q) = *quality {
                    if !(1..=100).contains(&q) {
                        return Err(PipelineError::Validation(format!(
                            "quality {q} is outside 1-100"
                        )));
                    }
                    params.quality = Quality::new(q);
                }
                if let Some(c) = *compression {
                    if c > 9 {
                        return Err(PipelineError::Validation(format!(
                            "compression {c} is outside 0-9"
                        )));
                    }
                    params.compression = Compression::new(c);
                }
                encode = Some(params);
            }
        }
    }

    Ok(encode)
}

pub fn validate_create_spec(spec: &CreateSpec, limits: SizeLimits) -> Result<()> {
    if !matches!(spec.channels, 3 | 4) {
        return Err(PipelineError::Validation(format!(
            "create channels must be 3 or 4, got {}",
            spec.channels
        )));
    }
    check_dimension("create width", spec.width, limits.max_dimension)?;
    check_dimension("create height", spec.height, limits.max_dimension)?;
    check_area("create canvas", spec.width, spec.height, limits)
}

fn check_region(region: &Region, dims: Dimensions) -> Result<()> {
    let right = region.left.checked_add(region.width);
    let bottom = region.top.checked_add(region.height);
    let inside = right.is_some_and(|r| r <= dims.width) && bottom.is_some_and(|b| b <= dims.height);
    if inside {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!(
            "extract region {}x{} at ({}, {}) is outside the {}x{} image",
            region.width, region.height, region.left, region.top, dims.width, dims.height
        )))
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Plan a resize step without executing it.
///
/// Returns `None` when the step is a no-op (`without_enlargement` on an
/// image already smaller than the resample target).
pub fn plan_resize(source: (u32, u32), options: &ResizeOptions) -> Option<ResizeParams> {
    let target = resolve_target(source, options.width, options.height);

    // With one side derived from the aspect ratio every fit mode agrees.
    let fit = if options.width.is_some() && options.height.is_some() {
        options.fit
    } else {
        Fit::Fill
    };

    let params = match fit {
        Fit::Fill => ResizeParams {
            width: target.0,
            height: target.1,
            reframe: Reframe::None,
        },
        Fit::Inside | Fit::Outside => {
            let (width, height) = if fit == Fit::Inside {
                calculate_fit_dimensions(source, target)
            } else {
                calculate_fill_dimensions(source, target)
            };
            ResizeParams {
                width,
                height,
                reframe: Reframe::None,
            }
        }
        Fit::Cover => {
            let (width, height) = calculate_fill_dimensions(source, target);
            let free = (width - target.0, height - target.1);
            let reframe = if free == (0, 0) {
                Reframe::None
            } else {
                let anchor = match options.position {
                    Position::Entropy => CropAnchor::Entropy,
                    position => {
                        let (left, top) = gravity_offset(free, position);
                        CropAnchor::At { left, top }
                    }
                };
                Reframe::Crop(CropPlan {
                    width: target.0,
                    height: target.1,
                    anchor,
                })
            };
            ResizeParams {
                width,
                height,
                reframe,
            }
        }
        Fit::Contain => {
            let (width, height) = calculate_fit_dimensions(source, target);
            let free = (target.0 - width, target.1 - height);
            let reframe = if free == (0, 0) {
                Reframe::None
            } else {
                let (left, top) = gravity_offset(free, options.position);
                Reframe::Embed(EmbedPlan {
                    width: target.0,
                    height: target.1,
                    left,
                    top,
                    background: options.background.unwrap_or_default().to_rgba8(),
                })
            };
            ResizeParams {
                width,
                height,
                reframe,
            }
        }
    };

    if options.without_enlargement && (params.width > source.0 || params.height > source.1) {
        return None;
    }
    Some(params)
}

// =============================================================================
// Execution
// =============================================================================

fn create_metadata(spec: &CreateSpec) -> ImageMetadata {
    ImageMetadata {
        format: "raw".to_string(),
        size: None,
        width: spec.width,
        height: spec.height,
        channels: spec.channels,
        has_alpha: spec.channels == 4,
    }
}

/// Run a full request against the backend.
///
/// Operations are validated up front, then applied in insertion order. The
/// output encoder is the last format operation, else the decoded container's
/// format, else PNG. A metadata request validates the operations but reports
/// the untouched source.
pub fn execute(
    backend: &impl ImageBackend,
    input: Input<'_>,
    options: &RequestOptions,
    limits: SizeLimits,
) -> Result<Processed> {
    let requested = validate_operations(&options.operations, limits)?;
    if let Input::Create(spec) = input {
        validate_create_spec(spec, limits)?;
    }

    if options.output == OutputKind::Metadata {
        let metadata = match input {
            Input::Upload(bytes) => backend.identify(bytes)?,
            Input::Create(spec) => create_metadata(spec),
        };
        return Ok(Processed::Metadata(metadata));
    }

    let (mut image, source_format) = match input {
        Input::Upload(bytes) => {
            let decoded = backend.decode(bytes)?;
            (decoded.image, output_format_for(decoded.format))
        }
        Input::Create(spec) => (backend.create(&CanvasParams::from(spec))?, None),
    };

    for op in &options.operations {
        match op {
            Operation::Resize(resize) => {
                let dims = Dimensions::of(&image);
                let Some(params) = plan_resize(dims.as_tuple(), resize) else {
                    continue;
                };
                check_dimension("resampled width", params.width, limits.max_dimension)?;
                check_dimension("resampled height", params.height, limits.max_dimension)?;
                check_area("resampled image", params.width, params.height, limits)?;
                image = backend.resize(&image, &params)?;
            }
            Operation::Extract(region) => {
                check_region(region, Dimensions::of(&image))?;
                image = backend.extract(&image, region)?;
            }
            Operation::Format { .. } => {}
        }
    }

    let params = requested
        .unwrap_or_else(|| EncodeParams::new(source_format.unwrap_or(OutputFormat::Png)));
    let encoded = backend.encode(&image, &params)?;

    let info = OutputInfo {
        format: params.format.as_str().to_string(),
        size: encoded.data.len() as u64,
        width: encoded.width,
        height: encoded.height,
        channels: encoded.channels,
        premultiplied: false,
    };
    Ok(Processed::Buffer {
        data: encoded.data,
        info,
    })
}
