//! Image processing: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image` header read, no full decode |
//! | **Decode** | `image` decoders bounded by `Limits` |
//! | **Resize** | Lanczos3 + crop (gravity or entropy) or letterbox |
//! | **Extract** | `crop_imm` |
//! | **Encode** | JPEG / PNG / WebP / TIFF encoders |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Validation, planning and ordered execution of a request

pub mod backend;
mod calculations;
pub mod operations;
pub mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use operations::{Input, PipelineError, Processed, execute, plan_resize, validate_operations};
pub use params::{Compression, EncodeParams, Quality, SizeLimits};
pub use rust_backend::RustBackend;
