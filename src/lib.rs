//! # lipo
//!
//! Chainable image processing where the pixels are pushed around somewhere
//! else. A client builds a pipeline locally; each terminal call sends the
//! source and the queued operations to a lipo server as **one** multipart
//! request, and the server decodes, transforms and encodes the image.
//!
//! ```no_run
//! use lipo::{ClientConfig, Lipo};
//!
//! # fn main() -> Result<(), lipo::LipoError> {
//! let lipo = Lipo::new(ClientConfig::new("http://127.0.0.1:3000"))?;
//! let info = lipo.input("photo.jpg").resize(300, 300).to_file_sync("thumb.webp")?;
//! assert_eq!((info.width, info.height), (300, 300));
//! # Ok(())
//! # }
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`client`] | Pipeline builder, transport, result materializer |
//! | [`protocol`] | Wire types shared by both sides: operations, options, envelopes, error codes |
//! | [`server`] | warp endpoint: multipart limits, engine pool, request ids |
//! | [`imaging`] | Decode, resize, extract and encode with the `image` crate |
//! | [`cache`] | Content-addressed result cache for identical requests |
//! | [`config`] | `lipo.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Request Per Terminal Call
//!
//! Chain methods only append to an in-memory list. Nothing touches the
//! network until `to_file`, `to_buffer`, `to_buffer_with_info` or `metadata`
//! is called, and then the whole pipeline travels at once. Builders are
//! immutable snapshots, so the same builder can be executed any number of
//! times, sequentially or concurrently.
//!
//! ## Three Calling Conventions, One Primitive
//!
//! Every terminal exists as an `async fn`, a blocking `*_sync` and a
//! `*_callback` variant. All three run the same future on the client's
//! transport runtime and return the same [`LipoError`].
//!
//! ## JSON Envelope Responses
//!
//! Results come back as JSON with base64 image data, so bytes and their
//! [`OutputInfo`](protocol::OutputInfo) always arrive together and errors
//! share one shape.
//!
//! ## Format Selection
//!
//! If several format operations are queued the last one wins. `to_file`
//! without one infers the format from the path's extension.

pub mod cache;
pub mod client;
pub mod config;
pub mod imaging;
pub mod output;
pub mod protocol;
pub mod server;

pub use client::{ClientConfig, Lipo, LipoError, Output, Pipeline, Source};

#[cfg(test)]
pub(crate) mod test_helpers;
