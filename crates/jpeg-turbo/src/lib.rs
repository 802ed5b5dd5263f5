//! JPEG Turbo - JPEG encode/decode through a sandboxed libjpeg-turbo module
//!
//! This crate is the host-facing entry point. It finds the compute module
//! images on disk, loads them into [`Codec`]s and offers a thread-shareable
//! [`SharedCodec`]. The bridge itself lives in `jpeg-turbo-core` and is
//! re-exported here.
//!
//! # Usage
//!
//! ```ignore
//! use jpeg_turbo::{ModuleConfig, Variant};
//!
//! let mut codec = Variant::Optimized.load("fixtures", &ModuleConfig::default())?;
//! let image = codec.decode(&std::fs::read("photo.jpg")?)?;
//! let jpeg = codec.encode(&image)?;
//! ```

mod error;
mod shared;
mod variant;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use shared::SharedCodec;
pub use variant::{open, Variant};

pub use jpeg_turbo_core::{
    AllocationScope, Codec, CodecError, Colorspace, DecodeMetadata, EncodeConfig, ImageBuffer,
    ModuleConfig, ModuleInstance, Purpose, Subsampling,
};

/// Version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
