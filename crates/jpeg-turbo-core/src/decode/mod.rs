//! JPEG decoding through the compute module.
//!
//! This module provides functionality for:
//! - Decoding JPEG streams to tightly packed RGBA
//! - Reading a JPEG header (dimensions, subsampling, colorspace) without
//!   decoding scan data
//!
//! # Architecture
//!
//! Each call is one complete allocate → write → invoke → read → free cycle
//! against a single [`ModuleInstance`](crate::ModuleInstance). All
//! operations are synchronous; nothing survives between calls except the
//! instance itself.
//!
//! # Examples
//!
//! ```ignore
//! use jpeg_turbo_core::{decode::decode_jpeg, ModuleConfig, ModuleInstance};
//!
//! let mut module = ModuleInstance::load(&wasm, &ModuleConfig::default())?;
//! let image = decode_jpeg(&mut module, &std::fs::read("photo.jpg")?)?;
//! println!("Decoded {}x{} image", image.width, image.height);
//! ```

mod jpeg;
mod types;

pub use jpeg::{decode_jpeg, inspect_jpeg};
pub use types::{Colorspace, DecodeMetadata, ImageBuffer, Subsampling, BYTES_PER_PIXEL};
