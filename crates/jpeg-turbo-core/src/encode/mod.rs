//! JPEG encoding through the compute module.
//!
//! This module provides functionality for:
//! - Encoding RGBA images to JPEG with configurable quality and subsampling
//!
//! # Examples
//!
//! ```ignore
//! use jpeg_turbo_core::encode::{encode_jpeg, EncodeConfig};
//!
//! let jpeg = encode_jpeg(&mut module, &image, &EncodeConfig::default())?;
//! assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
//! ```

mod jpeg;

pub use jpeg::{encode_jpeg, EncodeConfig};
