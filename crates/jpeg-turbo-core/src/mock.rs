//! The mock compute module used by this workspace's tests.
//!
//! It exports the same ABI as the libjpeg-turbo build but stores images in a
//! trivial lossless container (`FF D8`, width, height, RGBA pixels, `FF D9`).
//! Enabled by the `mock-module` feature.

use crate::error::CodecError;

/// WebAssembly text of the mock module.
pub const MOCK_WAT: &str = include_str!("../../../fixtures/mock-turbojpeg.wat");

/// Assemble the mock module into a binary image.
pub fn mock_image() -> Result<Vec<u8>, CodecError> {
    wat::parse_str(MOCK_WAT).map_err(|e| CodecError::load("mock module", e))
}
