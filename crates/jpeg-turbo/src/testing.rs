//! Test helpers backed by the mock compute module.

use jpeg_turbo_core::{Codec, ImageBuffer, ModuleConfig};

pub(crate) fn mock_image() -> Vec<u8> {
    jpeg_turbo_core::mock::mock_image().expect("mock module should assemble")
}

pub(crate) fn mock_codec() -> Codec {
    Codec::new(&mock_image(), &ModuleConfig::default()).expect("mock module should load")
}

/// A small RGBA checkerboard.
pub(crate) fn sample_image() -> ImageBuffer {
    let (width, height) = (6u32, 4u32);
    let pixels = (0..width * height)
        .flat_map(|i| {
            if (i % width + i / width) % 2 == 0 {
                [255u8, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        })
        .collect();
    ImageBuffer::new(width, height, pixels)
}
