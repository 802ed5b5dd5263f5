//! Core types for image decoding and encoding.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Bytes per pixel of the only supported pixel format (RGBA, 8 bits/channel).
pub const BYTES_PER_PIXEL: u32 = 4;

/// Chroma subsampling, using TurboJPEG's `TJSAMP_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Subsampling {
    /// 4:4:4, no chroma subsampling.
    #[default]
    S444,
    /// 4:2:2, chroma halved horizontally.
    S422,
    /// 4:2:0, chroma halved in both directions.
    S420,
    /// Grayscale, no chroma planes.
    Gray,
    /// 4:4:0, chroma halved vertically.
    S440,
    /// 4:1:1, chroma quartered horizontally.
    S411,
    /// A code this crate does not know about.
    Unknown(u32),
}

impl Subsampling {
    /// The `TJSAMP_*` value passed to and returned by the module.
    pub fn code(self) -> u32 {
        match self {
            Subsampling::S444 => 0,
            Subsampling::S422 => 1,
            Subsampling::S420 => 2,
            Subsampling::Gray => 3,
            Subsampling::S440 => 4,
            Subsampling::S411 => 5,
            Subsampling::Unknown(code) => code,
        }
    }
}

impl From<u32> for Subsampling {
    fn from(value: u32) -> Self {
        match value {
            0 => Subsampling::S444,
            1 => Subsampling::S422,
            2 => Subsampling::S420,
            3 => Subsampling::Gray,
            4 => Subsampling::S440,
            5 => Subsampling::S411,
            other => Subsampling::Unknown(other),
        }
    }
}

/// JPEG colorspace, using TurboJPEG's `TJCS_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Colorspace {
    Rgb,
    YCbCr,
    Gray,
    Cmyk,
    Ycck,
    Unknown(u32),
}

impl From<u32> for Colorspace {
    fn from(value: u32) -> Self {
        match value {
            0 => Colorspace::Rgb,
            1 => Colorspace::YCbCr,
            2 => Colorspace::Gray,
            3 => Colorspace::Cmyk,
            4 => Colorspace::Ycck,
            other => Colorspace::Unknown(other),
        }
    }
}

/// Header information reported by `tjDecompressHeader3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeMetadata {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Chroma subsampling of the stream.
    pub subsampling: Subsampling,
    /// Colorspace of the stream.
    pub colorspace: Colorspace,
}

impl DecodeMetadata {
    /// Size of the RGBA buffer a full decode produces.
    pub fn decoded_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(BYTES_PER_PIXEL)
    }
}

/// An image with RGBA pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGBA pixel data in row-major order (4 bytes per pixel, no row padding).
    /// Length should be width * height * 4.
    pub pixels: Vec<u8>,
}

impl ImageBuffer {
    /// Create a new ImageBuffer with the given dimensions and pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len() as u64,
            expected_len(width, height),
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Create an ImageBuffer from an image::RgbaImage.
    pub fn from_rgba_image(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let pixels = img.into_raw();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Convert to an image::RgbaImage for further processing.
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// Get the total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Get the size of the pixel buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Check if this is an empty/invalid image.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }

    /// Check that the image can be handed to the encoder.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::InvalidDimensions` if either dimension is zero and
    /// `CodecError::InvalidPixelData` if the buffer is not exactly
    /// `width * height * 4` bytes.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let expected = expected_len(self.width, self.height);
        if self.pixels.len() as u64 != expected {
            return Err(CodecError::InvalidPixelData {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

fn expected_len(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height) * u64::from(BYTES_PER_PIXEL)
}
