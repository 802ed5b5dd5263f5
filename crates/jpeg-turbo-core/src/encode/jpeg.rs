//! JPEG encoding through `tjCompress2`.
//!
//! The module allocates the output buffer itself: the caller passes an
//! output-address word initialised to zero and reads back the address and
//! size the compressor wrote. That buffer belongs to TurboJPEG and is
//! returned with `tjFree`, never with the general allocator.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decode::{ImageBuffer, Subsampling};
use crate::error::{CodecError, Purpose};
use crate::memory::{HandleKind, Pointer, WORD_SIZE};
use crate::module::ModuleInstance;

/// Output address and output size.
const OUTPUT_WORDS: u32 = 2;

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// JPEG quality (1-100, where 100 is highest quality). Out-of-range
    /// values are clamped.
    pub quality: u8,
    /// Chroma subsampling of the output stream.
    pub subsampling: Subsampling,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            quality: 100,
            subsampling: Subsampling::S444,
        }
    }
}

/// Encode an RGBA image to JPEG bytes.
///
/// # Arguments
///
/// * `module` - The compute module to run the compressor in
/// * `image` - RGBA image, `width * height * 4` bytes, no row padding
/// * `config` - Quality and chroma subsampling
///
/// # Returns
///
/// A complete JPEG stream beginning with the SOI marker `FF D8`.
///
/// # Errors
///
/// Returns `CodecError::InvalidDimensions` / `CodecError::InvalidPixelData`
/// for malformed input, `CodecError::AllocationFailure` if a module-side
/// buffer or the compressor cannot be allocated, and
/// `CodecError::DataEncodeFailure` if compression fails.
pub fn encode_jpeg(
    module: &mut ModuleInstance,
    image: &ImageBuffer,
    config: &EncodeConfig,
) -> Result<Vec<u8>, CodecError> {
    image.validate()?;

    // Clamp quality to valid range (1-100)
    let quality = config.quality.clamp(1, 100);

    let mut scope = module.scope();

    let input = scope.allocate(image.pixels.len() as u64, Purpose::SourcePixels)?;
    scope.memory().write_bytes(input, &image.pixels)?;

    let words = scope.allocate(u64::from(OUTPUT_WORDS * WORD_SIZE), Purpose::OutputWords)?;
    let (output_addr, output_size) = (words.word(0), words.word(1));
    // A null output address asks the compressor to allocate the buffer.
    scope.memory().write_word(output_addr, 0)?;
    scope.memory().write_word(output_size, 0)?;

    let handle = scope.init_handle(HandleKind::Compressor)?;

    let status = scope
        .module()
        .compress(
            handle,
            input,
            image.width,
            image.height,
            output_addr,
            output_size,
            config.subsampling,
            quality,
        )
        .map_err(CodecError::aborted_as(
            CodecError::DataEncodeFailure,
            "tjCompress2",
        ))?;

    scope.release(input)?;
    scope.destroy(handle)?;

    if status != 0 {
        debug!(status, width = image.width, height = image.height, "tjCompress2 failed");
        return Err(CodecError::DataEncodeFailure);
    }

    // Owned by the scope from here on, whatever fails next.
    let output = Pointer::new(scope.memory().read_word(output_addr)?);
    scope.adopt_module_buffer(output);

    let len = scope.memory().read_word(output_size)?;
    scope.release(words)?;

    let jpeg = scope.memory().read_bytes(output, len as usize)?;
    scope.free_module_buffer(output)?;

    debug!(
        width = image.width,
        height = image.height,
        quality,
        subsampling = ?config.subsampling,
        jpeg_bytes = jpeg.len(),
        "encoded JPEG"
    );
    Ok(jpeg)
}
