//! JPEG decoding through `tjDecompressHeader3` and `tjDecompress2`.

use tracing::debug;

use super::{Colorspace, DecodeMetadata, ImageBuffer, Subsampling};
use crate::error::{CodecError, Purpose};
use crate::memory::{Handle, HandleKind, Pointer, WORD_SIZE};
use crate::module::ModuleInstance;
use crate::scope::AllocationScope;

/// Width, height, subsampling and colorspace.
const METADATA_WORDS: u32 = 4;

/// Decode a JPEG stream to RGBA pixels.
///
/// # Arguments
///
/// * `module` - The compute module to run the decoder in
/// * `source` - Complete JPEG stream
///
/// # Returns
///
/// An `ImageBuffer` with `width * height * 4` bytes of tightly packed RGBA.
///
/// # Errors
///
/// Returns `CodecError::AllocationFailure` if any module-side buffer or the
/// decompressor cannot be allocated, `CodecError::HeaderDecodeFailure` if the
/// header is rejected and `CodecError::DataDecodeFailure` if the scan data is.
/// Every module-side allocation is released before returning, on all paths.
pub fn decode_jpeg(module: &mut ModuleInstance, source: &[u8]) -> Result<ImageBuffer, CodecError> {
    let mut scope = module.scope();

    let (input, input_len) = stage_source(&mut scope, source)?;
    let handle = scope.init_handle(HandleKind::Decompressor)?;
    let metadata = read_header(&mut scope, handle, input, input_len)?;
    let (width, height) = (metadata.width, metadata.height);

    let output_size = metadata.decoded_size();
    let output = scope.allocate(output_size, Purpose::DecodedPixels)?;

    let status = scope
        .module()
        .decompress(handle, input, input_len, output, width, height)
        .map_err(CodecError::aborted_as(
            CodecError::DataDecodeFailure,
            "tjDecompress2",
        ))?;

    // Neither the input nor the decompressor is needed past this point,
    // whatever the outcome.
    scope.release(input)?;
    scope.destroy(handle)?;

    if status != 0 {
        debug!(status, width, height, "tjDecompress2 failed");
        return Err(CodecError::DataDecodeFailure);
    }

    let pixels = scope.memory().read_bytes(output, output_size as usize)?;
    scope.release(output)?;

    debug!(width, height, source_bytes = source.len(), "decoded JPEG");
    Ok(ImageBuffer::new(width, height, pixels))
}

/// Read the header of a JPEG stream without decoding the scan data.
///
/// # Errors
///
/// Returns `CodecError::AllocationFailure` or `CodecError::HeaderDecodeFailure`.
pub fn inspect_jpeg(
    module: &mut ModuleInstance,
    source: &[u8],
) -> Result<DecodeMetadata, CodecError> {
    let mut scope = module.scope();

    let (input, input_len) = stage_source(&mut scope, source)?;
    let handle = scope.init_handle(HandleKind::Decompressor)?;
    let metadata = read_header(&mut scope, handle, input, input_len)?;

    scope.release(input)?;
    scope.destroy(handle)?;
    Ok(metadata)
}

/// Copy the caller's JPEG stream into module memory.
fn stage_source(
    scope: &mut AllocationScope<'_>,
    source: &[u8],
) -> Result<(Pointer, u32), CodecError> {
    let len = u32::try_from(source.len()).map_err(|_| CodecError::AllocationFailure {
        size: source.len() as u64,
        purpose: Purpose::SourceJpeg,
    })?;

    let input = scope.allocate(u64::from(len), Purpose::SourceJpeg)?;
    scope.memory().write_bytes(input, source)?;
    Ok((input, len))
}

/// Run `tjDecompressHeader3` and consume its four output words.
fn read_header(
    scope: &mut AllocationScope<'_>,
    handle: Handle,
    input: Pointer,
    input_len: u32,
) -> Result<DecodeMetadata, CodecError> {
    let words = scope.allocate(u64::from(METADATA_WORDS * WORD_SIZE), Purpose::Metadata)?;

    let status = scope
        .module()
        .decompress_header(handle, input, input_len, words)
        .map_err(CodecError::aborted_as(
            CodecError::HeaderDecodeFailure,
            "tjDecompressHeader3",
        ))?;
    if status != 0 {
        debug!(status, input_len, "tjDecompressHeader3 failed");
        return Err(CodecError::HeaderDecodeFailure);
    }

    let memory = scope.memory();
    let metadata = DecodeMetadata {
        width: memory.read_word(words.word(0))?,
        height: memory.read_word(words.word(1))?,
        subsampling: Subsampling::from(memory.read_word(words.word(2))?),
        colorspace: Colorspace::from(memory.read_word(words.word(3))?),
    };
    scope.release(words)?;

    // A header that parses but reports an empty image can't be decoded.
    if metadata.width == 0 || metadata.height == 0 {
        debug!(?metadata, "header reported empty image");
        return Err(CodecError::HeaderDecodeFailure);
    }
    Ok(metadata)
}
