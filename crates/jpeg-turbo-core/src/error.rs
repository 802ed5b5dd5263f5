//! Error taxonomy for the module bridge.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// What an allocation inside the compute module was for.
///
/// Carried by [`CodecError::AllocationFailure`] so a failed request can be
/// traced back to the step that made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    /// Copy of the caller's JPEG stream.
    SourceJpeg,
    /// Four header words (width, height, subsampling, colorspace).
    Metadata,
    /// RGBA output of a full decode.
    DecodedPixels,
    /// Copy of the caller's RGBA pixels.
    SourcePixels,
    /// Output address and output size words for the compressor.
    OutputWords,
    /// Decompressor handle.
    Decompressor,
    /// Compressor handle.
    Compressor,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Purpose::SourceJpeg => "input buffer",
            Purpose::Metadata => "metadata",
            Purpose::DecodedPixels => "output",
            Purpose::SourcePixels => "input pixels",
            Purpose::OutputWords => "output offset & size pointers",
            Purpose::Decompressor => "decompressor",
            Purpose::Compressor => "compressor",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while loading or driving the compute module.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The module image is malformed or its imports/exports do not match
    /// the expected ABI.
    #[error("Failed to load compute module: {0}")]
    ModuleLoadFailure(String),

    /// The module invoked a syscall the host does not provide.
    #[error("Syscall {0} not implemented")]
    UnsupportedSyscall(String),

    /// The module tried to unwind through `longjmp`.
    #[error("Non-local control flow (longjmp) is not supported")]
    UnsupportedControlFlow,

    /// The module allocator returned the null sentinel, or the request
    /// cannot be expressed as a 32-bit module size.
    #[error("Failed to allocate {purpose} ({size} bytes)")]
    AllocationFailure { size: u64, purpose: Purpose },

    /// `tjDecompressHeader3` rejected the stream.
    #[error("Failed to decode JPEG header")]
    HeaderDecodeFailure,

    /// `tjDecompress2` rejected the stream.
    #[error("Failed to decode JPEG data")]
    DataDecodeFailure,

    /// `tjCompress2` failed.
    #[error("Failed to encode JPEG data")]
    DataEncodeFailure,

    /// Width or height is zero.
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// Pixel data length doesn't match expected dimensions.
    #[error("Invalid pixel data: expected {expected} bytes (width * height * 4), got {actual}")]
    InvalidPixelData { expected: u64, actual: usize },

    /// A read or write fell outside the module's current linear memory.
    #[error("Memory access out of bounds: offset {offset:#x}, length {len}")]
    OutOfBounds { offset: u32, len: usize },

    /// A word access was not 4-byte aligned.
    #[error("Misaligned word access at offset {0:#x}")]
    MisalignedWord(u32),

    /// Release of a pointer the bridge does not currently hold.
    #[error("Pointer {0:#x} is not a live allocation")]
    UnknownPointer(u32),

    /// The module trapped for a reason other than a host stub.
    #[error("Compute module trapped: {0}")]
    Trap(String),
}

impl CodecError {
    /// Translate an error returned by a module call.
    ///
    /// Host stubs raise `CodecError` values inside the runtime; those come
    /// back out intact. Anything else is a genuine trap.
    pub(crate) fn from_call(err: wasmtime::Error) -> Self {
        match err.downcast::<CodecError>() {
            Ok(err) => err,
            Err(err) => CodecError::Trap(format!("{err:#}")),
        }
    }

    /// Report an aborted codec entry point as `kind`.
    ///
    /// libjpeg bails out of a bad stream through `longjmp`, which reaches
    /// the host as a stub failure or trap. Callers of decode and encode only
    /// ever see the operation's own failure kind.
    pub(crate) fn aborted_as(
        kind: CodecError,
        entry: &'static str,
    ) -> impl FnOnce(CodecError) -> CodecError {
        move |err| {
            warn!(entry, error = %err, "module call aborted");
            kind
        }
    }

    pub(crate) fn load(context: &str, err: impl fmt::Display) -> Self {
        CodecError::ModuleLoadFailure(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_failure_display() {
        let err = CodecError::AllocationFailure {
            size: 4096,
            purpose: Purpose::DecodedPixels,
        };
        assert_eq!(err.to_string(), "Failed to allocate output (4096 bytes)");
    }

    #[test]
    fn test_syscall_display() {
        let err = CodecError::UnsupportedSyscall("fd_write".to_string());
        assert_eq!(err.to_string(), "Syscall fd_write not implemented");
    }

    #[test]
    fn test_from_call_recovers_stub_error() {
        let raised = wasmtime::Error::new(CodecError::UnsupportedControlFlow);
        let raised = raised.context("wasm backtrace");
        assert!(matches!(
            CodecError::from_call(raised),
            CodecError::UnsupportedControlFlow
        ));
    }

    #[test]
    fn test_aborted_as_replaces_kind() {
        let fold = CodecError::aborted_as(CodecError::HeaderDecodeFailure, "tjDecompressHeader3");
        assert!(matches!(
            fold(CodecError::UnsupportedControlFlow),
            CodecError::HeaderDecodeFailure
        ));

        let fold = CodecError::aborted_as(CodecError::DataEncodeFailure, "tjCompress2");
        assert!(matches!(
            fold(CodecError::Trap("unreachable".to_string())),
            CodecError::DataEncodeFailure
        ));
    }

    #[test]
    fn test_from_call_wraps_other_errors() {
        let err = CodecError::from_call(wasmtime::Error::msg("unreachable executed"));
        match err {
            CodecError::Trap(message) => assert!(message.contains("unreachable")),
            other => panic!("Expected Trap, got: {:?}", other),
        }
    }
}
