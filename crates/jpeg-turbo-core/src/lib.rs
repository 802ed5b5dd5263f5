//! JPEG Turbo Core - host side of a sandboxed libjpeg-turbo module
//!
//! This crate loads a WebAssembly build of libjpeg-turbo into a sandbox and
//! drives its TurboJPEG entry points: every call copies the caller's bytes
//! into module memory, invokes the module, copies the result back out and
//! frees every module-side allocation it made, on success and failure alike.
//!
//! The building blocks, bottom-up:
//!
//! - [`ModuleInstance`] loads and links the module, answering its `env` and
//!   WASI imports with stubs.
//! - [`MemoryBridge`] allocates, frees, reads and writes module memory.
//! - [`AllocationScope`] releases anything a call still holds when it ends.
//! - [`decode`] and [`encode`] implement the codec operations; [`Codec`]
//!   bundles an instance with encoder settings.

pub mod codec;
pub mod decode;
pub mod encode;
pub mod error;
pub mod memory;
pub mod module;
pub mod scope;

#[cfg(any(test, feature = "mock-module"))]
pub mod mock;

#[cfg(test)]
mod testing;

pub use codec::Codec;
pub use decode::{
    decode_jpeg, inspect_jpeg, Colorspace, DecodeMetadata, ImageBuffer, Subsampling,
    BYTES_PER_PIXEL,
};
pub use encode::{encode_jpeg, EncodeConfig};
pub use error::{CodecError, Purpose};
pub use memory::{Handle, HandleKind, MemoryBridge, Pointer, WORD_SIZE};
pub use module::{ModuleConfig, ModuleInstance};
pub use scope::AllocationScope;
