//! Locating and loading the compute module images on disk.

use std::fmt;
use std::path::Path;

use jpeg_turbo_core::{Codec, ModuleConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// The two builds of the compute module. Both expose the same ABI; the
/// optimized one has been through a size/speed optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    Untouched,
    Optimized,
}

impl Variant {
    /// Every variant, for loading them side by side.
    pub const ALL: [Variant; 2] = [Variant::Untouched, Variant::Optimized];

    /// File name of this variant's module image.
    pub fn file_name(self) -> &'static str {
        match self {
            Variant::Untouched => "jpeg-turbo.wasm",
            Variant::Optimized => "jpeg-turbo_opt.wasm",
        }
    }

    /// Load this variant from `dir`. Each call produces an independent
    /// instance with its own memory.
    pub fn load(self, dir: impl AsRef<Path>, config: &ModuleConfig) -> Result<Codec> {
        open(dir.as_ref().join(self.file_name()), config)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Untouched => write!(f, "untouched"),
            Variant::Optimized => write!(f, "optimized"),
        }
    }
}

/// Read a module image from disk and load it.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read and
/// `Error::Codec(CodecError::ModuleLoadFailure)` if it is not a usable module.
pub fn open(path: impl AsRef<Path>, config: &ModuleConfig) -> Result<Codec> {
    let path = path.as_ref();
    let image = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = image.len(), "read module image");

    Ok(Codec::new(&image, config)?)
}
