//! Errors raised by the facade.

use std::path::PathBuf;

use jpeg_turbo_core::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read module image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, Error>;
