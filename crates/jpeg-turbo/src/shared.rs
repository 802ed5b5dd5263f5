//! A codec that can be shared between threads.

use std::sync::Arc;

use jpeg_turbo_core::{Codec, CodecError, DecodeMetadata, ImageBuffer};
use parking_lot::Mutex;

/// Cloneable handle to one [`Codec`]. Calls from any clone are serialized,
/// so at most one operation runs in the module at a time.
#[derive(Clone)]
pub struct SharedCodec {
    inner: Arc<Mutex<Codec>>,
}

impl SharedCodec {
    pub fn new(codec: Codec) -> Self {
        Self {
            inner: Arc::new(Mutex::new(codec)),
        }
    }

    pub fn decode(&self, source: &[u8]) -> Result<ImageBuffer, CodecError> {
        self.inner.lock().decode(source)
    }

    pub fn encode(&self, image: &ImageBuffer) -> Result<Vec<u8>, CodecError> {
        self.inner.lock().encode(image)
    }

    pub fn inspect(&self, source: &[u8]) -> Result<DecodeMetadata, CodecError> {
        self.inner.lock().inspect(source)
    }

    /// Run `f` with exclusive access to the codec.
    pub fn with<R>(&self, f: impl FnOnce(&mut Codec) -> R) -> R {
        let mut codec = self.inner.lock();
        f(&mut *codec)
    }
}

impl From<Codec> for SharedCodec {
    fn from(codec: Codec) -> Self {
        Self::new(codec)
    }
}
