//! A module instance paired with encoder settings.

use crate::decode::{self, DecodeMetadata, ImageBuffer};
use crate::encode::{self, EncodeConfig};
use crate::error::CodecError;
use crate::module::{ModuleConfig, ModuleInstance};

/// JPEG codec backed by one compute module instance.
///
/// Calls take `&mut self`: the module has no internal concurrency control,
/// so one instance runs at most one call at a time. Wrap it in a mutex (or
/// keep one per thread) to share it.
pub struct Codec {
    module: ModuleInstance,
    config: EncodeConfig,
}

impl Codec {
    /// Load a module image and use the default encoder settings
    /// (quality 100, 4:4:4).
    pub fn new(image: &[u8], module_config: &ModuleConfig) -> Result<Self, CodecError> {
        Ok(Self::from_instance(ModuleInstance::load(image, module_config)?))
    }

    pub fn from_instance(module: ModuleInstance) -> Self {
        Self {
            module,
            config: EncodeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EncodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EncodeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EncodeConfig) {
        self.config = config;
    }

    /// Decode a JPEG stream to RGBA.
    pub fn decode(&mut self, source: &[u8]) -> Result<ImageBuffer, CodecError> {
        decode::decode_jpeg(&mut self.module, source)
    }

    /// Read a JPEG header without decoding scan data.
    pub fn inspect(&mut self, source: &[u8]) -> Result<DecodeMetadata, CodecError> {
        decode::inspect_jpeg(&mut self.module, source)
    }

    /// Encode with this codec's settings.
    pub fn encode(&mut self, image: &ImageBuffer) -> Result<Vec<u8>, CodecError> {
        let config = self.config;
        encode::encode_jpeg(&mut self.module, image, &config)
    }

    /// Encode with explicit settings.
    pub fn encode_with(
        &mut self,
        image: &ImageBuffer,
        config: &EncodeConfig,
    ) -> Result<Vec<u8>, CodecError> {
        encode::encode_jpeg(&mut self.module, image, config)
    }

    /// Host-side count of module allocations not yet released. Zero
    /// between calls.
    pub fn outstanding_allocations(&mut self) -> usize {
        self.module.memory().outstanding()
    }

    pub fn module_mut(&mut self) -> &mut ModuleInstance {
        &mut self.module
    }

    pub fn into_module(self) -> ModuleInstance {
        self.module
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
