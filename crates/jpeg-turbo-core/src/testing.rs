//! Helpers for driving the mock compute module in tests.

use crate::decode::ImageBuffer;
use crate::module::{ModuleConfig, ModuleInstance};

/// Binary image of the mock module.
pub(crate) fn mock_image() -> Vec<u8> {
    crate::mock::mock_image().expect("mock module should assemble")
}

pub(crate) fn mock_module() -> ModuleInstance {
    ModuleInstance::load(&mock_image(), &ModuleConfig::default())
        .expect("mock module should load")
}

/// Mock module whose linear memory may not grow past `max_memory_bytes`.
pub(crate) fn capped_module(max_memory_bytes: usize) -> ModuleInstance {
    let config = ModuleConfig {
        max_memory_bytes: Some(max_memory_bytes),
    };
    ModuleInstance::load(&mock_image(), &config).expect("capped mock module should load")
}

/// Allocations the mock's allocator considers live.
pub(crate) fn live_allocations(module: &mut ModuleInstance) -> i32 {
    module
        .call_export("live_allocations", ())
        .expect("live_allocations export")
}

/// Make `tjInitCompress`/`tjInitDecompress` return the null handle.
pub(crate) fn set_fail_init(module: &mut ModuleInstance, fail: bool) {
    module
        .call_export::<i32, ()>("set_fail_init", i32::from(fail))
        .expect("set_fail_init export");
}

/// Let only the next `budget` allocations succeed; -1 lifts the limit.
/// Handle creation allocates too.
pub(crate) fn set_malloc_budget(module: &mut ModuleInstance, budget: i32) {
    module
        .call_export::<i32, ()>("set_malloc_budget", budget)
        .expect("set_malloc_budget export");
}

pub(crate) const ABORT_HEADER: i32 = 1;
pub(crate) const ABORT_DECOMPRESS: i32 = 2;
pub(crate) const ABORT_COMPRESS: i32 = 4;

/// Make the selected codec entry points `longjmp` out.
pub(crate) fn set_abort(module: &mut ModuleInstance, mask: i32) {
    module
        .call_export::<i32, ()>("set_abort", mask)
        .expect("set_abort export");
}

/// Make `tjCompress2` report an output size past the end of memory.
pub(crate) fn set_oversize_output(module: &mut ModuleInstance, on: bool) {
    module
        .call_export::<i32, ()>("set_oversize_output", i32::from(on))
        .expect("set_oversize_output export");
}

/// The mock's container: `FF D8`, width, height, RGBA pixels, `FF D9`.
pub(crate) fn mock_jpeg(image: &ImageBuffer) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(image.pixels.len() + 12);
    bytes.extend_from_slice(&[0xFF, 0xD8]);
    bytes.extend_from_slice(&image.width.to_le_bytes());
    bytes.extend_from_slice(&image.height.to_le_bytes());
    bytes.extend_from_slice(&image.pixels);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

/// Deterministic RGBA gradient.
pub(crate) fn gradient(width: u32, height: u32) -> ImageBuffer {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x * 255 / width.max(1)) as u8);
            pixels.push((y * 255 / height.max(1)) as u8);
            pixels.push(((x + y) % 256) as u8);
            pixels.push(255);
        }
    }
    ImageBuffer::new(width, height, pixels)
}
