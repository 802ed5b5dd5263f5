//! Scoped ownership of module-side resources for a single codec call.

use tracing::warn;

use crate::error::{CodecError, Purpose};
use crate::memory::{Handle, HandleKind, MemoryBridge, Pointer};
use crate::module::ModuleInstance;

/// A resource inside the module that must be given back before the call
/// returns, together with the function that gives it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    /// Released with `free`.
    Buffer(Pointer),
    /// Released with `tjDestroy`.
    Handle(Handle),
    /// Allocated by the module itself, released with `tjFree`.
    ModuleBuffer(Pointer),
}

/// Tracks every buffer and handle acquired during one encode or decode.
///
/// Resources can be released early as soon as their data is consumed.
/// Whatever is still held when the scope is dropped is released in
/// acquisition order, so every exit path (including `?` on an error) leaves
/// the module allocator where it started.
pub struct AllocationScope<'m> {
    module: &'m mut ModuleInstance,
    held: Vec<Held>,
}

impl<'m> AllocationScope<'m> {
    pub(crate) fn new(module: &'m mut ModuleInstance) -> Self {
        Self {
            module,
            held: Vec::new(),
        }
    }

    /// Allocate a buffer owned by this scope.
    pub fn allocate(&mut self, size: u64, purpose: Purpose) -> Result<Pointer, CodecError> {
        let ptr = self.module.memory().allocate(size, purpose)?;
        self.held.push(Held::Buffer(ptr));
        Ok(ptr)
    }

    /// Release a buffer obtained from [`allocate`](Self::allocate).
    pub fn release(&mut self, ptr: Pointer) -> Result<(), CodecError> {
        self.forget(Held::Buffer(ptr))?;
        self.module.memory().release(ptr)
    }

    /// Create a compressor or decompressor handle owned by this scope.
    pub fn init_handle(&mut self, kind: HandleKind) -> Result<Handle, CodecError> {
        let handle = self.module.init_handle(kind)?;
        self.held.push(Held::Handle(handle));
        Ok(handle)
    }

    /// Destroy a handle obtained from [`init_handle`](Self::init_handle).
    pub fn destroy(&mut self, handle: Handle) -> Result<(), CodecError> {
        self.forget(Held::Handle(handle))?;
        self.module.destroy_handle(handle)
    }

    /// Take ownership of a buffer the module allocated itself.
    pub fn adopt_module_buffer(&mut self, ptr: Pointer) {
        if !ptr.is_null() {
            self.held.push(Held::ModuleBuffer(ptr));
        }
    }

    /// Free an adopted module buffer through `tjFree`.
    pub fn free_module_buffer(&mut self, ptr: Pointer) -> Result<(), CodecError> {
        if ptr.is_null() {
            return Ok(());
        }
        self.forget(Held::ModuleBuffer(ptr))?;
        self.module.free_module_buffer(ptr)
    }

    pub fn memory(&mut self) -> &mut MemoryBridge {
        self.module.memory()
    }

    pub(crate) fn module(&mut self) -> &mut ModuleInstance {
        &mut *self.module
    }

    /// Number of resources still held.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    fn forget(&mut self, item: Held) -> Result<(), CodecError> {
        match self.held.iter().position(|held| *held == item) {
            Some(index) => {
                self.held.remove(index);
                Ok(())
            }
            None => {
                let ptr = match item {
                    Held::Buffer(ptr) | Held::ModuleBuffer(ptr) => ptr,
                    Held::Handle(handle) => handle.pointer(),
                };
                Err(CodecError::UnknownPointer(ptr.addr()))
            }
        }
    }

    fn give_back(&mut self, item: Held) -> Result<(), CodecError> {
        match item {
            Held::Buffer(ptr) => self.module.memory().release(ptr),
            Held::Handle(handle) => self.module.destroy_handle(handle),
            Held::ModuleBuffer(ptr) => self.module.free_module_buffer(ptr),
        }
    }
}

impl Drop for AllocationScope<'_> {
    fn drop(&mut self) {
        let held = std::mem::take(&mut self.held);
        for item in held {
            if let Err(err) = self.give_back(item) {
                warn!(?item, error = %err, "failed to release module resource");
            }
        }
    }
}
