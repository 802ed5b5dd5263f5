//! Typed access to the compute module's linear memory.
//!
//! All offset arithmetic over module memory lives here. Callers hold
//! [`Pointer`] values and go through [`MemoryBridge`] for every read and
//! write; the bridge re-resolves the memory view on each access because any
//! module call may grow (and thereby move) the underlying buffer.

use std::collections::HashSet;
use std::fmt;

use tracing::trace;
use wasmtime::{Memory, Store, TypedFunc};

use crate::error::{CodecError, Purpose};
use crate::module::ModuleState;

/// Size of a module-side word (wasm32 `int` / `unsigned long` / pointer).
pub const WORD_SIZE: u32 = 4;

/// A 32-bit offset into the module's linear memory.
///
/// `0` is the allocation-failure sentinel and never a valid allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer(u32);

impl Pointer {
    /// The allocation-failure sentinel.
    pub const NULL: Pointer = Pointer(0);

    pub fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Reinterpret a wasm `i32` return value as a pointer.
    pub(crate) fn from_raw(raw: i32) -> Self {
        Self(raw as u32)
    }

    /// The pointer as a wasm `i32` argument.
    pub(crate) fn as_raw(self) -> i32 {
        self.0 as i32
    }

    pub fn addr(self) -> u32 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Pointer `bytes` past this one. Saturates, so an overflowing offset
    /// lands out of bounds instead of wrapping into valid memory.
    pub fn offset(self, bytes: u32) -> Self {
        Self(self.0.saturating_add(bytes))
    }

    /// Pointer to the `index`-th word of a word array starting here.
    pub fn word(self, index: u32) -> Self {
        self.offset(index.saturating_mul(WORD_SIZE))
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Which init function produced a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Decompressor,
    Compressor,
}

impl HandleKind {
    pub(crate) fn purpose(self) -> Purpose {
        match self {
            HandleKind::Decompressor => Purpose::Decompressor,
            HandleKind::Compressor => Purpose::Compressor,
        }
    }
}

/// An opaque, non-null compressor or decompressor context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    ptr: Pointer,
    kind: HandleKind,
}

impl Handle {
    pub(crate) fn new(ptr: Pointer, kind: HandleKind) -> Self {
        Self { ptr, kind }
    }

    pub fn pointer(self) -> Pointer {
        self.ptr
    }

    pub fn kind(self) -> HandleKind {
        self.kind
    }
}

/// The module's linear memory plus its exported allocator.
///
/// Allocation goes through the module's own `malloc`/`free` so the module
/// owns the arena. The bridge keeps a ledger of the pointers it handed out;
/// releasing anything not in the ledger is refused rather than forwarded to
/// the module allocator.
pub struct MemoryBridge {
    store: Store<ModuleState>,
    memory: Memory,
    malloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
    live: HashSet<Pointer>,
}

impl MemoryBridge {
    pub(crate) fn new(
        store: Store<ModuleState>,
        memory: Memory,
        malloc: TypedFunc<i32, i32>,
        free: TypedFunc<i32, ()>,
    ) -> Self {
        Self {
            store,
            memory,
            malloc,
            free,
            live: HashSet::new(),
        }
    }

    pub(crate) fn store_mut(&mut self) -> &mut Store<ModuleState> {
        &mut self.store
    }

    /// Allocate `size` bytes with the module allocator.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::AllocationFailure` if the allocator returns the
    /// sentinel or `size` does not fit a 32-bit module size.
    pub fn allocate(&mut self, size: u64, purpose: Purpose) -> Result<Pointer, CodecError> {
        let request =
            u32::try_from(size).map_err(|_| CodecError::AllocationFailure { size, purpose })?;

        let raw = self
            .malloc
            .call(&mut self.store, request as i32)
            .map_err(CodecError::from_call)?;

        let ptr = Pointer::from_raw(raw);
        if ptr.is_null() {
            trace!(size, %purpose, "module allocator returned null");
            return Err(CodecError::AllocationFailure { size, purpose });
        }

        self.live.insert(ptr);
        trace!(%ptr, size, %purpose, "allocated");
        Ok(ptr)
    }

    /// Return a pointer to the module allocator. The sentinel is a no-op.
    pub fn release(&mut self, ptr: Pointer) -> Result<(), CodecError> {
        if ptr.is_null() {
            return Ok(());
        }
        if !self.live.remove(&ptr) {
            return Err(CodecError::UnknownPointer(ptr.addr()));
        }

        trace!(%ptr, "released");
        self.free
            .call(&mut self.store, ptr.as_raw())
            .map_err(CodecError::from_call)
    }

    /// Copy `len` bytes out of module memory.
    pub fn read_bytes(&self, ptr: Pointer, len: usize) -> Result<Vec<u8>, CodecError> {
        let (start, end) = self.bounds(ptr, len)?;
        Ok(self.memory.data(&self.store)[start..end].to_vec())
    }

    /// Copy `bytes` into module memory at `ptr`.
    pub fn write_bytes(&mut self, ptr: Pointer, bytes: &[u8]) -> Result<(), CodecError> {
        let (start, end) = self.bounds(ptr, bytes.len())?;
        self.memory.data_mut(&mut self.store)[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a little-endian `u32` from a 4-byte aligned offset.
    pub fn read_word(&self, ptr: Pointer) -> Result<u32, CodecError> {
        let (start, end) = self.word_bounds(ptr)?;
        let mut word = [0u8; WORD_SIZE as usize];
        word.copy_from_slice(&self.memory.data(&self.store)[start..end]);
        Ok(u32::from_le_bytes(word))
    }

    /// Write a little-endian `u32` to a 4-byte aligned offset.
    pub fn write_word(&mut self, ptr: Pointer, value: u32) -> Result<(), CodecError> {
        let (start, end) = self.word_bounds(ptr)?;
        self.memory.data_mut(&mut self.store)[start..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Number of allocations made through this bridge and not yet released.
    pub fn outstanding(&self) -> usize {
        self.live.len()
    }

    /// Current size of the linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    fn bounds(&self, ptr: Pointer, len: usize) -> Result<(usize, usize), CodecError> {
        let out_of_bounds = || CodecError::OutOfBounds {
            offset: ptr.addr(),
            len,
        };
        if ptr.is_null() {
            return Err(out_of_bounds());
        }

        let start = ptr.addr() as usize;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        if end > self.memory_size() {
            return Err(out_of_bounds());
        }
        Ok((start, end))
    }

    fn word_bounds(&self, ptr: Pointer) -> Result<(usize, usize), CodecError> {
        if ptr.addr() % WORD_SIZE != 0 {
            return Err(CodecError::MisalignedWord(ptr.addr()));
        }
        self.bounds(ptr, WORD_SIZE as usize)
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
