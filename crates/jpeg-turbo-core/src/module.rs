//! Loading and instantiating the compute module.
//!
//! The module is a libjpeg-turbo build for wasm32 exposing the TurboJPEG C
//! API plus `malloc`/`free`. It imports a handful of libc/WASI functions it
//! never legitimately needs in this embedding; every one of them is
//! satisfied by a stub that fails loudly, except `setjmp`, which returns 0
//! so the library's error-handling prologue can run.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use wasmtime::{
    Engine, ExternType, Instance, Linker, Module, Store, StoreLimits, StoreLimitsBuilder,
    TypedFunc, Val, ValType, WasmParams, WasmResults,
};

use crate::decode::Subsampling;
use crate::error::CodecError;
use crate::memory::{Handle, HandleKind, MemoryBridge, Pointer};
use crate::scope::AllocationScope;

/// TurboJPEG `TJPF_RGBA`.
pub(crate) const PIXEL_FORMAT_RGBA: i32 = 7;

/// Row pitch of 0 means rows are tightly packed.
pub(crate) const DEFAULT_PITCH: i32 = 0;

pub(crate) const FLAGS: i32 = 0;

const ENV_MODULE: &str = "env";
const WASI_MODULES: [&str; 2] = ["wasi_unstable", "wasi_snapshot_preview1"];
const SYSCALLS: [&str; 4] = ["proc_exit", "fd_close", "fd_seek", "fd_write"];

/// Runtime settings for a module instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Upper bound on linear memory in bytes. Growth past this bound makes
    /// `memory.grow` fail, which the module allocator reports as a null
    /// pointer. `None` leaves growth unbounded.
    pub max_memory_bytes: Option<usize>,
}

/// Per-store host state.
pub struct ModuleState {
    limits: StoreLimits,
}

impl ModuleState {
    fn new(config: &ModuleConfig) -> Self {
        let limits = match config.max_memory_bytes {
            Some(bytes) => StoreLimitsBuilder::new().memory_size(bytes).build(),
            None => StoreLimits::default(),
        };
        Self { limits }
    }
}

/// Host implementations of the module's imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stub {
    SetJmp,
    LongJmp,
    Syscall(&'static str),
}

impl Stub {
    fn resolve(namespace: &str, name: &str) -> Option<Self> {
        if namespace == ENV_MODULE {
            return match name {
                "setjmp" => Some(Stub::SetJmp),
                "longjmp" => Some(Stub::LongJmp),
                _ => None,
            };
        }
        if WASI_MODULES.contains(&namespace) {
            return SYSCALLS
                .iter()
                .find(|syscall| **syscall == name)
                .map(|syscall| Stub::Syscall(syscall));
        }
        None
    }

    fn invoke(self, results: &[ValType], out: &mut [Val]) -> wasmtime::Result<()> {
        match self {
            Stub::SetJmp => {
                for (slot, ty) in out.iter_mut().zip(results) {
                    *slot = zero_value(ty)?;
                }
                Ok(())
            }
            Stub::LongJmp => {
                warn!("module attempted longjmp");
                Err(wasmtime::Error::new(CodecError::UnsupportedControlFlow))
            }
            Stub::Syscall(name) => {
                warn!(syscall = name, "module attempted unsupported syscall");
                Err(wasmtime::Error::new(CodecError::UnsupportedSyscall(
                    name.to_string(),
                )))
            }
        }
    }
}

fn zero_value(ty: &ValType) -> wasmtime::Result<Val> {
    match ty {
        ValType::I32 => Ok(Val::I32(0)),
        ValType::I64 => Ok(Val::I64(0)),
        ValType::F32 => Ok(Val::F32(0)),
        ValType::F64 => Ok(Val::F64(0)),
        other => Err(wasmtime::Error::msg(format!(
            "unsupported setjmp result type {other:?}"
        ))),
    }
}

/// Register a stub for every import the module declares, using the
/// module's own signature for each.
fn define_stubs(linker: &mut Linker<ModuleState>, module: &Module) -> Result<(), CodecError> {
    linker.allow_shadowing(true);

    for import in module.imports() {
        let (namespace, name) = (import.module(), import.name());
        let ExternType::Func(ty) = import.ty() else {
            return Err(CodecError::ModuleLoadFailure(format!(
                "unsupported non-function import {namespace}::{name}"
            )));
        };
        let stub = Stub::resolve(namespace, name).ok_or_else(|| {
            CodecError::ModuleLoadFailure(format!("unsatisfied import {namespace}::{name}"))
        })?;

        trace!(namespace, name, ?stub, "defining import stub");
        let results: Vec<ValType> = ty.results().collect();
        linker
            .func_new(namespace, name, ty, move |_caller, _params, out| {
                stub.invoke(&results, out)
            })
            .map_err(|e| CodecError::load("failed to define import stub", e))?;
    }
    Ok(())
}

fn export<P, R>(
    instance: &Instance,
    store: &mut Store<ModuleState>,
    name: &str,
) -> Result<TypedFunc<P, R>, CodecError>
where
    P: WasmParams,
    R: WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|e| CodecError::load(&format!("export `{name}`"), e))
}

/// The TurboJPEG entry points, resolved once at load.
struct TurboExports {
    init_decompress: TypedFunc<(), i32>,
    init_compress: TypedFunc<(), i32>,
    decompress_header: TypedFunc<(i32, i32, i32, i32, i32, i32, i32), i32>,
    decompress: TypedFunc<(i32, i32, i32, i32, i32, i32, i32, i32, i32), i32>,
    compress: TypedFunc<(i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32), i32>,
    destroy: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
}

impl TurboExports {
    fn resolve(instance: &Instance, store: &mut Store<ModuleState>) -> Result<Self, CodecError> {
        Ok(Self {
            init_decompress: export(instance, store, "tjInitDecompress")?,
            init_compress: export(instance, store, "tjInitCompress")?,
            decompress_header: export(instance, store, "tjDecompressHeader3")?,
            decompress: export(instance, store, "tjDecompress2")?,
            compress: export(instance, store, "tjCompress2")?,
            destroy: export(instance, store, "tjDestroy")?,
            free: export(instance, store, "tjFree")?,
        })
    }
}

/// A running compute module.
///
/// Each instance owns its own engine, store and linear memory, so several
/// instances (for example two module builds side by side) are independent.
/// An instance is not reentrant: callers sharing one across threads must
/// serialize access.
pub struct ModuleInstance {
    /// Only needed to reach the mock module's instrumentation exports.
    #[cfg(test)]
    instance: Instance,
    memory: MemoryBridge,
    turbo: TurboExports,
}

impl ModuleInstance {
    /// Compile and instantiate a module from its binary image.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::ModuleLoadFailure` if the image is not a valid
    /// module, imports something other than the stubbed functions, or lacks
    /// any of `memory`, `malloc`, `free` and the TurboJPEG entry points.
    pub fn load(image: &[u8], config: &ModuleConfig) -> Result<Self, CodecError> {
        let engine = Engine::default();
        let module = Module::from_binary(&engine, image)
            .map_err(|e| CodecError::load("invalid module image", e))?;

        let mut linker = Linker::new(&engine);
        define_stubs(&mut linker, &module)?;

        let mut store = Store::new(&engine, ModuleState::new(config));
        store.limiter(|state| &mut state.limits);

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| CodecError::load("instantiation failed", e))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| CodecError::ModuleLoadFailure("missing export `memory`".to_string()))?;
        let malloc = export(&instance, &mut store, "malloc")?;
        let free = export(&instance, &mut store, "free")?;
        let turbo = TurboExports::resolve(&instance, &mut store)?;

        // WASI reactors must run their constructors before any other export.
        if instance.get_func(&mut store, "_initialize").is_some() {
            let initialize: TypedFunc<(), ()> = export(&instance, &mut store, "_initialize")?;
            initialize
                .call(&mut store, ())
                .map_err(|e| CodecError::load("_initialize failed", e))?;
        }

        debug!(
            image_bytes = image.len(),
            memory_bytes = memory.data_size(&store),
            max_memory_bytes = ?config.max_memory_bytes,
            "loaded compute module"
        );

        Ok(Self {
            #[cfg(test)]
            instance,
            memory: MemoryBridge::new(store, memory, malloc, free),
            turbo,
        })
    }

    /// The memory bridge over this instance's linear memory.
    pub fn memory(&mut self) -> &mut MemoryBridge {
        &mut self.memory
    }

    /// Open an allocation scope for one codec call.
    pub fn scope(&mut self) -> AllocationScope<'_> {
        AllocationScope::new(self)
    }

    /// `tjInitDecompress` / `tjInitCompress`.
    pub(crate) fn init_handle(&mut self, kind: HandleKind) -> Result<Handle, CodecError> {
        let init = match kind {
            HandleKind::Decompressor => &self.turbo.init_decompress,
            HandleKind::Compressor => &self.turbo.init_compress,
        };
        let raw = init
            .call(self.memory.store_mut(), ())
            .map_err(CodecError::from_call)?;

        let ptr = Pointer::from_raw(raw);
        if ptr.is_null() {
            return Err(CodecError::AllocationFailure {
                size: 0,
                purpose: kind.purpose(),
            });
        }
        trace!(%ptr, ?kind, "created handle");
        Ok(Handle::new(ptr, kind))
    }

    /// `tjDestroy`.
    pub(crate) fn destroy_handle(&mut self, handle: Handle) -> Result<(), CodecError> {
        let status = self
            .turbo
            .destroy
            .call(self.memory.store_mut(), handle.pointer().as_raw())
            .map_err(CodecError::from_call)?;
        if status != 0 {
            warn!(ptr = %handle.pointer(), status, "tjDestroy reported failure");
        }
        trace!(ptr = %handle.pointer(), kind = ?handle.kind(), "destroyed handle");
        Ok(())
    }

    /// `tjFree`, for buffers the module allocated on its own behalf.
    pub(crate) fn free_module_buffer(&mut self, ptr: Pointer) -> Result<(), CodecError> {
        if ptr.is_null() {
            return Ok(());
        }
        trace!(%ptr, "tjFree");
        self.turbo
            .free
            .call(self.memory.store_mut(), ptr.as_raw())
            .map_err(CodecError::from_call)
    }

    /// `tjDecompressHeader3`, writing width, height, subsampling and
    /// colorspace into four consecutive words at `metadata`.
    pub(crate) fn decompress_header(
        &mut self,
        handle: Handle,
        source: Pointer,
        source_len: u32,
        metadata: Pointer,
    ) -> Result<i32, CodecError> {
        let params = (
            handle.pointer().as_raw(),
            source.as_raw(),
            source_len as i32,
            metadata.word(0).as_raw(),
            metadata.word(1).as_raw(),
            metadata.word(2).as_raw(),
            metadata.word(3).as_raw(),
        );
        self.turbo
            .decompress_header
            .call(self.memory.store_mut(), params)
            .map_err(CodecError::from_call)
    }

    /// `tjDecompress2` into a tightly packed RGBA buffer.
    pub(crate) fn decompress(
        &mut self,
        handle: Handle,
        source: Pointer,
        source_len: u32,
        output: Pointer,
        width: u32,
        height: u32,
    ) -> Result<i32, CodecError> {
        let params = (
            handle.pointer().as_raw(),
            source.as_raw(),
            source_len as i32,
            output.as_raw(),
            width as i32,
            DEFAULT_PITCH,
            height as i32,
            PIXEL_FORMAT_RGBA,
            FLAGS,
        );
        self.turbo
            .decompress
            .call(self.memory.store_mut(), params)
            .map_err(CodecError::from_call)
    }

    /// `tjCompress2` from tightly packed RGBA.
    ///
    /// `output_addr` and `output_size` are the `unsigned char **jpegBuf` and
    /// `unsigned long *jpegSize` out-parameters.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn compress(
        &mut self,
        handle: Handle,
        source: Pointer,
        width: u32,
        height: u32,
        output_addr: Pointer,
        output_size: Pointer,
        subsampling: Subsampling,
        quality: u8,
    ) -> Result<i32, CodecError> {
        let params = (
            handle.pointer().as_raw(),
            source.as_raw(),
            width as i32,
            DEFAULT_PITCH,
            height as i32,
            PIXEL_FORMAT_RGBA,
            output_addr.as_raw(),
            output_size.as_raw(),
            subsampling.code() as i32,
            i32::from(quality),
            FLAGS,
        );
        self.turbo
            .compress
            .call(self.memory.store_mut(), params)
            .map_err(CodecError::from_call)
    }

    /// Call an arbitrary export. Only used to drive the mock module's
    /// instrumentation exports.
    #[cfg(test)]
    pub(crate) fn call_export<P, R>(&mut self, name: &str, params: P) -> Result<R, CodecError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let store = self.memory.store_mut();
        let func = export::<P, R>(&self.instance, &mut *store, name)?;
        func.call(store, params).map_err(CodecError::from_call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_image, mock_module};

    #[test]
    fn test_stub_resolution() {
        assert_eq!(Stub::resolve("env", "setjmp"), Some(Stub::SetJmp));
        assert_eq!(Stub::resolve("env", "longjmp"), Some(Stub::LongJmp));
        assert_eq!(
            Stub::resolve("wasi_unstable", "fd_write"),
            Some(Stub::Syscall("fd_write"))
        );
        assert_eq!(
            Stub::resolve("wasi_snapshot_preview1", "proc_exit"),
            Some(Stub::Syscall("proc_exit"))
        );
        assert_eq!(Stub::resolve("env", "fd_write"), None);
        assert_eq!(Stub::resolve("wasi_unstable", "path_open"), None);
    }

    #[test]
    fn test_load_mock_module() {
        let mut module = mock_module();
        assert!(module.memory().memory_size() >= 65536);
        assert_eq!(module.memory().outstanding(), 0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let result = ModuleInstance::load(&[0x00, 0x61, 0x73], &ModuleConfig::default());
        assert!(matches!(result, Err(CodecError::ModuleLoadFailure(_))));
    }

    #[test]
    fn test_load_rejects_text_format() {
        // Only binary images are accepted
        let result = ModuleInstance::load(b"(module)", &ModuleConfig::default());
        assert!(matches!(result, Err(CodecError::ModuleLoadFailure(_))));
    }

    #[test]
    fn test_load_rejects_unknown_import() {
        let image = wat::parse_str(
            r#"(module (import "env" "emscripten_memcpy_big" (func (param i32 i32 i32))))"#,
        )
        .unwrap();
        match ModuleInstance::load(&image, &ModuleConfig::default()) {
            Err(CodecError::ModuleLoadFailure(message)) => {
                assert!(message.contains("env::emscripten_memcpy_big"), "{}", message)
            }
            Err(e) => panic!("Expected ModuleLoadFailure, got: {:?}", e),
            Ok(_) => panic!("Expected error, got success"),
        }
    }

    #[test]
    fn test_load_rejects_missing_exports() {
        let image = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "malloc") (param i32) (result i32) (i32.const 0))
                (func (export "free") (param i32)))"#,
        )
        .unwrap();
        match ModuleInstance::load(&image, &ModuleConfig::default()) {
            Err(CodecError::ModuleLoadFailure(message)) => {
                assert!(message.contains("tjInitDecompress"), "{}", message)
            }
            Err(e) => panic!("Expected ModuleLoadFailure, got: {:?}", e),
            Ok(_) => panic!("Expected error, got success"),
        }
    }

    #[test]
    fn test_load_rejects_memory_cap_below_initial_size() {
        let config = ModuleConfig {
            max_memory_bytes: Some(1024),
        };
        let result = ModuleInstance::load(&mock_image(), &config);
        assert!(matches!(result, Err(CodecError::ModuleLoadFailure(_))));
    }

    #[test]
    fn test_setjmp_stub_returns_zero() {
        let mut module = mock_module();
        let result: i32 = module.call_export("call_setjmp", ()).unwrap();
        assert_eq!(result, 0);
    }

    #[test]
    fn test_longjmp_stub_fails_loudly() {
        let mut module = mock_module();
        let result = module.call_export::<(), ()>("call_longjmp", ());
        assert!(matches!(result, Err(CodecError::UnsupportedControlFlow)));
    }

    #[test]
    fn test_syscall_stubs_name_the_syscall() {
        let mut module = mock_module();

        match module.call_export::<(), ()>("call_proc_exit", ()) {
            Err(CodecError::UnsupportedSyscall(name)) => assert_eq!(name, "proc_exit"),
            other => panic!("Expected UnsupportedSyscall, got: {:?}", other),
        }

        for syscall in ["fd_close", "fd_seek", "fd_write"] {
            let export = format!("call_{}", syscall);
            match module.call_export::<(), i32>(&export, ()) {
                Err(CodecError::UnsupportedSyscall(name)) => assert_eq!(name, syscall),
                other => panic!("Expected UnsupportedSyscall, got: {:?}", other),
            }
        }
    }

    #[test]
    fn test_instance_usable_after_stub_failure() {
        let mut module = mock_module();
        let _ = module.call_export::<(), ()>("call_longjmp", ());

        let bridge = module.memory();
        let ptr = bridge
            .allocate(32, crate::error::Purpose::SourceJpeg)
            .unwrap();
        bridge.release(ptr).unwrap();
    }

    #[test]
    fn test_reactor_initializer_runs() {
        let image = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (global $ready (mut i32) (i32.const 0))
                (func (export "_initialize") (global.set $ready (i32.const 1)))
                (func (export "malloc") (param i32) (result i32)
                  (if (result i32) (global.get $ready)
                    (then (i32.const 64))
                    (else (i32.const 0))))
                (func (export "free") (param i32))
                (func (export "tjInitDecompress") (result i32) (i32.const 0))
                (func (export "tjInitCompress") (result i32) (i32.const 0))
                (func (export "tjDecompressHeader3")
                  (param i32 i32 i32 i32 i32 i32 i32) (result i32) (i32.const -1))
                (func (export "tjDecompress2")
                  (param i32 i32 i32 i32 i32 i32 i32 i32 i32) (result i32) (i32.const -1))
                (func (export "tjCompress2")
                  (param i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32) (result i32) (i32.const -1))
                (func (export "tjDestroy") (param i32) (result i32) (i32.const 0))
                (func (export "tjFree") (param i32)))"#,
        )
        .unwrap();

        let mut module = ModuleInstance::load(&image, &ModuleConfig::default()).unwrap();
        let ptr = module
            .memory()
            .allocate(8, crate::error::Purpose::Metadata)
            .unwrap();
        assert_eq!(ptr.addr(), 64);
    }

    #[test]
    fn test_independent_instances() {
        let mut first = mock_module();
        let mut second = mock_module();

        let a = first
            .memory()
            .allocate(16, crate::error::Purpose::Metadata)
            .unwrap();
        first.memory().write_word(a, 11).unwrap();

        let b = second
            .memory()
            .allocate(16, crate::error::Purpose::Metadata)
            .unwrap();
        second.memory().write_word(b, 22).unwrap();

        // Same offsets in different instances hold different data
        assert_eq!(a, b);
        assert_eq!(first.memory().read_word(a).unwrap(), 11);
        assert_eq!(second.memory().read_word(b).unwrap(), 22);
    }
}
