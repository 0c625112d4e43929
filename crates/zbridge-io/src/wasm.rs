//! wasmtime host for a compiled zstd wasm image.
//!
//! Expected exports (standalone emscripten / wasi-sdk reactor build of
//! libzstd): `memory`, `malloc`, `free`, `ZSTD_compressBound`,
//! `ZSTD_compress`, `ZSTD_decompress`, `ZSTD_getFrameContentSize`,
//! `ZSTD_isError`. Imports the module declares but the host does not provide
//! are linked as traps; the codec paths never call them.

use wasmtime::{
    Config, Engine, Instance, Linker, Memory, Module, Store, StoreLimits, StoreLimitsBuilder,
    TypedFunc,
};

use zbridge_core::abi::{ForeignModule, ForeignPtr, Status};
use zbridge_core::config::RuntimeConfig;
use zbridge_core::error::{Error, Result};
use zbridge_mem::PAGE_SIZE;

use crate::source::ModuleImage;

/// Runtime initializers, tried in order; the first one exported runs once.
const INITIALIZERS: [&str; 2] = ["_initialize", "__wasm_call_ctors"];

struct Exports {
    malloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
    compress_bound: TypedFunc<u32, u32>,
    compress: TypedFunc<(u32, u32, u32, u32, i32), u32>,
    decompress: TypedFunc<(u32, u32, u32, u32), u32>,
    frame_content_size: TypedFunc<(u32, u32), u64>,
    is_error: TypedFunc<u32, u32>,
}

impl Exports {
    fn resolve(instance: &Instance, store: &mut Store<StoreLimits>) -> Result<Self> {
        fn get<P, R>(instance: &Instance, store: &mut Store<StoreLimits>, name: &str) -> Result<TypedFunc<P, R>>
        where
            P: wasmtime::WasmParams,
            R: wasmtime::WasmResults,
        {
            instance
                .get_typed_func::<P, R>(&mut *store, name)
                .map_err(|e| Error::Load(format!("module does not export '{name}': {e}")))
        }

        Ok(Self {
            malloc: get(instance, store, "malloc")?,
            free: get(instance, store, "free")?,
            compress_bound: get(instance, store, "ZSTD_compressBound")?,
            compress: get(instance, store, "ZSTD_compress")?,
            decompress: get(instance, store, "ZSTD_decompress")?,
            frame_content_size: get(instance, store, "ZSTD_getFrameContentSize")?,
            is_error: get(instance, store, "ZSTD_isError")?,
        })
    }
}

pub struct WasmModule {
    store: Store<StoreLimits>,
    memory: Memory,
    exports: Exports,
}

impl WasmModule {
    /// Compile, link, and initialize an image. Blocking.
    pub fn instantiate(image: &ModuleImage, cfg: &RuntimeConfig) -> Result<Self> {
        if !image.is_wasm() {
            return Err(Error::Load(format!(
                "{} is not a wasm binary",
                image.origin
            )));
        }

        let mut config = Config::new();
        config.strategy(wasmtime::Strategy::Cranelift);
        let engine =
            Engine::new(&config).map_err(|e| Error::Load(format!("wasmtime engine: {e}")))?;

        let module = Module::new(&engine, &image.bytes)
            .map_err(|e| Error::Load(format!("compile {}: {e}", image.origin)))?;

        let limits = StoreLimitsBuilder::new()
            .memory_size(cfg.max_memory_pages as usize * PAGE_SIZE)
            .build();
        let mut store = Store::new(&engine, limits);
        store.limiter(|limits| limits);

        let mut linker: Linker<StoreLimits> = Linker::new(&engine);
        // emscripten standalone builds report heap growth through this import.
        linker
            .func_wrap("env", "emscripten_notify_memory_growth", |_index: u32| {})
            .map_err(|e| Error::Load(format!("link: {e}")))?;
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(|e| Error::Load(format!("link: {e}")))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| Error::Load(format!("instantiate {}: {e}", image.origin)))?;

        for name in INITIALIZERS {
            if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, name) {
                init.call(&mut store, ())
                    .map_err(|e| Error::Load(format!("{name}: {e}")))?;
                break;
            }
        }

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| Error::Load("module does not export 'memory'".into()))?;
        let exports = Exports::resolve(&instance, &mut store)?;

        tracing::info!(
            origin = %image.origin,
            digest = %image.digest,
            memory_bytes = memory.data_size(&store),
            "wasm codec module instantiated"
        );

        Ok(Self {
            store,
            memory,
            exports,
        })
    }
}

impl ForeignModule for WasmModule {
    fn name(&self) -> &str {
        "wasm-zstd"
    }

    fn malloc(&mut self, size: u32) -> Result<ForeignPtr> {
        self.exports
            .malloc
            .call(&mut self.store, size)
            .map_err(|e| Error::trap("malloc", e))
    }

    fn free(&mut self, ptr: ForeignPtr) -> Result<()> {
        self.exports
            .free
            .call(&mut self.store, ptr)
            .map_err(|e| Error::trap("free", e))
    }

    fn write(&mut self, ptr: ForeignPtr, bytes: &[u8]) -> Result<()> {
        self.memory
            .write(&mut self.store, ptr as usize, bytes)
            .map_err(|e| Error::trap("memory", format!("write at {ptr:#x}+{}: {e}", bytes.len())))
    }

    fn read(&self, ptr: ForeignPtr, len: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.memory
            .read(&self.store, ptr as usize, &mut buf)
            .map_err(|e| Error::trap("memory", format!("read at {ptr:#x}+{len}: {e}")))?;
        Ok(buf)
    }

    fn compress_bound(&mut self, src_len: u32) -> Result<Status> {
        self.exports
            .compress_bound
            .call(&mut self.store, src_len)
            .map_err(|e| Error::trap("ZSTD_compressBound", e))
    }

    fn compress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
        level: i32,
    ) -> Result<Status> {
        self.exports
            .compress
            .call(&mut self.store, (dst, dst_cap, src, src_len, level))
            .map_err(|e| Error::trap("ZSTD_compress", e))
    }

    fn decompress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
    ) -> Result<Status> {
        self.exports
            .decompress
            .call(&mut self.store, (dst, dst_cap, src, src_len))
            .map_err(|e| Error::trap("ZSTD_decompress", e))
    }

    fn frame_content_size(&mut self, src: ForeignPtr, src_len: u32) -> Result<u64> {
        self.exports
            .frame_content_size
            .call(&mut self.store, (src, src_len))
            .map_err(|e| Error::trap("ZSTD_getFrameContentSize", e))
    }

    fn is_error(&mut self, code: Status) -> Result<bool> {
        self.exports
            .is_error
            .call(&mut self.store, code)
            .map(|v| v != 0)
            .map_err(|e| Error::trap("ZSTD_isError", e))
    }

    fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }
}
