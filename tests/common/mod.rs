//! Shared `ForeignModule` wrappers for the integration suites.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use zbridge::abi::{error_status, errno, ForeignPtr, Status};
use zbridge::{CodecRuntime, CompressionService, Error, ForeignModule, NativeModule, Result, RuntimeConfig};

/// Everything a `RecordingModule` observed.
#[derive(Debug, Default, Clone)]
pub struct CallLog {
    pub mallocs: Vec<u32>,
    pub frees: Vec<ForeignPtr>,
    pub live: BTreeSet<ForeignPtr>,
    pub bounds: Vec<Status>,
    pub levels: Vec<i32>,
    /// `(dst_cap, returned status)` for each compress call.
    pub compress_calls: Vec<(u32, Status)>,
    /// `dst_cap` for each decompress call.
    pub decompress_caps: Vec<u32>,
}

/// Passes every call through to an inner module and logs it.
pub struct RecordingModule<M> {
    inner: M,
    log: Arc<Mutex<CallLog>>,
}

impl<M: ForeignModule> RecordingModule<M> {
    pub fn new(inner: M) -> (Self, Arc<Mutex<CallLog>>) {
        let log = Arc::new(Mutex::new(CallLog::default()));
        (
            Self {
                inner,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl<M: ForeignModule> ForeignModule for RecordingModule<M> {
    fn name(&self) -> &str {
        "recording"
    }

    fn malloc(&mut self, size: u32) -> Result<ForeignPtr> {
        let ptr = self.inner.malloc(size)?;
        let mut log = self.log.lock().unwrap();
        log.mallocs.push(size);
        if ptr != 0 {
            log.live.insert(ptr);
        }
        Ok(ptr)
    }

    fn free(&mut self, ptr: ForeignPtr) -> Result<()> {
        {
            let mut log = self.log.lock().unwrap();
            log.frees.push(ptr);
            assert!(log.live.remove(&ptr), "double or foreign free of {ptr:#x}");
        }
        self.inner.free(ptr)
    }

    fn write(&mut self, ptr: ForeignPtr, bytes: &[u8]) -> Result<()> {
        self.inner.write(ptr, bytes)
    }

    fn read(&self, ptr: ForeignPtr, len: u32) -> Result<Vec<u8>> {
        self.inner.read(ptr, len)
    }

    fn compress_bound(&mut self, src_len: u32) -> Result<Status> {
        let bound = self.inner.compress_bound(src_len)?;
        self.log.lock().unwrap().bounds.push(bound);
        Ok(bound)
    }

    fn compress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
        level: i32,
    ) -> Result<Status> {
        let status = self.inner.compress(dst, dst_cap, src, src_len, level)?;
        let mut log = self.log.lock().unwrap();
        log.levels.push(level);
        log.compress_calls.push((dst_cap, status));
        Ok(status)
    }

    fn decompress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
    ) -> Result<Status> {
        self.log.lock().unwrap().decompress_caps.push(dst_cap);
        self.inner.decompress(dst, dst_cap, src, src_len)
    }

    fn frame_content_size(&mut self, src: ForeignPtr, src_len: u32) -> Result<u64> {
        self.inner.frame_content_size(src, src_len)
    }

    fn is_error(&mut self, code: Status) -> Result<bool> {
        self.inner.is_error(code)
    }

    fn memory_size(&self) -> usize {
        self.inner.memory_size()
    }
}

/// What a `FaultyModule` breaks.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// `malloc` returns null from the n-th call on (0-based).
    NullMallocFrom(usize),
    /// The named entry point traps.
    Trap(&'static str),
    /// `compress` reports this error number.
    CompressErrno(u32),
    /// `ZSTD_getFrameContentSize` answers with this raw value.
    ContentSize(u64),
}

/// A native module with one injected fault.
pub struct FaultyModule {
    inner: NativeModule,
    fault: Fault,
    mallocs: usize,
}

impl FaultyModule {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: NativeModule::new(16, 256),
            fault,
            mallocs: 0,
        }
    }

    fn trap_if(&self, export: &'static str) -> Result<()> {
        match self.fault {
            Fault::Trap(name) if name == export => Err(Error::trap(export, "injected trap")),
            _ => Ok(()),
        }
    }

    pub fn live_blocks(&self) -> usize {
        self.inner.heap().live_blocks()
    }
}

impl ForeignModule for FaultyModule {
    fn name(&self) -> &str {
        "faulty"
    }

    fn malloc(&mut self, size: u32) -> Result<ForeignPtr> {
        self.trap_if("malloc")?;
        let n = self.mallocs;
        self.mallocs += 1;
        match self.fault {
            Fault::NullMallocFrom(from) if n >= from => Ok(0),
            _ => self.inner.malloc(size),
        }
    }

    fn free(&mut self, ptr: ForeignPtr) -> Result<()> {
        self.inner.free(ptr)
    }

    fn write(&mut self, ptr: ForeignPtr, bytes: &[u8]) -> Result<()> {
        self.trap_if("write")?;
        self.inner.write(ptr, bytes)
    }

    fn read(&self, ptr: ForeignPtr, len: u32) -> Result<Vec<u8>> {
        self.trap_if("read")?;
        self.inner.read(ptr, len)
    }

    fn compress_bound(&mut self, src_len: u32) -> Result<Status> {
        self.inner.compress_bound(src_len)
    }

    fn compress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
        level: i32,
    ) -> Result<Status> {
        self.trap_if("compress")?;
        if let Fault::CompressErrno(e) = self.fault {
            return Ok(error_status(e));
        }
        self.inner.compress(dst, dst_cap, src, src_len, level)
    }

    fn decompress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
    ) -> Result<Status> {
        self.trap_if("decompress")?;
        self.inner.decompress(dst, dst_cap, src, src_len)
    }

    fn frame_content_size(&mut self, src: ForeignPtr, src_len: u32) -> Result<u64> {
        if let Fault::ContentSize(raw) = self.fault {
            return Ok(raw);
        }
        self.inner.frame_content_size(src, src_len)
    }

    fn is_error(&mut self, code: Status) -> Result<bool> {
        self.inner.is_error(code)
    }

    fn memory_size(&self) -> usize {
        self.inner.memory_size()
    }
}

/// Errno the native engine reports for an undersized output region.
pub const DST_TOO_SMALL: u32 = errno::DST_SIZE_TOO_SMALL;

/// A ready service over `module` with default config.
pub async fn service_over(module: impl ForeignModule + 'static) -> CompressionService {
    let runtime = CodecRuntime::new(RuntimeConfig::default());
    runtime
        .load_module(Box::new(module))
        .expect("fresh runtime accepts a module");
    runtime.ready().await.expect("gate opened by load_module")
}

/// A zstd frame whose header omits the content size.
pub fn frame_without_content_size(data: &[u8]) -> Vec<u8> {
    let mut c = zstd::bulk::Compressor::new(3).unwrap();
    c.set_parameter(zstd::zstd_safe::CParameter::ContentSizeFlag(false))
        .unwrap();
    c.compress(data).unwrap()
}

/// Deterministic, moderately compressible test data.
pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 31) % 251) as u8 ^ ((i / 512) as u8))
        .collect()
}
