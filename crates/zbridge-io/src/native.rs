//! Built-in codec engine.
//!
//! libzstd (through `zstd::zstd_safe`) operating on a `LinearHeap`, exposed
//! through exactly the same pointer/status ABI a wasm32 zstd build has. Status
//! codes keep zstd's `(size_t)-errno` encoding, narrowed to 32 bits.

use zbridge_core::abi::{
    errno, error_status, is_error_status, ForeignModule, ForeignPtr, Status, CONTENTSIZE_ERROR,
    CONTENTSIZE_UNKNOWN,
};
use zbridge_core::config::RuntimeConfig;
use zbridge_core::error::{Error, Result};
use zbridge_mem::LinearHeap;
use zstd::zstd_safe;

pub struct NativeModule {
    heap: LinearHeap,
}

impl NativeModule {
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        Self {
            heap: LinearHeap::new(initial_pages, max_pages),
        }
    }

    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self::new(cfg.initial_memory_pages, cfg.max_memory_pages)
    }

    pub fn heap(&self) -> &LinearHeap {
        &self.heap
    }
}

/// Narrow a libzstd result to a wasm32 `size_t` status.
fn to_status(result: zstd_safe::SafeResult) -> Status {
    match result {
        Ok(n) => u32::try_from(n).unwrap_or(error_status(errno::GENERIC)),
        Err(code) => error_status(0usize.wrapping_sub(code) as u32),
    }
}

impl ForeignModule for NativeModule {
    fn name(&self) -> &str {
        "native-zstd"
    }

    fn malloc(&mut self, size: u32) -> Result<ForeignPtr> {
        Ok(self.heap.malloc(size))
    }

    fn free(&mut self, ptr: ForeignPtr) -> Result<()> {
        if self.heap.free(ptr) {
            Ok(())
        } else {
            Err(Error::trap("free", format!("pointer {ptr:#x} is not allocated")))
        }
    }

    fn write(&mut self, ptr: ForeignPtr, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| Error::trap("memory", "write wider than linear memory"))?;
        let dst = self
            .heap
            .slice_mut(ptr, len)
            .ok_or_else(|| Error::trap("memory", format!("out of bounds write at {ptr:#x}+{len}")))?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self, ptr: ForeignPtr, len: u32) -> Result<Vec<u8>> {
        self.heap
            .slice(ptr, len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::trap("memory", format!("out of bounds read at {ptr:#x}+{len}")))
    }

    fn compress_bound(&mut self, src_len: u32) -> Result<Status> {
        let bound = zstd_safe::compress_bound(src_len as usize);
        Ok(u32::try_from(bound).unwrap_or(error_status(errno::SRC_SIZE_WRONG)))
    }

    fn compress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
        level: i32,
    ) -> Result<Status> {
        let (input, output) = self
            .heap
            .split_mut((src, src_len), (dst, dst_cap))
            .ok_or_else(|| Error::trap("ZSTD_compress", "invalid or overlapping regions"))?;
        Ok(to_status(zstd_safe::compress(output, input, level)))
    }

    fn decompress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
    ) -> Result<Status> {
        let (input, output) = self
            .heap
            .split_mut((src, src_len), (dst, dst_cap))
            .ok_or_else(|| Error::trap("ZSTD_decompress", "invalid or overlapping regions"))?;
        Ok(to_status(zstd_safe::decompress(output, input)))
    }

    fn frame_content_size(&mut self, src: ForeignPtr, src_len: u32) -> Result<u64> {
        let frame = self
            .heap
            .slice(src, src_len)
            .ok_or_else(|| Error::trap("ZSTD_getFrameContentSize", "out of bounds frame"))?;
        Ok(match zstd_safe::get_frame_content_size(frame) {
            Ok(Some(n)) => n,
            Ok(None) => CONTENTSIZE_UNKNOWN,
            Err(_) => CONTENTSIZE_ERROR,
        })
    }

    fn is_error(&mut self, code: Status) -> Result<bool> {
        Ok(is_error_status(code))
    }

    fn memory_size(&self) -> usize {
        self.heap.size_bytes()
    }
}
