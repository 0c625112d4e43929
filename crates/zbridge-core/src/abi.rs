//! Raw entry points of a foreign zstd codec module.
//!
//! Implemented in `zbridge-io` (in-process engine and wasmtime host). The shape
//! mirrors a wasm32 build of libzstd: pointers and `size_t` are 32 bits wide,
//! `unsigned long long` is 64. Nothing here bounds-checks on behalf of the
//! caller; `zbridge-mem::Arena` owns that responsibility.

use crate::error::Result;

/// Offset into the foreign linear memory. `0` is the null pointer.
pub type ForeignPtr = u32;

/// A `size_t` returned by a codec export: either a byte count or an encoded
/// error (`(size_t)-errno`).
pub type Status = u32;

/// `ZSTD_CONTENTSIZE_UNKNOWN` (-1 as a signed 64-bit value).
pub const CONTENTSIZE_UNKNOWN: u64 = u64::MAX;

/// `ZSTD_CONTENTSIZE_ERROR` (-2 as a signed 64-bit value).
pub const CONTENTSIZE_ERROR: u64 = u64::MAX - 1;

/// `ZSTD_error_maxCode`; any status above `-(MAX_ERROR_CODE)` is an error.
pub const MAX_ERROR_CODE: u32 = 120;

/// A handful of zstd error numbers the hosts synthesize themselves.
pub mod errno {
    pub const GENERIC: u32 = 1;
    pub const CORRUPTION_DETECTED: u32 = 20;
    pub const MEMORY_ALLOCATION: u32 = 64;
    pub const DST_SIZE_TOO_SMALL: u32 = 70;
    pub const SRC_SIZE_WRONG: u32 = 72;
}

/// Encode an error number the way `ZSTD_ERROR(name)` does on wasm32.
#[inline]
pub const fn error_status(errno: u32) -> Status {
    0u32.wrapping_sub(errno)
}

/// Decode the error number from an error status.
#[inline]
pub const fn status_errno(code: Status) -> u32 {
    0u32.wrapping_sub(code)
}

/// Host-side twin of `ZSTD_isError`.
#[inline]
pub const fn is_error_status(code: Status) -> bool {
    code > error_status(MAX_ERROR_CODE)
}

/// The exported surface of a loaded codec module.
///
/// Calls take `&mut self` because a foreign runtime mutates its own memory and
/// allocator on every call. Any call may fail with `Error::Trap` when the
/// runtime aborts.
pub trait ForeignModule: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// `malloc(size)`. Returns `0` when the allocator is exhausted.
    fn malloc(&mut self, size: u32) -> Result<ForeignPtr>;

    /// `free(ptr)`. Releasing the same pointer twice is undefined.
    fn free(&mut self, ptr: ForeignPtr) -> Result<()>;

    /// Copy host bytes into linear memory at `ptr`.
    fn write(&mut self, ptr: ForeignPtr, bytes: &[u8]) -> Result<()>;

    /// Copy `len` bytes out of linear memory starting at `ptr`.
    fn read(&self, ptr: ForeignPtr, len: u32) -> Result<Vec<u8>>;

    /// `ZSTD_compressBound(src_len)`.
    fn compress_bound(&mut self, src_len: u32) -> Result<Status>;

    /// `ZSTD_compress(dst, dst_cap, src, src_len, level)`.
    fn compress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
        level: i32,
    ) -> Result<Status>;

    /// `ZSTD_decompress(dst, dst_cap, src, src_len)`.
    fn decompress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
    ) -> Result<Status>;

    /// `ZSTD_getFrameContentSize(src, src_len)`; may return one of the
    /// `CONTENTSIZE_*` sentinels.
    fn frame_content_size(&mut self, src: ForeignPtr, src_len: u32) -> Result<u64>;

    /// `ZSTD_isError(code)`.
    fn is_error(&mut self, code: Status) -> Result<bool>;

    /// Current size of the linear memory in bytes.
    fn memory_size(&self) -> usize;
}

impl<M: ForeignModule + ?Sized> ForeignModule for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn malloc(&mut self, size: u32) -> Result<ForeignPtr> {
        (**self).malloc(size)
    }
    fn free(&mut self, ptr: ForeignPtr) -> Result<()> {
        (**self).free(ptr)
    }
    fn write(&mut self, ptr: ForeignPtr, bytes: &[u8]) -> Result<()> {
        (**self).write(ptr, bytes)
    }
    fn read(&self, ptr: ForeignPtr, len: u32) -> Result<Vec<u8>> {
        (**self).read(ptr, len)
    }
    fn compress_bound(&mut self, src_len: u32) -> Result<Status> {
        (**self).compress_bound(src_len)
    }
    fn compress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
        level: i32,
    ) -> Result<Status> {
        (**self).compress(dst, dst_cap, src, src_len, level)
    }
    fn decompress(
        &mut self,
        dst: ForeignPtr,
        dst_cap: u32,
        src: ForeignPtr,
        src_len: u32,
    ) -> Result<Status> {
        (**self).decompress(dst, dst_cap, src, src_len)
    }
    fn frame_content_size(&mut self, src: ForeignPtr, src_len: u32) -> Result<u64> {
        (**self).frame_content_size(src, src_len)
    }
    fn is_error(&mut self, code: Status) -> Result<bool> {
        (**self).is_error(code)
    }
    fn memory_size(&self) -> usize {
        (**self).memory_size()
    }
}
