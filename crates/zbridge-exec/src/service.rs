//! The public compress/decompress surface.
//!
//! Each call takes the module lock, opens an `Arena` over the module, and
//! stages its buffers as `ForeignAllocation` guards. The lock is held for the
//! whole allocate → write → invoke → read → release sequence; the foreign
//! allocator has no concurrency protection of its own. Guards release on every
//! exit path, so `ledger()` balances after every call whether it failed or not.

use std::sync::{Arc, Mutex};

use zbridge_core::abi::{ForeignModule, Status};
use zbridge_core::error::{Error, Result};
use zbridge_core::types::{resolve_level, DecompressOptions, SizeHint};
use zbridge_mem::{AllocationLedger, Arena, ForeignAllocation, LedgerSnapshot};

use crate::metrics::OpTimer;

struct Shared {
    module: Mutex<Box<dyn ForeignModule>>,
    ledger: AllocationLedger,
    module_name: String,
    default_level: i32,
}

/// Cheap-to-clone handle over one loaded codec module.
///
/// Obtained from `CodecRuntime::ready`, never constructed directly.
#[derive(Clone)]
pub struct CompressionService {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CompressionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionService")
            .field("module", &self.shared.module_name)
            .field("default_level", &self.shared.default_level)
            .finish()
    }
}

impl CompressionService {
    pub(crate) fn new(module: Box<dyn ForeignModule>, default_level: i32) -> Self {
        let module_name = module.name().to_string();
        Self {
            shared: Arc::new(Shared {
                module: Mutex::new(module),
                ledger: AllocationLedger::new(),
                module_name,
                default_level,
            }),
        }
    }

    /// Compress `bytes` into a single frame.
    ///
    /// `None` and `Some(0)` select the default level; any other level is passed
    /// to the codec as-is.
    pub fn compress(&self, bytes: &[u8], level: Option<i32>) -> Result<Vec<u8>> {
        let level = resolve_level(level, self.shared.default_level);
        let timer = OpTimer::start("compress", bytes.len());
        timer.finish(self.with_arena(|arena| compress_in(arena, bytes, level)))
    }

    /// Decompress one frame.
    ///
    /// Output capacity is the frame's declared content size, or
    /// `options.default_heap_size` when the frame does not declare one. A frame
    /// that inflates past that capacity fails with `Error::Codec`.
    pub fn decompress(&self, bytes: &[u8], options: DecompressOptions) -> Result<Vec<u8>> {
        options.validate()?;
        let timer = OpTimer::start("decompress", bytes.len());
        timer.finish(self.with_arena(|arena| decompress_in(arena, bytes, &options)))
    }

    /// The frame's declared content size, as the codec reports it.
    pub fn frame_size_hint(&self, bytes: &[u8]) -> Result<SizeHint> {
        self.with_arena(|arena| {
            let src = stage(arena, bytes, "frame")?;
            let hint = query_size(arena, &src)?;
            src.release()?;
            Ok(hint)
        })
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        self.shared.ledger.snapshot()
    }

    pub fn default_level(&self) -> i32 {
        self.shared.default_level
    }

    pub fn module_name(&self) -> &str {
        &self.shared.module_name
    }

    /// Current size of the module's linear memory.
    pub fn memory_size(&self) -> Result<usize> {
        let module = self.lock()?;
        Ok(module.memory_size())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn ForeignModule>>> {
        self.shared
            .module
            .lock()
            .map_err(|_| Error::Lifecycle("codec module poisoned by a panic in an earlier call".into()))
    }

    fn with_arena<R>(&self, f: impl FnOnce(&Arena<'_>) -> Result<R>) -> Result<R> {
        let mut module = self.lock()?;
        let arena = Arena::new(&mut **module, &self.shared.ledger);
        f(&arena)
    }
}

fn compress_in(arena: &Arena<'_>, bytes: &[u8], level: i32) -> Result<Vec<u8>> {
    let src_len = foreign_len(bytes.len(), "compress_src")?;
    let bound = arena.invoke(|m| m.compress_bound(src_len))?;
    check_status(arena, "compress_bound", bound)?;

    let dst = arena.allocate(bound as usize, "compress_dst")?;
    let src = stage(arena, bytes, "compress_src")?;

    let written =
        arena.invoke(|m| m.compress(dst.ptr(), dst.len(), src.ptr(), src.len(), level))?;
    check_status(arena, "compress", written)?;
    if written > bound {
        return Err(Error::ContractViolation(format!(
            "compress wrote {written} bytes past its bound of {bound}"
        )));
    }

    let out = dst.read(written as usize)?;
    src.release()?;
    dst.release()?;
    Ok(out)
}

fn decompress_in(arena: &Arena<'_>, bytes: &[u8], options: &DecompressOptions) -> Result<Vec<u8>> {
    let src = stage(arena, bytes, "decompress_src")?;

    let capacity = query_size(arena, &src)?.resolve(options);
    let capacity = usize::try_from(capacity).map_err(|_| Error::Allocation {
        tag: "decompress_dst",
        requested: usize::MAX,
    })?;
    let dst = arena.allocate(capacity, "decompress_dst")?;

    let written = arena.invoke(|m| m.decompress(dst.ptr(), dst.len(), src.ptr(), src.len()))?;
    check_status(arena, "decompress", written)?;

    let out = dst.read(written as usize)?;
    src.release()?;
    dst.release()?;
    Ok(out)
}

/// Allocate exactly `bytes.len()` and copy `bytes` in.
fn stage<'a, 'm>(
    arena: &'a Arena<'m>,
    bytes: &[u8],
    tag: &'static str,
) -> Result<ForeignAllocation<'a, 'm>> {
    let alloc = arena.allocate(bytes.len(), tag)?;
    alloc.write(bytes)?;
    Ok(alloc)
}

fn query_size(arena: &Arena<'_>, src: &ForeignAllocation<'_, '_>) -> Result<SizeHint> {
    let raw = arena.invoke(|m| m.frame_content_size(src.ptr(), src.len()))?;
    SizeHint::from_raw(raw)
}

/// Run the module's own is-error predicate over a status.
fn check_status(arena: &Arena<'_>, operation: &'static str, status: Status) -> Result<()> {
    if arena.invoke(|m| m.is_error(status))? {
        return Err(Error::Codec {
            operation,
            code: status as u64,
        });
    }
    Ok(())
}

fn foreign_len(len: usize, tag: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::Allocation {
        tag,
        requested: len,
    })
}
