//! Scoped staging of host buffers in foreign memory.
//!
//! `Arena::allocate` hands out a `ForeignAllocation` guard. Dropping the guard
//! frees the region through the module's `free` export, so every exit path of
//! an operation (including `?` and unwinding) releases what it allocated.
//! `release()` is the explicit variant for the success path, where a failing
//! `free` should surface as an error instead of a log line.

use std::cell::RefCell;

use zbridge_core::abi::{ForeignModule, ForeignPtr};
use zbridge_core::error::{Error, Result};

use crate::tracking::AllocationLedger;

/// Borrowed view of a module for the duration of one operation.
pub struct Arena<'m> {
    module: RefCell<&'m mut dyn ForeignModule>,
    ledger: &'m AllocationLedger,
}

impl<'m> Arena<'m> {
    pub fn new(module: &'m mut dyn ForeignModule, ledger: &'m AllocationLedger) -> Self {
        Self {
            module: RefCell::new(module),
            ledger,
        }
    }

    /// Reserve `size` bytes of foreign memory.
    ///
    /// A null pointer from the foreign allocator, or a size that does not fit
    /// a 32-bit linear memory, is an `Error::Allocation`.
    pub fn allocate(&self, size: usize, tag: &'static str) -> Result<ForeignAllocation<'_, 'm>> {
        let len = u32::try_from(size).map_err(|_| {
            self.ledger.record_failure();
            Error::Allocation {
                tag,
                requested: size,
            }
        })?;

        let ptr = self.invoke(|m| m.malloc(len))?;
        if ptr == 0 {
            self.ledger.record_failure();
            return Err(Error::Allocation {
                tag,
                requested: size,
            });
        }

        self.ledger.record_allocate(size);
        Ok(ForeignAllocation {
            arena: self,
            ptr,
            len,
            tag,
            live: true,
        })
    }

    /// Run an entry point while allocations are outstanding.
    pub fn invoke<R>(&self, f: impl FnOnce(&mut dyn ForeignModule) -> Result<R>) -> Result<R> {
        let mut module = self
            .module
            .try_borrow_mut()
            .map_err(|_| Error::ContractViolation("re-entrant foreign module call".into()))?;
        f(&mut **module)
    }

    pub fn ledger(&self) -> &AllocationLedger {
        self.ledger
    }

    fn release_raw(&self, ptr: ForeignPtr, len: u32) -> Result<()> {
        self.ledger.record_release(len as usize);
        self.invoke(|m| m.free(ptr))
    }
}

/// A live `(ptr, len)` region owned by exactly one operation.
pub struct ForeignAllocation<'a, 'm> {
    arena: &'a Arena<'m>,
    ptr: ForeignPtr,
    len: u32,
    tag: &'static str,
    live: bool,
}

impl std::fmt::Debug for ForeignAllocation<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignAllocation")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("tag", &self.tag)
            .finish()
    }
}

impl ForeignAllocation<'_, '_> {
    pub fn ptr(&self) -> ForeignPtr {
        self.ptr
    }

    /// Reserved size in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Copy `bytes` to the start of the region.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.len as usize {
            return Err(Error::ContractViolation(format!(
                "write of {} bytes into '{}' allocation of {} bytes",
                bytes.len(),
                self.tag,
                self.len
            )));
        }
        self.arena.invoke(|m| m.write(self.ptr, bytes))
    }

    /// Copy the first `len` bytes of the region into a fresh host buffer.
    pub fn read(&self, len: usize) -> Result<Vec<u8>> {
        if len > self.len as usize {
            return Err(Error::ContractViolation(format!(
                "read of {len} bytes from '{}' allocation of {} bytes",
                self.tag, self.len
            )));
        }
        self.arena.invoke(|m| m.read(self.ptr, len as u32))
    }

    /// Free the region now and report a failing `free`.
    pub fn release(mut self) -> Result<()> {
        self.live = false;
        self.arena.release_raw(self.ptr, self.len)
    }
}

impl Drop for ForeignAllocation<'_, '_> {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        if let Err(_e) = self.arena.release_raw(self.ptr, self.len) {
            #[cfg(feature = "tracing")]
            tracing::warn!(ptr = self.ptr, len = self.len, tag = self.tag, error = %_e, "foreign free failed");
        }
    }
}
