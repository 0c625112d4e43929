#![forbid(unsafe_code)]
//! zbridge-mem: foreign memory staging with guaranteed release.
//!
//! Every byte that crosses into a codec module's linear memory is staged
//! through an `Arena`. Allocations are RAII guards: dropping one frees the
//! region, so an early `?` return cannot leak foreign memory. The
//! `AllocationLedger` counts allocate/release pairs so the no-leak property is
//! observable from tests.
//!
//! `LinearHeap` is the byte space plus allocator used by the in-process engine
//! in `zbridge-io`; wasm-hosted modules bring their own.

pub mod arena;
pub mod heap;
pub mod tracking;

pub use arena::{Arena, ForeignAllocation};
pub use heap::{LinearHeap, PAGE_SIZE};
pub use tracking::{AllocationLedger, LedgerSnapshot};
