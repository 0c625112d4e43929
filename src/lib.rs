//! zbridge: leak-free byte-buffer compression through a foreign zstd module.
//!
//! This facade re-exports the workspace crates so integration tests and
//! benches depend on one name. See `zbridge_exec::CodecRuntime` for the entry
//! point.

pub use zbridge_core::{abi, types};
pub use zbridge_exec as exec;
pub use zbridge_io as io;
pub use zbridge_mem as mem;

pub use zbridge_core::abi::ForeignModule;
pub use zbridge_core::{DecompressOptions, Error, Result, RuntimeConfig, SizeHint};
pub use zbridge_exec::{CodecRuntime, CompressionService, GateState};
pub use zbridge_io::{ModuleSource, NativeModule};
pub use zbridge_mem::LedgerSnapshot;
