//! Convenient re-exports for downstream crates.

pub use crate::abi::{ForeignModule, ForeignPtr, Status};
pub use crate::config::RuntimeConfig;
pub use crate::error::{Error, Result};
pub use crate::types::{resolve_level, DecompressOptions, SizeHint, DEFAULT_LEVEL};
