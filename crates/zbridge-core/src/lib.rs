#![forbid(unsafe_code)]
//! zbridge-core: the contract between the host and a foreign zstd codec module.
//!
//! This crate only holds interfaces and plain data: the `ForeignModule` trait
//! (raw wasm32-shaped entry points), the status/sentinel encoding shared by all
//! backends, the size-hint and level policies, the canonical error type, and
//! the runtime configuration. Memory staging lives in `zbridge-mem`, backends in
//! `zbridge-io`, and the public service in `zbridge-exec`.

pub mod abi;
pub mod config;
pub mod error;
pub mod prelude;
pub mod types;

pub use abi::ForeignModule;
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use types::{DecompressOptions, SizeHint};
