#![forbid(unsafe_code)]
//! zbridge-exec: module lifecycle and the public codec surface.
//!
//! `CodecRuntime::load` walks the `ReadinessGate` from uninitialized to ready
//! (fetching and instantiating the module on the way). `CodecRuntime::ready`
//! is the only way to obtain a `CompressionService`, so no codec entry point
//! can be reached before the module finished initializing.

pub mod gate;
pub mod metrics;
pub mod runtime;
pub mod service;

pub use gate::{GateState, Initialization, ReadinessGate};
pub use runtime::CodecRuntime;
pub use service::CompressionService;
