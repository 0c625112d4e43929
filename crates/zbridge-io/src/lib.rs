#![forbid(unsafe_code)]
//! zbridge-io: where codec modules come from and what runs them.
//!
//! - `source`: locator parsing (`file://`, `http(s)://`, bare paths) and image
//!   fetching.
//! - `native`: the built-in engine, libzstd driven against an emulated linear
//!   memory with the same pointer/status ABI as a wasm build.
//! - `wasm`: a wasmtime host for a compiled zstd wasm image (feature
//!   `wasmtime`).

pub mod native;
pub mod source;
#[cfg(feature = "wasmtime")]
pub mod wasm;

pub use native::NativeModule;
pub use source::{ModuleImage, ModuleSource};
#[cfg(feature = "wasmtime")]
pub use wasm::WasmModule;

use zbridge_core::abi::ForeignModule;
use zbridge_core::config::RuntimeConfig;
#[cfg(not(feature = "wasmtime"))]
use zbridge_core::error::Error;
use zbridge_core::error::Result;

/// Instantiate the backend for a fetched image (`None` = built-in engine).
///
/// Blocking: compiling a wasm image is CPU-bound. Callers on an async runtime
/// should run this on a blocking thread.
pub fn build_module(
    image: Option<&ModuleImage>,
    cfg: &RuntimeConfig,
) -> Result<Box<dyn ForeignModule>> {
    match image {
        None => Ok(Box::new(NativeModule::from_config(cfg))),
        Some(image) => {
            #[cfg(feature = "wasmtime")]
            {
                Ok(Box::new(WasmModule::instantiate(image, cfg)?))
            }

            #[cfg(not(feature = "wasmtime"))]
            {
                Err(Error::Config(format!(
                    "cannot run module image from {}: zbridge was built without the `wasmtime` feature; rebuild with `--features zbridge-io/wasmtime`",
                    image.origin
                )))
            }
        }
    }
}
