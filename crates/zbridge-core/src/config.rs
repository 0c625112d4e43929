//! Runtime configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DecompressOptions, DEFAULT_HEAP_SIZE, DEFAULT_LEVEL};

/// Largest page count a wasm32 memory can reach (4 GiB).
pub const WASM32_MAX_PAGES: u32 = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Locator of the codec module image (`file://`, `http(s)://`, or a bare
    /// path). `None` selects the built-in engine.
    pub module_uri: Option<String>,

    /// Level applied when callers pass no level (or zero).
    pub default_level: i32,

    /// Output capacity for frames without a declared content size.
    pub default_heap_size: usize,

    /// Linear memory reserved at instantiation, in 64 KiB pages.
    pub initial_memory_pages: u32,

    /// Hard cap on linear memory growth, in 64 KiB pages.
    pub max_memory_pages: u32,

    /// Timeout for fetching a module image over HTTP.
    pub fetch_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_uri: None,
            default_level: DEFAULT_LEVEL,
            default_heap_size: DEFAULT_HEAP_SIZE,
            initial_memory_pages: 16,     // 1 MiB
            max_memory_pages: 16 * 1024, // 1 GiB
            fetch_timeout_ms: 30_000,
        }
    }
}

impl RuntimeConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `ZBRIDGE_MODULE_URI`: module image locator
    /// - `ZBRIDGE_DEFAULT_LEVEL`: default compression level
    /// - `ZBRIDGE_DEFAULT_HEAP_SIZE`: unknown-size output capacity in bytes
    /// - `ZBRIDGE_INITIAL_MEMORY_PAGES`: initial linear memory pages
    /// - `ZBRIDGE_MAX_MEMORY_PAGES`: linear memory page cap
    /// - `ZBRIDGE_FETCH_TIMEOUT_MS`: HTTP fetch timeout
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("ZBRIDGE_MODULE_URI") {
            if !s.trim().is_empty() {
                cfg.module_uri = Some(s);
            }
        }

        if let Ok(s) = std::env::var("ZBRIDGE_DEFAULT_LEVEL") {
            if let Ok(v) = s.parse::<i32>() {
                cfg.default_level = v;
            }
        }

        if let Ok(s) = std::env::var("ZBRIDGE_DEFAULT_HEAP_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.default_heap_size = v;
            }
        }

        if let Ok(s) = std::env::var("ZBRIDGE_INITIAL_MEMORY_PAGES") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.initial_memory_pages = v;
            }
        }

        if let Ok(s) = std::env::var("ZBRIDGE_MAX_MEMORY_PAGES") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.max_memory_pages = v;
            }
        }

        if let Ok(s) = std::env::var("ZBRIDGE_FETCH_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.fetch_timeout_ms = v;
            }
        }

        cfg
    }

    /// Layer a JSON document over `self`. Absent keys keep their current
    /// value; unknown keys are rejected. Validation is left to the caller so
    /// later layers can still fix a field.
    pub fn apply_json(&mut self, doc: &str) -> Result<()> {
        let overlay: ConfigOverlay = serde_json::from_str(doc)?;
        overlay.apply(self);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_heap_size == 0 {
            return Err(Error::Config("default_heap_size must be positive".into()));
        }
        if self.max_memory_pages == 0 || self.max_memory_pages > WASM32_MAX_PAGES {
            return Err(Error::Config(format!(
                "max_memory_pages must be in 1..={WASM32_MAX_PAGES}, got {}",
                self.max_memory_pages
            )));
        }
        if self.initial_memory_pages > self.max_memory_pages {
            return Err(Error::Config(format!(
                "initial_memory_pages ({}) exceeds max_memory_pages ({})",
                self.initial_memory_pages, self.max_memory_pages
            )));
        }
        Ok(())
    }

    /// Scheme of `module_uri`, if it carries one.
    pub fn scheme(&self) -> Option<&str> {
        self.module_uri
            .as_deref()
            .and_then(|uri| uri.split_once("://"))
            .map(|(s, _)| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn decompress_options(&self) -> DecompressOptions {
        DecompressOptions::with_default_heap_size(self.default_heap_size)
    }
}

/// Keys a config document may set.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigOverlay {
    module_uri: Option<String>,
    default_level: Option<i32>,
    default_heap_size: Option<usize>,
    initial_memory_pages: Option<u32>,
    max_memory_pages: Option<u32>,
    fetch_timeout_ms: Option<u64>,
}

impl ConfigOverlay {
    fn apply(self, cfg: &mut RuntimeConfig) {
        if let Some(uri) = self.module_uri {
            cfg.module_uri = Some(uri);
        }
        if let Some(level) = self.default_level {
            cfg.default_level = level;
        }
        if let Some(size) = self.default_heap_size {
            cfg.default_heap_size = size;
        }
        if let Some(pages) = self.initial_memory_pages {
            cfg.initial_memory_pages = pages;
        }
        if let Some(pages) = self.max_memory_pages {
            cfg.max_memory_pages = pages;
        }
        if let Some(ms) = self.fetch_timeout_ms {
            cfg.fetch_timeout_ms = ms;
        }
    }
}
