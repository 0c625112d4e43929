//! Data model shared by the service and the backends.

use serde::{Deserialize, Serialize};

use crate::abi::{CONTENTSIZE_ERROR, CONTENTSIZE_UNKNOWN};
use crate::error::{Error, Result};

/// Level used when the caller supplies none (or zero).
pub const DEFAULT_LEVEL: i32 = 3;

/// Output capacity used when a frame does not declare its content size.
pub const DEFAULT_HEAP_SIZE: usize = 1024 * 1024; // 1 MiB

/// Resolve a caller-supplied compression level.
///
/// `None` and `Some(0)` both select `default`; every other value is passed to
/// the codec verbatim (zstd clamps out-of-range levels itself).
#[inline]
pub fn resolve_level(level: Option<i32>, default: i32) -> i32 {
    match level {
        None | Some(0) => default,
        Some(l) => l,
    }
}

/// Declared original length of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeHint {
    Known(u64),
    Unknown,
}

impl SizeHint {
    /// Interpret the raw answer of `ZSTD_getFrameContentSize`.
    ///
    /// The error sentinel is surfaced as a codec failure rather than folded
    /// into `Unknown`.
    pub fn from_raw(raw: u64) -> Result<Self> {
        match raw {
            CONTENTSIZE_UNKNOWN => Ok(SizeHint::Unknown),
            CONTENTSIZE_ERROR => Err(Error::Codec {
                operation: "frame_content_size",
                code: raw,
            }),
            n => Ok(SizeHint::Known(n)),
        }
    }

    /// Output capacity to reserve for this hint.
    pub fn resolve(self, opts: &DecompressOptions) -> u64 {
        match self {
            SizeHint::Known(n) => n,
            SizeHint::Unknown => opts.default_heap_size as u64,
        }
    }
}

/// Options for `decompress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressOptions {
    /// Bytes reserved for output when the frame's content size is unknown.
    /// Frames that inflate past this fail with a codec error.
    pub default_heap_size: usize,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        Self {
            default_heap_size: DEFAULT_HEAP_SIZE,
        }
    }
}

impl DecompressOptions {
    pub fn with_default_heap_size(default_heap_size: usize) -> Self {
        Self { default_heap_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_heap_size == 0 {
            return Err(Error::Config(
                "default_heap_size must be a positive byte count".into(),
            ));
        }
        Ok(())
    }
}
