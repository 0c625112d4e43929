use thiserror::Error;

/// Canonical result for every zbridge crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported module source or invalid settings. Raised before any
    /// foreign memory is touched.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The foreign allocator handed back null, or the request cannot be
    /// addressed by 32-bit linear memory.
    #[error("foreign allocation of {requested} bytes failed (tag '{tag}')")]
    Allocation { tag: &'static str, requested: usize },

    /// A codec entry point reported failure through its is-error predicate.
    #[error("{operation} failed with codec status {code:#x}")]
    Codec { operation: &'static str, code: u64 },

    /// Caller-side misuse of an allocation (oversized read/write).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Readiness gate misuse: double load, or use before the module is ready.
    #[error("module lifecycle: {0}")]
    Lifecycle(String),

    /// The foreign runtime aborted inside an entry point.
    #[error("foreign module trapped in `{export}`: {cause}")]
    Trap { export: &'static str, cause: String },

    /// The module image could not be compiled, linked, or initialized.
    #[error("module load failed: {0}")]
    Load(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Shorthand used by backends when an export aborts.
    pub fn trap(export: &'static str, cause: impl ToString) -> Self {
        Error::Trap {
            export,
            cause: cause.to_string(),
        }
    }

    /// True for the codec-reported failure kind.
    pub fn is_codec(&self) -> bool {
        matches!(self, Error::Codec { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
