//! Module lifecycle: load once, then hand out services.

use std::sync::OnceLock;

use zbridge_core::abi::ForeignModule;
use zbridge_core::config::RuntimeConfig;
use zbridge_core::error::{Error, Result};
use zbridge_io::{build_module, ModuleSource};

use crate::gate::{GateState, Initialization, ReadinessGate};
use crate::service::CompressionService;

/// Owns the readiness gate and, once it opens, the loaded module.
///
/// ```no_run
/// # async fn demo() -> zbridge_core::Result<()> {
/// use zbridge_core::{DecompressOptions, RuntimeConfig};
/// use zbridge_exec::CodecRuntime;
/// use zbridge_io::ModuleSource;
///
/// let runtime = CodecRuntime::new(RuntimeConfig::default());
/// runtime.load(ModuleSource::Builtin).await?;
/// let codec = runtime.ready().await?;
/// let frame = codec.compress(b"hello", None)?;
/// assert_eq!(codec.decompress(&frame, DecompressOptions::default())?, b"hello");
/// # Ok(())
/// # }
/// ```
pub struct CodecRuntime {
    config: RuntimeConfig,
    gate: ReadinessGate,
    service: OnceLock<CompressionService>,
    digest: OnceLock<String>,
}

impl CodecRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            gate: ReadinessGate::new(),
            service: OnceLock::new(),
            digest: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn state(&self) -> GateState {
        self.gate.state()
    }

    /// blake3 of the loaded image; `None` for the built-in engine or before load.
    pub fn image_digest(&self) -> Option<&str> {
        self.digest.get().map(String::as_str)
    }

    /// Parse `locator` and load it. A bad locator leaves the gate untouched.
    pub async fn load_locator(&self, locator: &str) -> Result<()> {
        let source = ModuleSource::parse(locator)?;
        self.load(source).await
    }

    /// Load whatever `module_uri` in the config points at (built-in when unset).
    pub async fn load_configured(&self) -> Result<()> {
        let source = ModuleSource::from_config(&self.config)?;
        self.load(source).await
    }

    /// Fetch and instantiate a module, then open the gate.
    ///
    /// Configuration problems are reported before the gate leaves
    /// `Uninitialized`. Once initialization has begun, a failure moves the
    /// gate to `Failed` so pending `ready()` calls resolve with an error. The
    /// same happens when this future is dropped before it completes.
    /// Loading twice is a lifecycle error.
    pub async fn load(&self, source: ModuleSource) -> Result<()> {
        self.config.validate()?;
        source.ensure_supported()?;
        let init = self.gate.begin()?;

        tracing::info!(source = %source.describe(), "loading codec module");
        match self.instantiate(&source).await {
            Ok((module, digest)) => {
                if let Some(digest) = digest {
                    tracing::info!(%digest, module = module.name(), "codec module image verified");
                    let _ = self.digest.set(digest);
                }
                self.install(init, module)
            }
            Err(e) => {
                tracing::warn!(source = %source.describe(), error = %e, "codec module failed to load");
                init.mark_failed(e.to_string())?;
                Err(e)
            }
        }
    }

    /// Install an already-instantiated module.
    pub fn load_module(&self, module: Box<dyn ForeignModule>) -> Result<()> {
        let init = self.gate.begin()?;
        tracing::info!(module = module.name(), "installing codec module");
        self.install(init, module)
    }

    /// Wait for the gate, then hand out the service.
    pub async fn ready(&self) -> Result<CompressionService> {
        self.gate.wait().await?;
        self.try_service()
    }

    /// Non-waiting variant of `ready`.
    pub fn try_service(&self) -> Result<CompressionService> {
        self.service.get().cloned().ok_or_else(|| {
            Error::Lifecycle(format!(
                "codec module is not ready (state: {:?})",
                self.gate.state()
            ))
        })
    }

    async fn instantiate(
        &self,
        source: &ModuleSource,
    ) -> Result<(Box<dyn ForeignModule>, Option<String>)> {
        let image = source.fetch(&self.config).await?;
        let digest = image.as_ref().map(|i| i.digest.clone());

        let cfg = self.config.clone();
        let module = tokio::task::spawn_blocking(move || build_module(image.as_ref(), &cfg))
            .await
            .map_err(|e| Error::Load(format!("module instantiation task failed: {e}")))??;
        Ok((module, digest))
    }

    fn install(&self, init: Initialization<'_>, module: Box<dyn ForeignModule>) -> Result<()> {
        let service = CompressionService::new(module, self.config.default_level);
        if self.service.set(service).is_err() {
            let err = Error::Lifecycle("codec module already installed".into());
            init.mark_failed(err.to_string())?;
            return Err(err);
        }
        init.mark_ready()
    }
}
