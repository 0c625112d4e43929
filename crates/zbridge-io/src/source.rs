//! Module sources and image fetching.
//!
//! The source form is decided entirely by the locator's scheme. Anything other
//! than `file`, `http` or `https` (or a bare path) is rejected with
//! `Error::Config` before a single byte is fetched.

use std::path::PathBuf;
#[cfg(feature = "http")]
use std::time::Duration;

use url::Url;

use zbridge_core::config::RuntimeConfig;
use zbridge_core::error::{Error, Result};

const WASM_MAGIC: &[u8; 4] = b"\0asm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// The in-process engine; nothing to fetch.
    Builtin,
    Path(PathBuf),
    Url(Url),
    /// An image the caller already holds.
    Bytes { origin: String, bytes: Vec<u8> },
}

impl ModuleSource {
    /// Classify a locator by scheme.
    pub fn parse(locator: &str) -> Result<Self> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(Error::Config("empty module locator".into()));
        }

        match Url::parse(locator) {
            Ok(url) => match url.scheme() {
                "file" => url
                    .to_file_path()
                    .map(ModuleSource::Path)
                    .map_err(|_| Error::Config(format!("invalid file URL '{locator}'"))),
                "http" | "https" => Ok(ModuleSource::Url(url)),
                other => Err(Error::Config(format!(
                    "unsupported module scheme '{other}'"
                ))),
            },
            // No scheme: treat as a filesystem path.
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(ModuleSource::Path(PathBuf::from(locator)))
            }
            Err(e) => Err(Error::Config(format!(
                "invalid module locator '{locator}': {e}"
            ))),
        }
    }

    /// `module_uri` from the config, or the built-in engine when unset.
    pub fn from_config(cfg: &RuntimeConfig) -> Result<Self> {
        match cfg.module_uri.as_deref() {
            None => Ok(ModuleSource::Builtin),
            Some(uri) => Self::parse(uri),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ModuleSource::Builtin => "builtin".to_string(),
            ModuleSource::Path(p) => p.display().to_string(),
            ModuleSource::Url(u) => u.to_string(),
            ModuleSource::Bytes { origin, .. } => origin.clone(),
        }
    }

    /// Fail fast when this build cannot serve the source at all.
    pub fn ensure_supported(&self) -> Result<()> {
        if matches!(self, ModuleSource::Builtin) {
            return Ok(());
        }
        if cfg!(not(feature = "wasmtime")) {
            return Err(Error::Config(format!(
                "cannot load module image '{}': zbridge was built without the `wasmtime` feature; rebuild with `--features zbridge-io/wasmtime`",
                self.describe()
            )));
        }
        if matches!(self, ModuleSource::Url(_)) && cfg!(not(feature = "http")) {
            return Err(Error::Config(format!(
                "cannot fetch '{}': zbridge was built without the `http` feature; rebuild with `--features zbridge-io/http`",
                self.describe()
            )));
        }
        Ok(())
    }

    /// Fetch the module image. `Ok(None)` for the built-in engine.
    #[cfg_attr(not(feature = "http"), allow(unused_variables))]
    pub async fn fetch(&self, cfg: &RuntimeConfig) -> Result<Option<ModuleImage>> {
        let image = match self {
            ModuleSource::Builtin => return Ok(None),
            ModuleSource::Path(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| Error::Io(format!("read {}: {e}", path.display())))?;
                ModuleImage::new(self.describe(), bytes)
            }
            ModuleSource::Url(url) => {
                #[cfg(feature = "http")]
                {
                    let timeout = Duration::from_millis(cfg.fetch_timeout_ms);
                    ModuleImage::new(self.describe(), fetch_http(url, timeout).await?)
                }

                #[cfg(not(feature = "http"))]
                {
                    return Err(Error::Config(format!(
                        "cannot fetch '{url}': zbridge was built without the `http` feature; rebuild with `--features zbridge-io/http`"
                    )));
                }
            }
            ModuleSource::Bytes { origin, bytes } => ModuleImage::new(origin.clone(), bytes.clone()),
        };

        tracing::debug!(
            origin = %image.origin,
            bytes = image.bytes.len(),
            digest = %image.digest,
            "fetched module image"
        );
        Ok(Some(image))
    }
}

#[cfg(feature = "http")]
async fn fetch_http(url: &Url, timeout: Duration) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Load(format!("http client: {e}")))?;

    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::Io(format!("GET {url}: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Load(format!("GET {url} returned {status}")));
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| Error::Io(format!("GET {url}: {e}")))?;
    Ok(body.to_vec())
}

/// A fetched codec image plus a content digest for diagnostics.
#[derive(Debug, Clone)]
pub struct ModuleImage {
    pub origin: String,
    pub bytes: Vec<u8>,
    /// blake3 of `bytes`, hex-encoded.
    pub digest: String,
}

impl ModuleImage {
    pub fn new(origin: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = blake3::hash(&bytes).to_hex().to_string();
        Self {
            origin: origin.into(),
            bytes,
            digest,
        }
    }

    /// Starts with the wasm binary magic.
    pub fn is_wasm(&self) -> bool {
        self.bytes.starts_with(WASM_MAGIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("zbridge-source-tests-{name}"));
        p
    }

    #[test]
    fn schemes_select_the_source_form() {
        assert!(matches!(
            ModuleSource::parse("file:///opt/codec/zstd.wasm").unwrap(),
            ModuleSource::Path(p) if p == PathBuf::from("/opt/codec/zstd.wasm")
        ));
        assert!(matches!(
            ModuleSource::parse("https://cdn.example.com/zstd.wasm").unwrap(),
            ModuleSource::Url(_)
        ));
        assert!(matches!(
            ModuleSource::parse("http://localhost:8000/zstd.wasm").unwrap(),
            ModuleSource::Url(_)
        ));
        assert!(matches!(
            ModuleSource::parse("assets/zstd.wasm").unwrap(),
            ModuleSource::Path(_)
        ));
    }

    #[test]
    fn unsupported_scheme_is_a_config_error() {
        let err = ModuleSource::parse("ftp://example.com/zstd.wasm").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("unsupported module scheme 'ftp'"));

        let err = ModuleSource::parse("data:application/wasm;base64,AGFzbQ==").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(matches!(ModuleSource::parse("   "), Err(Error::Config(_))));
    }

    #[test]
    fn config_without_uri_selects_builtin() {
        let cfg = RuntimeConfig::default();
        assert_eq!(ModuleSource::from_config(&cfg).unwrap(), ModuleSource::Builtin);
        assert!(ModuleSource::Builtin.ensure_supported().is_ok());
    }

    #[cfg(not(feature = "wasmtime"))]
    #[test]
    fn images_need_the_wasmtime_feature() {
        let err = ModuleSource::parse("/tmp/zstd.wasm")
            .unwrap()
            .ensure_supported()
            .unwrap_err();
        assert!(err.to_string().contains("without the `wasmtime` feature"));
    }

    #[tokio::test]
    async fn builtin_fetches_nothing() {
        let image = ModuleSource::Builtin
            .fetch(&RuntimeConfig::default())
            .await
            .unwrap();
        assert!(image.is_none());
    }

    #[tokio::test]
    async fn file_images_are_read_and_digested() {
        let path = temp_path("image.wasm");
        std::fs::write(&path, b"\0asm\x01\0\0\0").unwrap();

        let image = ModuleSource::Path(path.clone())
            .fetch(&RuntimeConfig::default())
            .await
            .unwrap()
            .expect("image");
        assert!(image.is_wasm());
        assert_eq!(image.bytes.len(), 8);
        assert_eq!(image.digest, blake3::hash(b"\0asm\x01\0\0\0").to_hex().to_string());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = ModuleSource::Path(temp_path("does-not-exist.wasm"))
            .fetch(&RuntimeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
