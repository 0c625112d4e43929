//! zbridge CLI: run files through a foreign zstd codec module.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use zbridge_core::prelude::*;
use zbridge_exec::{CodecRuntime, CompressionService};

type CliResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "zbridge")]
#[command(about = "Compress and decompress buffers through a sandboxed zstd module", long_about = None)]
struct Cli {
    /// Module locator: a path, file:// or http(s):// URL (overrides config)
    #[arg(long, global = true)]
    module: Option<String>,

    /// JSON config file, applied over ZBRIDGE_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `zbridge=debug` (default: RUST_LOG or `warn`)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a single zstd frame
    Compress {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Compression level; 0 or omitted selects the configured default
        #[arg(short, long, allow_hyphen_values = true)]
        level: Option<i32>,
    },

    /// Decompress a zstd frame
    Decompress {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Output capacity when the frame has no content size (overrides config)
        #[arg(long)]
        heap_size: Option<usize>,
    },

    /// Print the declared content size of a frame
    Inspect {
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Flags that override config values.
#[derive(Debug, Default)]
struct Overrides {
    module: Option<String>,
    heap_size: Option<usize>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let heap_size = match &self.command {
            Commands::Decompress { heap_size, .. } => *heap_size,
            _ => None,
        };
        Overrides {
            module: self.module.clone(),
            heap_size,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::try_new(f).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> CliResult {
    let file = match &cli.config {
        Some(path) => Some(fs::read_to_string(path)?),
        None => None,
    };
    let config = layer_config(RuntimeConfig::from_env(), file.as_deref(), cli.overrides())?;

    let runtime = CodecRuntime::new(config);
    runtime.load_configured().await?;
    let codec = runtime.ready().await?;
    if let Some(digest) = runtime.image_digest() {
        tracing::info!(%digest, "module ready");
    }

    match cli.command {
        Commands::Compress {
            input,
            output,
            level,
        } => compress_file(&codec, &input, &output, level)?,
        Commands::Decompress { input, output, .. } => {
            let opts = runtime.config().decompress_options();
            decompress_file(&codec, &input, &output, opts)?
        }
        Commands::Inspect { input } => inspect_file(&codec, &input)?,
    }

    let ledger = serde_json::to_string(&codec.ledger())?;
    tracing::debug!(%ledger, memory_size = codec.memory_size()?, "foreign memory ledger");
    Ok(())
}

/// Environment, then config file, then flags; the result is validated.
fn layer_config(
    mut config: RuntimeConfig,
    file: Option<&str>,
    overrides: Overrides,
) -> Result<RuntimeConfig> {
    if let Some(doc) = file {
        config.apply_json(doc)?;
    }
    if let Some(module) = overrides.module {
        config.module_uri = Some(module);
    }
    if let Some(size) = overrides.heap_size {
        config.default_heap_size = size;
    }
    config.validate()?;
    Ok(config)
}

fn compress_file(
    codec: &CompressionService,
    input: &Path,
    output: &Path,
    level: Option<i32>,
) -> CliResult {
    let data = fs::read(input)?;
    let frame = codec.compress(&data, level)?;
    fs::write(output, &frame)?;
    println!(
        "{} -> {} ({} -> {} bytes)",
        input.display(),
        output.display(),
        data.len(),
        frame.len()
    );
    Ok(())
}

fn decompress_file(
    codec: &CompressionService,
    input: &Path,
    output: &Path,
    opts: DecompressOptions,
) -> CliResult {
    let frame = fs::read(input)?;
    let data = codec.decompress(&frame, opts)?;
    fs::write(output, &data)?;
    println!(
        "{} -> {} ({} -> {} bytes)",
        input.display(),
        output.display(),
        frame.len(),
        data.len()
    );
    Ok(())
}

fn inspect_file(codec: &CompressionService, input: &Path) -> CliResult {
    let frame = fs::read(input)?;
    println!("Frame: {}", input.display());
    println!("  Compressed size: {} bytes", frame.len());
    match codec.frame_size_hint(&frame)? {
        SizeHint::Known(n) => println!("  Content size: {n} bytes"),
        SizeHint::Unknown => println!("  Content size: unknown (decompress uses the default heap size)"),
    }
    println!("  Module: {}", codec.module_name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{layer_config, Cli, Overrides, RuntimeConfig};
    use clap::{CommandFactory, Parser};

    #[test]
    fn config_file_overrides_env_defaults() {
        let config = layer_config(
            RuntimeConfig::default(),
            Some(r#"{ "default_level": 9, "default_heap_size": 4096 }"#),
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(config.default_level, 9);
        assert_eq!(config.default_heap_size, 4096);
        assert!(config.module_uri.is_none());
        assert_eq!(config.max_memory_pages, RuntimeConfig::default().max_memory_pages);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let result = layer_config(
            RuntimeConfig::default(),
            Some(r#"{ "level": 9 }"#),
            Overrides::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn cli_overrides_higher_priority_than_config() {
        let env = RuntimeConfig {
            module_uri: Some("/opt/env.wasm".into()),
            default_level: 5,
            fetch_timeout_ms: 250,
            ..Default::default()
        };
        let cli = Cli::parse_from([
            "zbridge",
            "--module",
            "/opt/flag.wasm",
            "decompress",
            "-i",
            "in.zst",
            "-o",
            "out",
            "--heap-size",
            "8192",
        ]);
        let config = layer_config(
            env,
            Some(r#"{ "module_uri": "/opt/file.wasm", "default_level": 9, "default_heap_size": 4096 }"#),
            cli.overrides(),
        )
        .unwrap();

        assert_eq!(config.module_uri.as_deref(), Some("/opt/flag.wasm"));
        assert_eq!(config.default_heap_size, 8192);
        assert_eq!(config.default_level, 9, "file beats env");
        assert_eq!(config.fetch_timeout_ms, 250, "env survives untouched keys");
    }

    #[test]
    fn flags_can_repair_an_invalid_file_value() {
        let config = layer_config(
            RuntimeConfig::default(),
            Some(r#"{ "default_heap_size": 0 }"#),
            Overrides {
                heap_size: Some(1024),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.default_heap_size, 1024);

        let err = layer_config(
            RuntimeConfig::default(),
            Some(r#"{ "default_heap_size": 0 }"#),
            Overrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_heap_size"));
    }

    #[test]
    fn heap_size_flag_only_comes_from_decompress() {
        let cli = Cli::parse_from(["zbridge", "inspect", "-i", "x.zst"]);
        let o = cli.overrides();
        assert!(o.module.is_none());
        assert!(o.heap_size.is_none());
    }

    #[test]
    fn command_line_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
