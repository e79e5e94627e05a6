//! parse_save CLI
//!
//! Save file → JSON contract, with optional round-trip rewrite and check.

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "parse_save")]
#[command(about = "Parse an ONI save file and emit the JSON contract", long_about = None)]
struct Cli {
    /// Save file to parse
    input: PathBuf,

    /// Output path for the JSON contract ("-" for stdout)
    #[arg(long, default_value = "-")]
    out: String,

    /// Pretty-print the JSON
    #[arg(long, default_value = "false")]
    pretty: bool,

    /// Only log errors
    #[arg(long, short, default_value = "false")]
    quiet: bool,

    /// Codec configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the re-serialised save to this path
    #[arg(long)]
    rewrite: Option<PathBuf>,

    /// Fail unless the re-serialised save matches the input after decompression
    #[arg(long, default_value = "false")]
    verify_roundtrip: bool,
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet { "error" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    run(&cli)
}

#[cfg(feature = "cli")]
fn load_config(path: Option<&Path>) -> Result<oni_save::CodecConfig> {
    let Some(path) = path else {
        return Ok(oni_save::CodecConfig::default());
    };
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    oni_save::CodecConfig::from_yaml_str(&yaml)
        .with_context(|| format!("Invalid config {}", path.display()))
}

#[cfg(feature = "cli")]
fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read save {}", cli.input.display()))?;

    let outcome = oni_save::parse_with(&bytes, &config)
        .with_context(|| format!("Failed to parse {}", cli.input.display()))?;
    log::info!(
        "Parsed {} (version {}, {} warnings)",
        cli.input.display(),
        outcome.document.header.version_string(),
        outcome.warnings.len()
    );

    let contract = oni_save::project_outcome(&outcome);
    let json = contract.to_json_string(cli.pretty)?;
    write_output(&cli.out, &json)?;

    if cli.rewrite.is_some() || cli.verify_roundtrip {
        let rewritten = oni_save::write_document(&outcome.document, &config)?;
        if let Some(path) = &cli.rewrite {
            std::fs::write(path, &rewritten)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Rewrote save to {}", path.display());
        }
        if cli.verify_roundtrip {
            verify_roundtrip(&bytes, &rewritten, &config)?;
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn write_output(out: &str, json: &str) -> Result<()> {
    if out == "-" {
        println!("{}", json);
        return Ok(());
    }
    let path = Path::new(out);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(feature = "cli")]
fn verify_roundtrip(original: &[u8], rewritten: &[u8], config: &oni_save::CodecConfig) -> Result<()> {
    let expected = oni_save::logical_image(original, config).context("Input is not re-framable")?;
    let actual = oni_save::logical_image(rewritten, config).context("Rewrite is not re-framable")?;
    if expected != actual {
        anyhow::bail!(
            "Round-trip mismatch: {} logical bytes in, {} out",
            expected.len(),
            actual.len()
        );
    }
    log::info!("Round-trip verified ({} logical bytes)", expected.len());
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("parse_save CLI is not available. Enable the 'cli' feature to use it.");
    std::process::exit(1);
}
