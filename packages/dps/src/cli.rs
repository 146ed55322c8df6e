//! Command-line interface for nfse-dps.
//!
//! Documents go to stdout (or `--output`), status lines go to stderr so the
//! output can be piped.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::{build_dps, DpsDocument};
use crate::config::ValidatorConfig;
use crate::error::{DpsError, Result};
use crate::extract::parse_authority_fields;
use crate::signature::normalize_signature_placement;
use crate::validator::XsdDispatcher;

/// Exit code for a document the validation engine rejected.
pub const EXIT_REJECTED: i32 = 2;

/// NFS-e DPS - Build, normalize and check service-provision declarations.
#[derive(Parser)]
#[command(name = "nfse-dps")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an unsigned DPS from a JSON or YAML document.
    Build {
        /// Document file (.json, .yaml or .yml)
        input: PathBuf,

        /// Write the XML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Move an embedded signature to its schema position.
    Normalize {
        /// Signed DPS XML
        input: PathBuf,

        /// Write the XML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the fields found in an authority response as JSON.
    Parse {
        /// Response XML
        input: PathBuf,
    },

    /// Check a document against the authority schema.
    Validate {
        /// XML to check
        input: PathBuf,

        /// Document type (default: DPS)
        #[arg(long)]
        tipo: Option<String>,

        /// Layout version (default: 1.00)
        #[arg(long)]
        versao: Option<String>,

        /// Validation engine endpoint (default: $XSD_VALIDATOR_URL)
        #[arg(long)]
        url: Option<String>,

        /// Engine timeout in seconds (default: $XSD_VALIDATOR_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

/// Run the CLI, returning the process exit code.
pub async fn run() -> Result<i32> {
    execute(Cli::parse()).await
}

/// Execute a parsed command line.
pub async fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Build { input, output } => build_command(&input, output.as_deref()),
        Commands::Normalize { input, output } => normalize_command(&input, output.as_deref()),
        Commands::Parse { input } => parse_command(&input),
        Commands::Validate {
            input,
            tipo,
            versao,
            url,
            timeout,
        } => {
            validate_command(
                &input,
                tipo.as_deref(),
                versao.as_deref(),
                url,
                timeout,
            )
            .await
        }
    }
}

fn build_command(input: &Path, output: Option<&Path>) -> Result<i32> {
    let document = load_document(input)?;
    let xml = build_dps(&document)?;
    emit(&xml, output)?;
    Ok(0)
}

fn normalize_command(input: &Path, output: Option<&Path>) -> Result<i32> {
    let signed = std::fs::read_to_string(input)?;
    let normalized = normalize_signature_placement(&signed);
    if normalized == signed {
        eprintln!("{}", style("Signature already in place or not found").dim());
    }
    emit(&normalized, output)?;
    Ok(0)
}

fn parse_command(input: &Path) -> Result<i32> {
    let xml = std::fs::read_to_string(input)?;
    let fields = parse_authority_fields(Some(&xml));
    if fields.is_empty() {
        eprintln!("{}", style("No known fields found").yellow());
    }
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(0)
}

async fn validate_command(
    input: &Path,
    tipo: Option<&str>,
    versao: Option<&str>,
    url: Option<String>,
    timeout: Option<u64>,
) -> Result<i32> {
    let xml = std::fs::read_to_string(input)?;
    let config = validator_config(url, timeout)?;
    let dispatcher = XsdDispatcher::from_config(&config)?;

    eprintln!(
        "{} {} against {}",
        style("Validating").bold(),
        style(input.display()).cyan(),
        style(&config.endpoint).green()
    );

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message("Waiting for validation engine...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = dispatcher.validate_against_xsd(&xml, tipo, versao).await;
    pb.finish_and_clear();
    let result = result?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.is_advisory_only() {
        eprintln!("{}", style("Engine unavailable, result is advisory").yellow());
    }
    if result.valid {
        eprintln!("{}", style("Valid").green().bold());
        Ok(0)
    } else {
        eprintln!(
            "{} {} error(s)",
            style("Invalid:").red().bold(),
            result.errors.len()
        );
        Ok(EXIT_REJECTED)
    }
}

/// Environment configuration with command-line overrides applied.
fn validator_config(url: Option<String>, timeout: Option<u64>) -> Result<ValidatorConfig> {
    let base = ValidatorConfig::from_env()?;
    ValidatorConfig::builder(url.unwrap_or(base.endpoint))
        .timeout_secs(timeout.unwrap_or(base.timeout_secs))
        .engine_name(base.engine_name)
        .try_build()
}

/// Load a [`DpsDocument`], picking the format from the file extension.
pub fn load_document(path: &Path) -> Result<DpsDocument> {
    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml" | "yml") => Ok(serde_yaml_ng::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => Err(DpsError::InvalidInput(format!(
            "unsupported document format: {} (expected .json, .yaml or .yml)",
            path.display()
        ))),
    }
}

fn emit(xml: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, xml)?;
            eprintln!(
                "{} {}",
                style("Saved to:").green().bold(),
                path.display()
            );
        }
        None => println!("{xml}"),
    }
    Ok(())
}
