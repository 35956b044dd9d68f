use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{DEFAULT_EARNER_PATH, DEFAULT_SCHEMA_PATH, DEFAULT_STORE_PATH},
    source::DEFAULT_SOURCE_COLUMN,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Normalize commission statements into one deduplicated store",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize a source export and merge it into the store
    Ingest(IngestArgs),
    /// Run a named report command over the store
    Report(ReportArgs),
    /// List the available report commands and their parameters
    #[command(name = "commands")]
    ListCommands,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Source CSV/TSV export to ingest
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Mapping config (YAML or JSON) from canonical fields to source columns
    #[arg(short = 'c', long = "config")]
    pub mapping: PathBuf,
    /// Canonical schema config
    #[arg(long, default_value = DEFAULT_SCHEMA_PATH)]
    pub schema: PathBuf,
    /// Earner classification config; a missing file classifies everyone as Agent
    #[arg(long, default_value = DEFAULT_EARNER_PATH)]
    pub earners: PathBuf,
    /// Persisted store file
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    pub store: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Column that receives the source label derived from the file name
    #[arg(long = "source-column", default_value = DEFAULT_SOURCE_COLUMN)]
    pub source_column: String,
    /// Do not add the source label column
    #[arg(long = "no-source-tag", conflicts_with = "source_column")]
    pub no_source_tag: bool,
    /// Normalize without touching the store
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Print the first N normalized rows as a table
    #[arg(long)]
    pub preview: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Report command name (see `commands`)
    pub command: String,
    /// Command parameter as key=value (repeatable)
    #[arg(short = 'p', long = "param", action = clap::ArgAction::Append)]
    pub params: Vec<String>,
    /// Persisted store file
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    pub store: PathBuf,
    /// Emit CSV instead of a table
    #[arg(long)]
    pub csv: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err(format!("Delimiter '{other}' must be a single character"));
            }
            if !first.is_ascii() || first == '"' || first == '\n' {
                return Err(format!("Delimiter '{other}' is not usable"));
            }
            Ok(first as u8)
        }
    }
}
