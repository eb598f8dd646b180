use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Stage delimited files for SQL*Loader: infer a table, convert encoding, load",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Environment file to read settings from (defaults to ./.env when present)
    #[arg(long = "env-file", global = true)]
    pub env_file: Option<PathBuf>,
    /// Data file to stage (overrides FILE_PATH)
    #[arg(short = 'f', long = "file", global = true)]
    pub file: Option<PathBuf>,
    /// Target table name (overrides TABLE_NAME)
    #[arg(short = 't', long = "table", global = true)]
    pub table: Option<String>,
    /// Legacy codepage of the data file (overrides LEGACY_ENCODING)
    #[arg(long = "legacy-encoding", global = true)]
    pub legacy_encoding: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer or reuse the table schema and write the converted file and control file
    Plan,
    /// Create the planned table and bulk load the converted file
    Apply(ApplyArgs),
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Create the table without asking for confirmation
    #[arg(long = "auto-approve")]
    pub auto_approve: bool,
    /// Do not create the table; only run the loader
    #[arg(long = "skip-table")]
    pub skip_table: bool,
}
