use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(
    name = "chunkstore",
    about = "Chunked object storage over size-bounded blob backends",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file (or stdin) as an object
    Put(PutArgs),
    /// Read and verify an object into a file (or stdout)
    Get(GetArgs),
    /// Delete an object and all of its parts
    Rm(UrnArgs),
    /// Show an object's header
    Stat(StatArgs),
    /// Check every part hash of an object
    Verify(UrnArgs),
    /// Print a freshly generated urn
    NewUrn,
    /// Print the pool this store writes to
    StorageId,
}

#[derive(Args)]
pub struct UrnArgs {
    pub urn: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub urn: String,
    /// Input file; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub urn: String,
    /// Output file; stdout when omitted
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct StatArgs {
    pub urn: String,
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}
