//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crystalys_core::ArtifactKind;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the artifact host label
    #[arg(long, global = true)]
    pub host: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the download URL of a match artifact
    Url {
        /// Replay cluster of the match
        #[arg(long)]
        cluster: u32,
        /// Match id
        #[arg(long)]
        match_id: u64,
        /// Replay salt of the match
        #[arg(long)]
        salt: u32,
        /// Artifact kind: replay (dem) or metadata (meta)
        #[arg(short, long, default_value = "replay")]
        kind: ArtifactKind,
    },
    /// Download and decompress a match artifact
    Fetch {
        #[arg(long)]
        cluster: u32,
        #[arg(long)]
        match_id: u64,
        #[arg(long)]
        salt: u32,
        #[arg(short, long, default_value = "replay")]
        kind: ArtifactKind,
        /// Output file (defaults to <match_id>_<salt>.<kind> in the output directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Decompress a downloaded .bz2 artifact
    Decompress {
        /// Compressed input file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Decode a metadata artifact and print it as JSON
    Metadata {
        /// Metadata file
        file: PathBuf,
        /// Input is still bzip2-compressed
        #[arg(long)]
        compressed: bool,
    },
    /// Inspect or save configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the effective configuration to a file
    Save {
        /// Target file (defaults to ~/.crystalys/config.toml)
        path: Option<PathBuf>,
    },
}
