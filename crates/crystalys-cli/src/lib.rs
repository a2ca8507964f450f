//! Crystalys CLI library
//!
//! Command definitions, configuration loading and command handlers for the
//! `crystalys` binary: artifact URL derivation, artifact download and
//! decompression, and metadata inspection.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands, ConfigAction};
pub use commands::CommandDispatcher;
pub use config::{CliAppConfig, CliConfig, ConfigError};
pub use error::{CliError, Result};
