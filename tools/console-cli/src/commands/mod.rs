//! CLI command implementations.

pub mod config;
pub mod get;
pub mod tree;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

/// Arguments for the get command.
#[derive(Args)]
pub struct GetArgs {
    /// Request path, e.g. /api/roles.
    pub path: String,

    /// Query parameter as key=value. Repeatable.
    #[arg(short, long = "query")]
    pub query: Vec<String>,

    /// Serve through the response cache.
    #[arg(long)]
    pub cached: bool,

    /// Send the request this many times, concurrently.
    #[arg(long, default_value = "1")]
    pub repeat: usize,
}

/// Arguments for the tree command.
#[derive(Args)]
pub struct TreeArgs {
    /// Listing endpoint, e.g. /api/resources.
    pub path: String,

    /// Filter keyword for the root level.
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Extra listing parameter as key=value. Repeatable.
    #[arg(short, long = "param")]
    pub param: Vec<String>,

    /// Levels to load; 1 loads the root level only.
    #[arg(short, long, default_value = "1")]
    pub depth: usize,

    /// Page size (default: tree.page_size from config).
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Follow every "load more" until each loaded level is complete.
    #[arg(long)]
    pub all_pages: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Write a default config file.
    Init {
        /// Target file.
        #[arg(default_value = "console.toml")]
        path: String,

        /// Base URL of the backing service.
        #[arg(long, default_value = "http://localhost:8080")]
        base_url: String,

        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}

/// Split repeated `key=value` arguments.
pub fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("expected key=value, got '{}'", pair),
        })
        .collect()
}
