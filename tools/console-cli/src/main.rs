//! Console CLI - talk to the admin console's backing services.
//!
//! Commands:
//! - `console get` - Send a GET through the guarded, cached client
//! - `console tree` - Load a resource hierarchy page by page
//! - `console config` - Manage configuration

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use console_sdk::prelude::{init_logging, verbosity_level, LoggingConfig};

use commands::{ConfigArgs, GetArgs, TreeArgs};

/// Console CLI - query admin console services with token refresh and caching
#[derive(Parser)]
#[command(name = "console")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Answer requests from a replay script instead of the network
    #[arg(long, global = true)]
    replay: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a resource and print its body
    Get(GetArgs),

    /// Load and print a resource tree
    Tree(TreeArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = output::Output::new(cli.verbose > 0, cli.json);
    let ctx = context::Context::load(cli.config.as_deref(), cli.replay.as_deref(), output)?;

    let logging = LoggingConfig {
        level: verbosity_level(&ctx.config.logging.level, cli.verbose),
        format: ctx.config.logging.format,
    };
    if let Err(e) = init_logging(&logging) {
        ctx.output.warn(&format!("logging disabled: {}", e));
    }

    let result = match cli.command {
        Commands::Get(args) => commands::get::run(args, &ctx).await,
        Commands::Tree(args) => commands::tree::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };
    ctx.report_notices();

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "console", "tree", "/api/resources", "--depth", "2", "-vv", "--replay", "demo.json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.replay.as_deref(), Some("demo.json"));
        assert!(matches!(cli.command, Commands::Tree(ref args) if args.depth == 2));
    }
}
