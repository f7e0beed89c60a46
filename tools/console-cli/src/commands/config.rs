//! Configuration management commands.

use std::fs;

use anyhow::{bail, Result};
use console_sdk::prelude::generate_default_config;

use super::{ConfigArgs, ConfigCommand};
use crate::context::Context;
use crate::output::{format_millis, mask};

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Init {
            path,
            base_url,
            force,
        } => init_config(&path, &base_url, force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        let mut config = ctx.config.clone();
        config.auth.access_token = config.auth.access_token.as_deref().map(mask);
        config.auth.refresh_token = config.auth.refresh_token.as_deref().map(mask);
        ctx.output.json(&config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    let config = &ctx.config;
    ctx.output.header("[api]");
    ctx.output.kv("base_url", &config.api.base_url);
    ctx.output.kv("timeout", &format_millis(config.api.timeout_ms));
    for (key, value) in &config.api.default_headers {
        ctx.output.kv(&format!("header {}", key), value);
    }

    ctx.output.header("[cache]");
    let ttl = match config.cache.ttl() {
        Some(ttl) => format_millis(ttl.as_millis() as u64),
        None => "never expires".to_string(),
    };
    ctx.output.kv("ttl", &ttl);

    ctx.output.header("[auth]");
    let token = config.auth.access_token.as_deref().map_or_else(|| "(none)".to_string(), mask);
    ctx.output.kv("access_token", &token);
    ctx.output.kv(
        "refresh_token",
        if config.auth.refresh_token.is_some() { "set" } else { "(none)" },
    );
    ctx.output.kv("refresh_path", &config.auth.refresh_path);
    ctx.output.kv("auth_expired_codes", &config.auth.auth_expired_codes.join(", "));
    ctx.output.kv("unavailable_codes", &config.auth.unavailable_codes.join(", "));
    ctx.output.kv("max_refresh_cycles", &config.auth.max_refresh_cycles.to_string());

    ctx.output.header("[tree]");
    ctx.output.kv("page_size", &config.tree.page_size.to_string());
    ctx.output.kv("search_debounce", &format_millis(config.tree.search_debounce_ms));

    ctx.output.header("[logging]");
    ctx.output.kv("level", &config.logging.level);
    ctx.output.kv("format", &format!("{:?}", config.logging.format).to_lowercase());

    Ok(())
}

fn init_config(path: &str, base_url: &str, force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.resolve_path(path);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    fs::write(&config_path, generate_default_config(base_url))?;
    ctx.output
        .success(&format!("Created: {}", config_path.display()));

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    if ctx.config_path.is_none() {
        ctx.output
            .warn("No config file found, validated built-in defaults");
    }
    ctx.output.success("Configuration is valid");
    Ok(())
}
