//! Config command - shows or saves the effective configuration.

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use lsc_config::{LayerStatus, LscConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show config file locations instead of the merged config
    #[arg(long, conflicts_with = "write")]
    pub path: bool,

    /// Save the effective config, defaults filled in, as the user config file
    #[arg(long)]
    pub write: bool,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    if args.path {
        cmd_path(ctx)
    } else if args.write {
        cmd_write(ctx)
    } else {
        cmd_show(ctx)
    }
}

/// The merged config with every section present.
fn effective(ctx: &Context) -> LscConfig {
    LscConfig {
        session: Some(ctx.loaded.config.session_or_default()),
        logging: Some(ctx.loaded.config.logging_or_default()),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let effective = effective(ctx);

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("{}", dim.apply_to("# No config files loaded (using defaults)"));
    } else {
        for source in &sources {
            println!("{}", dim.apply_to(format!("# from {}", source.display())));
        }
    }
    println!();
    print!("{}", effective.to_toml()?);
    Ok(())
}

fn cmd_write(ctx: &Context) -> Result<()> {
    let path = ctx
        .loaded
        .paths
        .user
        .as_deref()
        .context("no user config directory; pass --config-dir")?;
    lsc_config::write_config_file(&effective(ctx), path)?;
    tracing::info!(path = %path.display(), "Wrote user config");

    if ctx.json_output {
        println!("{}", serde_json::json!({ "written": path }));
    } else {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let yellow = Style::new().yellow();
    let dim = Style::new().dim();

    if ctx.loaded.paths.user.is_none() {
        println!("user     {}", yellow.apply_to("(no config directory)"));
    }
    for source in &ctx.loaded.sources {
        let status = match &source.status {
            LayerStatus::Loaded => "loaded".to_string(),
            LayerStatus::Missing => dim.apply_to("not found").to_string(),
            LayerStatus::Rejected(reason) => yellow.apply_to(format!("ignored: {reason}")).to_string(),
        };
        println!("{:<8} {:<50} {}", source.layer.to_string(), source.path.display(), status);
    }
    Ok(())
}
