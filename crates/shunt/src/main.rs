//! shunt — a recursive-style DNS forwarder.

use anyhow::{Context, Result};
use clap::Parser;
use shunt::{default_registry, service, Forwarder};
use shunt_metrics::tracing_setup::{init_tracing, parse_level, LogFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// A recursive-style DNS forwarder with a pluggable pipeline.
#[derive(Parser, Debug)]
#[command(name = "shunt", version, about, long_about = None)]
struct Cli {
    /// Control the system service (install, start, stop, restart, uninstall)
    #[arg(long, value_name = "ACTION")]
    service: Option<String>,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = "shunt.toml")]
    config: PathBuf,

    /// Log level (debug, info, warn, error, fatal, panic)
    #[arg(long, default_value = "info")]
    loglevel: String,

    /// List available plugins and their configuration
    #[arg(long = "listPlugins")]
    list_plugins: bool,

    /// Print configuration help for one plugin
    #[arg(long = "pluginConfig", value_name = "NAME")]
    plugin_config: Option<String>,

    /// Log as JSON instead of text
    #[arg(long)]
    json_logs: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(level) = parse_level(&cli.loglevel) else {
        eprintln!("invalid log level {:?}", cli.loglevel);
        return ExitCode::FAILURE;
    };
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(level, format);

    if let Err(err) = dispatch(cli) {
        eprintln!("error: {:#}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn dispatch(cli: Cli) -> Result<()> {
    if let Some(name) = &cli.plugin_config {
        let registry = default_registry();
        for plugin in registry.plugins() {
            if plugin.name() == *name {
                print!("{}", plugin.config_help());
            }
        }
        return Ok(());
    }

    if cli.list_plugins {
        let registry = default_registry();
        println!("Available plugins:");
        for plugin in registry.plugins() {
            println!("{}", plugin.name());
        }
        println!("\nPlugin configurations:");
        for plugin in registry.plugins() {
            print!("{}", plugin.config_help());
        }
        return Ok(());
    }

    if let Some(action) = &cli.service {
        return service::control(action, &cli.config);
    }

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(run(&cli))
}

async fn run(cli: &Cli) -> Result<()> {
    let config = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;

    let forwarder = Forwarder::configure(default_registry(), &config)?;
    forwarder.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    forwarder.stop().await;
    Ok(())
}
