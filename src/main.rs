//! Trellis - unified CLI entrypoint.
//!
//! Usage:
//!   trellis slot <key>
//!   trellis route <key> --config config/trellis.toml
//!   trellis nodes --config config/trellis.toml
//!   trellis exec [--node host:port] <command> [args...]
//!   trellis config validate --config config/trellis.toml

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use trellis::cli::commands::{run_config, run_exec, run_nodes, run_route, run_slot};
use trellis::cli::{Cli, Commands};
use trellis::config::{Config, ConfigOverrides};

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over the configured level.
#[cfg(feature = "telemetry")]
fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_level: &str) {}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine config path - use global --config or default
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/trellis.toml"));

    let overrides = ConfigOverrides {
        log_level: cli.log_level,
        seeds: cli.seeds,
        fanout_timeout_ms: None,
    };

    let load = || -> Result<Config> {
        let mut config = if !overrides.seeds.is_empty() && !config_path.exists() {
            seeds_only_config(&overrides.seeds)?
        } else {
            Config::from_file(&config_path)
                .with_context(|| format!("failed to load config from {:?}", config_path))?
        };
        config.apply_overrides(&overrides);
        config.validate()?;
        init_tracing(&config.telemetry.log_level);
        Ok(config)
    };

    match cli.command {
        Commands::Slot(args) => run_slot(args),
        Commands::Route(args) => run_route(load()?, args).await,
        Commands::Nodes(args) => run_nodes(load()?, args).await,
        Commands::Exec(args) => run_exec(load()?, args).await,
        Commands::Config(args) => run_config(args, &config_path),
    }
}

/// Configuration for `--seed` without a config file.
fn seeds_only_config(seeds: &[String]) -> Result<Config> {
    let seeds = seeds
        .iter()
        .map(|s| format!("{:?}", s))
        .collect::<Vec<_>>()
        .join(", ");
    Config::from_toml(&format!(
        "[cluster]\ndiscovery = \"cluster-slots\"\nseeds = [{}]\n",
        seeds
    ))
}
