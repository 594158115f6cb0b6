//! Config command implementation.

use crate::core::config::{Config, Discovery};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the configuration with defaults filled in.
    Show,
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Discovery mode (static, cluster-slots).
        #[arg(long, default_value = "static")]
        discovery: String,
    },
}

/// Run the config command against the file at `path`.
pub fn run_config(args: ConfigArgs, path: &Path) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(path),
        ConfigCommand::Show => show_config(path),
        ConfigCommand::Generate { output, discovery } => {
            generate_config(output.as_deref(), &discovery)
        }
    }
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }

    let config = Config::from_file(path)?;
    println!("✓ Configuration is valid");

    match config.cluster.discovery {
        Discovery::Static => {
            let ranges = config.slot_ranges()?;
            let owned: usize = ranges.iter().map(|r| r.len()).sum();
            println!("  static topology: {} ranges, {} slots", ranges.len(), owned);
        }
        Discovery::ClusterSlots => {
            println!("  cluster-slots discovery: {} seeds", config.cluster.seeds.len());
        }
    }
    if config.router_config().fanout_timeout.is_none() {
        println!("  ⚠ Warning: router.fanout_timeout_ms = 0, fan-outs wait for every node");
    }
    Ok(())
}

fn show_config(path: &Path) -> Result<()> {
    let config = Config::from_file(path)?;
    let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
    println!("{}", rendered);
    Ok(())
}

fn generate_config(output: Option<&Path>, discovery: &str) -> Result<()> {
    let template = match discovery {
        "static" => static_template(),
        "cluster-slots" => cluster_slots_template(),
        other => anyhow::bail!("unknown discovery mode: {}", other),
    };

    match output {
        Some(path) => {
            std::fs::write(path, template)?;
            println!("Generated {} config template: {:?}", discovery, path);
        }
        None => {
            println!("{}", template);
        }
    }

    Ok(())
}

fn static_template() -> &'static str {
    r#"# Trellis configuration: three nodes with fixed slot ranges

[cluster]
discovery = "static"
require_full_coverage = true

[[cluster.slots]]
start = 0
end = 5460
node = "127.0.0.1:7000"

[[cluster.slots]]
start = 5461
end = 10922
node = "127.0.0.1:7001"

[[cluster.slots]]
start = 10923
end = 16383
node = "127.0.0.1:7002"

[pool]
max_connections_per_node = 1
connect_timeout_ms = 1000
io_timeout_ms = 2000

[router]
fanout_timeout_ms = 5000

[telemetry]
log_level = "info"
"#
}

fn cluster_slots_template() -> &'static str {
    r#"# Trellis configuration: discover slots from seed nodes

[cluster]
discovery = "cluster-slots"
seeds = ["127.0.0.1:7000", "127.0.0.1:7001"]
require_full_coverage = true
refresh_interval_seconds = 30

[pool]
max_connections_per_node = 1
connect_timeout_ms = 1000
io_timeout_ms = 2000

[router]
fanout_timeout_ms = 5000

[telemetry]
log_level = "info"
"#
}
