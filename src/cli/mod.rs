//! Command-line interface.
//!
//! Unified CLI for inspecting routing and running commands through the
//! router.

pub mod commands;

use clap::{Parser, Subcommand};

/// Trellis - cluster-aware command router.
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Seed node (host:port); switches to CLUSTER SLOTS discovery.
    #[arg(long = "seed", global = true)]
    pub seeds: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the hash slot of a key.
    Slot(commands::SlotArgs),
    /// Print the slot and owning node of a key.
    Route(commands::RouteArgs),
    /// List the cluster topology.
    Nodes(commands::NodesArgs),
    /// Run a command through the router.
    Exec(commands::ExecArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
