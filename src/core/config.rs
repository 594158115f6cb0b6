//! Configuration parsing and validation.
//!
//! Trellis configuration is loaded from TOML files with CLI overrides.
//! Sections follow the router's components: cluster membership, the node
//! connection pool, the router itself and telemetry.

use crate::cluster::node::Node;
use crate::cluster::slot::SLOT_COUNT;
use crate::cluster::topology::SlotRange;
use crate::node::PoolConfig;
use crate::router::RouterConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster membership configuration.
    pub cluster: ClusterConfig,

    /// Node connection pool configuration.
    #[serde(default)]
    pub pool: PoolSection,

    /// Router configuration.
    #[serde(default)]
    pub router: RouterSection,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// How slot ownership is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Discovery {
    /// Slot ranges listed in `[[cluster.slots]]`.
    Static,
    /// `CLUSTER SLOTS` sent to the seed nodes.
    ClusterSlots,
}

/// Cluster membership configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Discovery mode: "static" or "cluster-slots".
    #[serde(default = "default_discovery")]
    pub discovery: Discovery,

    /// Seed node addresses for cluster-slots discovery.
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Refuse topologies that leave slots without an owner.
    #[serde(default = "default_require_full_coverage")]
    pub require_full_coverage: bool,

    /// Background refresh interval in seconds; 0 disables it.
    #[serde(default)]
    pub refresh_interval_seconds: u64,

    /// Slot ranges for static discovery.
    #[serde(default)]
    pub slots: Vec<SlotRangeConfig>,
}

/// One statically configured slot range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRangeConfig {
    /// First slot, inclusive.
    pub start: u16,
    /// Last slot, inclusive.
    pub end: u16,
    /// Owner address as `host:port`.
    pub node: String,
}

/// Node connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSection {
    /// Connections checked out at once per node.
    #[serde(default = "default_max_connections_per_node")]
    pub max_connections_per_node: usize,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per read/write timeout in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_connections_per_node: default_max_connections_per_node(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    /// Fan-out deadline in milliseconds; 0 waits for every node.
    #[serde(default = "default_fanout_timeout_ms")]
    pub fanout_timeout_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            fanout_timeout_ms: default_fanout_timeout_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_discovery() -> Discovery {
    Discovery::Static
}

fn default_require_full_coverage() -> bool {
    true
}

fn default_max_connections_per_node() -> usize {
    1
}

fn default_connect_timeout_ms() -> u64 {
    1_000
}

fn default_io_timeout_ms() -> u64 {
    2_000
}

fn default_fanout_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if !overrides.seeds.is_empty() {
            self.cluster.discovery = Discovery::ClusterSlots;
            self.cluster.seeds = overrides.seeds.clone();
        }
        if let Some(fanout_timeout_ms) = overrides.fanout_timeout_ms {
            self.router.fanout_timeout_ms = fanout_timeout_ms;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_cluster()?;
        self.validate_pool()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_cluster(&self) -> Result<()> {
        match self.cluster.discovery {
            Discovery::Static => {
                if self.cluster.slots.is_empty() {
                    anyhow::bail!("cluster.slots required for static discovery");
                }
                self.slot_ranges()?;
            }
            Discovery::ClusterSlots => {
                if self.cluster.seeds.is_empty() {
                    anyhow::bail!("cluster.seeds required for cluster-slots discovery");
                }
            }
        }
        // seeds are parsed even when unused so typos surface early
        self.seed_nodes()?;
        Ok(())
    }

    fn validate_pool(&self) -> Result<()> {
        if self.pool.max_connections_per_node == 0 {
            anyhow::bail!("pool.max_connections_per_node must be > 0");
        }
        if self.pool.connect_timeout_ms == 0 {
            anyhow::bail!("pool.connect_timeout_ms must be > 0");
        }
        if self.pool.io_timeout_ms == 0 {
            anyhow::bail!("pool.io_timeout_ms must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                LOG_LEVELS,
                self.telemetry.log_level
            );
        }
        Ok(())
    }

    /// Statically configured slot ranges.
    pub fn slot_ranges(&self) -> Result<Vec<SlotRange>> {
        self.cluster
            .slots
            .iter()
            .enumerate()
            .map(|(i, range)| {
                if range.start > range.end {
                    anyhow::bail!(
                        "cluster.slots[{}]: start ({}) is after end ({})",
                        i,
                        range.start,
                        range.end
                    );
                }
                if range.end >= SLOT_COUNT {
                    anyhow::bail!(
                        "cluster.slots[{}]: end ({}) must be below {}",
                        i,
                        range.end,
                        SLOT_COUNT
                    );
                }
                let node: Node = range
                    .node
                    .parse()
                    .with_context(|| format!("cluster.slots[{}].node", i))?;
                Ok(SlotRange::new(range.start, range.end, node))
            })
            .collect()
    }

    /// Seed nodes for discovery.
    pub fn seed_nodes(&self) -> Result<Vec<Node>> {
        self.cluster
            .seeds
            .iter()
            .map(|seed| {
                seed.parse::<Node>()
                    .with_context(|| format!("cluster.seeds: {}", seed))
            })
            .collect()
    }

    /// Background refresh interval, if enabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.cluster.refresh_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Read/write timeout for node connections.
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.pool.io_timeout_ms)
    }

    /// Pool settings.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections_per_node: self.pool.max_connections_per_node,
            connect_timeout: Duration::from_millis(self.pool.connect_timeout_ms),
        }
    }

    /// Router settings.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            fanout_timeout: match self.router.fanout_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Switch to cluster-slots discovery with these seeds.
    pub seeds: Vec<String>,
    /// Override the fan-out deadline.
    pub fanout_timeout_ms: Option<u64>,
}
