//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use trellis::cluster::membership::StaticMembership;
use trellis::cluster::topology::{SlotRange, TopologyRegistry};
use trellis::node::{MemoryConnector, MemoryNode, NodeConnectionPool, PoolConfig};
use trellis::protocol::RedisCommand;
use trellis::{ClusterConnection, ClusterRouter, Node, RouterConfig};

/// Owner of slots 0-5460.
pub fn node_a() -> Node {
    Node::new("127.0.0.1", 7000)
}

/// Owner of slots 5461-10922.
pub fn node_b() -> Node {
    Node::new("127.0.0.1", 7001)
}

/// Owner of slots 10923-16383.
pub fn node_c() -> Node {
    Node::new("127.0.0.1", 7002)
}

/// The three-node layout used throughout the tests.
pub fn three_node_ranges() -> Vec<SlotRange> {
    vec![
        SlotRange::new(0, 5460, node_a()),
        SlotRange::new(5461, 10922, node_b()),
        SlotRange::new(10923, 16383, node_c()),
    ]
}

/// An in-process cluster behind a router.
pub struct TestCluster {
    pub connector: Arc<MemoryConnector>,
    pub membership: Arc<StaticMembership>,
    pub registry: Arc<TopologyRegistry>,
    pub router: Arc<ClusterRouter>,
    pub conn: ClusterConnection,
}

impl TestCluster {
    /// Three nodes, no fan-out deadline.
    pub async fn start() -> Self {
        Self::with_config(RouterConfig::default(), PoolConfig::default()).await
    }

    /// Three nodes with custom router and pool settings.
    pub async fn with_config(router_config: RouterConfig, pool_config: PoolConfig) -> Self {
        Self::with_ranges(three_node_ranges(), router_config, pool_config).await
    }

    /// Nodes and ownership taken from `ranges`.
    pub async fn with_ranges(
        ranges: Vec<SlotRange>,
        router_config: RouterConfig,
        pool_config: PoolConfig,
    ) -> Self {
        let connector = Arc::new(MemoryConnector::new());
        for range in &ranges {
            connector.add_node(range.node.clone());
        }
        for node in connector.nodes() {
            if let Some(store) = connector.node(&node) {
                store.set_cluster_slots(ranges.clone());
            }
        }

        let membership = Arc::new(StaticMembership::new(ranges));
        let registry = Arc::new(
            TopologyRegistry::connect(membership.clone(), false)
                .await
                .expect("topology should load"),
        );
        let pool = Arc::new(NodeConnectionPool::new(connector.clone(), pool_config));
        let router = Arc::new(ClusterRouter::new(registry.clone(), pool, router_config));
        let conn = ClusterConnection::new(router.clone());

        Self {
            connector,
            membership,
            registry,
            router,
            conn,
        }
    }

    /// Store behind a node.
    pub fn store(&self, node: &Node) -> Arc<MemoryNode> {
        self.connector.node(node).expect("node is hosted")
    }

    /// Names of the commands each node received, in node order.
    pub fn received(&self) -> Vec<(Node, Vec<String>)> {
        self.connector
            .nodes()
            .into_iter()
            .map(|node| {
                let names = self.connector.command_names(&node);
                (node, names)
            })
            .collect()
    }

    /// Whether no node received any command.
    pub fn untouched(&self) -> bool {
        self.received().iter().all(|(_, names)| names.is_empty())
    }
}

/// Build a command from whitespace-free parts.
pub fn cmd(parts: &[&str]) -> RedisCommand {
    let (name, args) = parts.split_first().expect("command name");
    args.iter()
        .fold(RedisCommand::named(*name), |cmd, arg| cmd.arg(arg.to_string()))
}

/// A key that hashes into the given node's range.
pub fn key_on(node: &Node) -> &'static str {
    match node.port() {
        7000 => "key2",
        7001 => "key1",
        _ => "key4",
    }
}

/// Write a configuration file.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// A minimal valid static configuration.
pub fn create_minimal_config() -> NamedTempFile {
    create_config(
        r#"
[cluster]
discovery = "static"

[[cluster.slots]]
start = 0
end = 16383
node = "127.0.0.1:7000"
"#,
    )
}
