//! Nodes command implementation.

use super::start_runtime;
use crate::cluster::node::Node;
use crate::cluster::topology::TopologySnapshot;
use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use std::collections::BTreeMap;

/// List the cluster topology.
#[derive(Args, Debug)]
pub struct NodesArgs {}

/// Run the nodes command.
pub async fn run_nodes(config: Config, _args: NodesArgs) -> Result<()> {
    let mut runtime = start_runtime(config).await?;
    let snapshot = runtime
        .registry()
        .context("runtime has no topology")?
        .snapshot();
    runtime.stop().await?;

    print!("{}", render_topology(&snapshot));
    Ok(())
}

fn render_topology(snapshot: &TopologySnapshot) -> String {
    let mut by_node: BTreeMap<&Node, Vec<String>> = BTreeMap::new();
    for range in snapshot.ranges() {
        let span = if range.start == range.end {
            range.start.to_string()
        } else {
            format!("{}-{}", range.start, range.end)
        };
        by_node.entry(&range.node).or_default().push(span);
    }

    let mut out = format!(
        "Topology (epoch {}, {} nodes)\n",
        snapshot.epoch(),
        by_node.len()
    );
    out.push_str(&format!("{:<24} {:<8} {}\n", "Node", "Slots", "Ranges"));
    out.push_str(&format!("{}\n", "-".repeat(60)));
    for (node, spans) in &by_node {
        let owned: usize = snapshot
            .ranges()
            .iter()
            .filter(|r| &r.node == *node)
            .map(|r| r.len())
            .sum();
        out.push_str(&format!(
            "{:<24} {:<8} {}\n",
            node.to_string(),
            owned,
            spans.join(", ")
        ));
    }
    if !snapshot.is_complete() {
        out.push_str(&format!(
            "\nwarning: {} slots have no owner\n",
            snapshot.uncovered_slots()
        ));
    }
    out
}
