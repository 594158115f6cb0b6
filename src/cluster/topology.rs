//! Slot ownership snapshots and the topology registry.
//!
//! A [`TopologySnapshot`] is an immutable slot → node table. The
//! [`TopologyRegistry`] holds the current snapshot behind an `Arc` and swaps
//! it wholesale on refresh, so readers always see one complete table:
//!
//! ```text
//!   refresh():  membership query ──► build snapshot ──► swap Arc (brief lock)
//!   lookup():   clone Arc (brief lock) ──► read snapshot without locking
//! ```

use crate::cluster::membership::MembershipSource;
use crate::cluster::node::Node;
use crate::cluster::slot::{self, SLOT_COUNT};
use crate::core::error::{RouterError, RouterResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Inclusive range of slots owned by one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    /// First slot.
    pub start: u16,
    /// Last slot (inclusive).
    pub end: u16,
    /// Owning node.
    pub node: Node,
}

impl SlotRange {
    /// Create a slot range.
    pub fn new(start: u16, end: u16, node: Node) -> Self {
        Self { start, end, node }
    }

    /// Number of slots in the range.
    pub fn len(&self) -> usize {
        (self.end as usize + 1).saturating_sub(self.start as usize)
    }

    /// Whether the range holds no slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the range contains a slot.
    pub fn contains(&self, slot: u16) -> bool {
        (self.start..=self.end).contains(&slot)
    }
}

/// Immutable slot ownership table.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    epoch: u64,
    /// Owner index into `nodes` for each slot.
    owners: Box<[Option<u16>]>,
    nodes: Vec<Node>,
    ranges: Vec<SlotRange>,
}

impl TopologySnapshot {
    /// A snapshot that owns nothing.
    pub fn empty() -> Self {
        Self {
            epoch: 0,
            owners: vec![None; SLOT_COUNT as usize].into_boxed_slice(),
            nodes: Vec::new(),
            ranges: Vec::new(),
        }
    }

    /// Build a snapshot from slot ranges.
    ///
    /// Fails if a range is inverted, reaches past the last slot, or overlaps
    /// another range. Gaps are allowed; see [`is_complete`](Self::is_complete).
    pub fn from_ranges(epoch: u64, ranges: Vec<SlotRange>) -> RouterResult<Self> {
        let mut ranges = ranges;
        ranges.sort_by_key(|r| r.start);

        for range in &ranges {
            if range.start > range.end {
                return Err(RouterError::invalid_topology(format!(
                    "range {}-{} for {} is inverted",
                    range.start, range.end, range.node
                )));
            }
            if range.end >= SLOT_COUNT {
                return Err(RouterError::invalid_topology(format!(
                    "range {}-{} for {} exceeds slot {}",
                    range.start,
                    range.end,
                    range.node,
                    SLOT_COUNT - 1
                )));
            }
        }

        for pair in ranges.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(RouterError::invalid_topology(format!(
                    "range {}-{} ({}) overlaps {}-{} ({})",
                    pair[0].start,
                    pair[0].end,
                    pair[0].node,
                    pair[1].start,
                    pair[1].end,
                    pair[1].node
                )));
            }
        }

        let nodes: Vec<Node> = ranges
            .iter()
            .map(|r| r.node.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut owners = vec![None; SLOT_COUNT as usize].into_boxed_slice();
        for range in &ranges {
            // nodes is sorted and holds every range owner
            let index = nodes.binary_search(&range.node).ok().map(|i| i as u16);
            for owner in &mut owners[range.start as usize..=range.end as usize] {
                *owner = index;
            }
        }

        Ok(Self {
            epoch,
            owners,
            nodes,
            ranges,
        })
    }

    /// Registry epoch this snapshot was installed at.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Owner of a slot.
    pub fn node_for_slot(&self, slot: u16) -> Option<&Node> {
        self.owners
            .get(slot as usize)
            .copied()
            .flatten()
            .map(|i| &self.nodes[i as usize])
    }

    /// Distinct nodes, in node order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Ranges sorted by start slot.
    pub fn ranges(&self) -> &[SlotRange] {
        &self.ranges
    }

    /// Whether every slot has an owner.
    pub fn is_complete(&self) -> bool {
        self.owners.iter().all(Option::is_some)
    }

    /// Number of slots without an owner.
    pub fn uncovered_slots(&self) -> usize {
        self.owners.iter().filter(|o| o.is_none()).count()
    }

    /// Find a node by address.
    pub fn find_node(&self, host: &str, port: u16) -> Option<&Node> {
        self.nodes.iter().find(|n| n.matches(host, port))
    }
}

/// Holds the current topology and refreshes it from a membership source.
pub struct TopologyRegistry {
    source: Arc<dyn MembershipSource>,
    current: RwLock<Arc<TopologySnapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
    require_full_coverage: bool,
}

impl TopologyRegistry {
    /// Create a registry with an empty topology. Call
    /// [`refresh`](Self::refresh) to load the first snapshot.
    pub fn new(source: Arc<dyn MembershipSource>, require_full_coverage: bool) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(TopologySnapshot::empty())),
            refresh_lock: tokio::sync::Mutex::new(()),
            require_full_coverage,
        }
    }

    /// Create a registry and load its first snapshot.
    pub async fn connect(
        source: Arc<dyn MembershipSource>,
        require_full_coverage: bool,
    ) -> RouterResult<Self> {
        let registry = Self::new(source, require_full_coverage);
        registry.refresh().await?;
        Ok(registry)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.current.read().clone()
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.snapshot().epoch()
    }

    /// Owner of a slot.
    pub fn node_for_slot(&self, slot: u16) -> RouterResult<Node> {
        self.snapshot()
            .node_for_slot(slot)
            .cloned()
            .ok_or(RouterError::Topology { slot })
    }

    /// Owner of a key's slot.
    pub fn node_for_key(&self, key: &[u8]) -> RouterResult<Node> {
        self.node_for_slot(slot::slot(key))
    }

    /// Distinct nodes of the current topology.
    pub fn all_nodes(&self) -> BTreeSet<Node> {
        self.snapshot().nodes().iter().cloned().collect()
    }

    /// Look up a node by exact address.
    pub fn node_matching_address(&self, host: &str, port: u16) -> RouterResult<Node> {
        self.snapshot()
            .find_node(host, port)
            .cloned()
            .ok_or_else(|| RouterError::UnknownNode {
                node: Node::new(host, port),
            })
    }

    /// Re-query membership and install the result.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> RouterResult<Arc<TopologySnapshot>> {
        let _guard = self.refresh_lock.lock().await;

        let ranges = match self.source.current_topology().await {
            Ok(ranges) => ranges,
            Err(e) => {
                tracing::warn!(error = %e, "topology refresh failed");
                return Err(e);
            }
        };

        let epoch = self.epoch() + 1;
        let snapshot = TopologySnapshot::from_ranges(epoch, ranges).map_err(|e| {
            tracing::warn!(error = %e, "membership returned an invalid topology");
            e
        })?;

        if !snapshot.is_complete() {
            let uncovered = snapshot.uncovered_slots();
            if self.require_full_coverage {
                tracing::warn!(uncovered, "refusing incomplete topology");
                return Err(RouterError::invalid_topology(format!(
                    "{} slots have no owner",
                    uncovered
                )));
            }
            tracing::warn!(uncovered, "installing incomplete topology");
        }

        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot.clone();

        tracing::info!(
            epoch,
            nodes = snapshot.nodes().len(),
            ranges = snapshot.ranges().len(),
            "topology installed"
        );
        Ok(snapshot)
    }
}

impl std::fmt::Debug for TopologyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyRegistry")
            .field("epoch", &self.epoch())
            .field("require_full_coverage", &self.require_full_coverage)
            .finish_non_exhaustive()
    }
}
