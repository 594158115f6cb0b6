//! Membership sources.
//!
//! A membership source reports which node owns which slot ranges. The
//! registry calls it on every refresh and never holds a lock while it runs.

use crate::cluster::node::Node;
use crate::cluster::topology::SlotRange;
use crate::core::error::{RouterError, RouterResult};
use crate::node::NodeConnector;
use crate::protocol::{RedisCommand, RedisValue};
use parking_lot::RwLock;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by [`MembershipSource::current_topology`].
pub type MembershipFuture<'a> =
    Pin<Box<dyn Future<Output = RouterResult<Vec<SlotRange>>> + Send + 'a>>;

/// Source of slot ownership.
pub trait MembershipSource: Send + Sync {
    /// Query the current slot ranges.
    fn current_topology(&self) -> MembershipFuture<'_>;
}

/// Fixed slot ranges, typically from configuration.
///
/// The ranges can be replaced at runtime; the change becomes visible to the
/// router on the next registry refresh.
#[derive(Debug, Default)]
pub struct StaticMembership {
    ranges: RwLock<Vec<SlotRange>>,
}

impl StaticMembership {
    /// Create a static source.
    pub fn new(ranges: Vec<SlotRange>) -> Self {
        Self {
            ranges: RwLock::new(ranges),
        }
    }

    /// Replace the reported ranges.
    pub fn replace(&self, ranges: Vec<SlotRange>) {
        *self.ranges.write() = ranges;
    }
}

impl MembershipSource for StaticMembership {
    fn current_topology(&self) -> MembershipFuture<'_> {
        let ranges = self.ranges.read().clone();
        Box::pin(async move { Ok(ranges) })
    }
}

/// Discovers slot ownership by sending `CLUSTER SLOTS` to seed nodes.
///
/// Seeds are tried in order; the first one that answers wins.
pub struct ClusterSlotsMembership {
    seeds: Vec<Node>,
    connector: Arc<dyn NodeConnector>,
}

impl ClusterSlotsMembership {
    /// Create a discovery source.
    pub fn new(seeds: Vec<Node>, connector: Arc<dyn NodeConnector>) -> Self {
        Self { seeds, connector }
    }

    async fn query_seed(&self, seed: &Node) -> RouterResult<Vec<SlotRange>> {
        let cmd = RedisCommand::named("CLUSTER").arg_slice(b"SLOTS");
        let mut conn = self
            .connector
            .connect(seed)
            .await
            .map_err(|e| RouterError::node_failure(seed.clone(), e))?;
        let reply = conn.execute(&cmd).await;
        // the connection is single-use
        let _ = conn.close().await;
        let reply = reply.map_err(|e| RouterError::node_failure(seed.clone(), e))?;
        parse_cluster_slots(&reply, seed)
    }
}

impl MembershipSource for ClusterSlotsMembership {
    fn current_topology(&self) -> MembershipFuture<'_> {
        Box::pin(async move {
            if self.seeds.is_empty() {
                return Err(RouterError::membership("no seed nodes configured"));
            }

            let mut last_error = None;
            for seed in &self.seeds {
                match self.query_seed(seed).await {
                    Ok(ranges) => {
                        tracing::debug!(seed = %seed, ranges = ranges.len(), "discovered slots");
                        return Ok(ranges);
                    }
                    Err(e) => {
                        tracing::warn!(seed = %seed, error = %e, "seed query failed");
                        last_error = Some(e);
                    }
                }
            }

            Err(RouterError::membership(format!(
                "all {} seeds failed, last error: {}",
                self.seeds.len(),
                last_error.map(|e| e.to_string()).unwrap_or_default()
            )))
        })
    }
}

/// Parse a `CLUSTER SLOTS` reply into slot ranges.
///
/// Each entry is `[start, end, [host, port, ...], replicas...]`; only the
/// master is used. An empty host means the node that answered.
pub fn parse_cluster_slots(
    reply: &RedisValue,
    answered_by: &Node,
) -> RouterResult<Vec<SlotRange>> {
    let malformed =
        |what: &str| RouterError::membership(format!("malformed CLUSTER SLOTS reply: {}", what));

    let entries = reply.as_array().ok_or_else(|| malformed("expected array"))?;
    let mut ranges = Vec::with_capacity(entries.len());

    for entry in entries {
        let fields = entry
            .as_array()
            .ok_or_else(|| malformed("entry is not an array"))?;
        if fields.len() < 3 {
            return Err(malformed("entry has fewer than 3 fields"));
        }

        let start = slot_bound(&fields[0]).ok_or_else(|| malformed("bad start slot"))?;
        let end = slot_bound(&fields[1]).ok_or_else(|| malformed("bad end slot"))?;

        let master = fields[2]
            .as_array()
            .ok_or_else(|| malformed("master is not an array"))?;
        if master.len() < 2 {
            return Err(malformed("master has no port"));
        }
        let host = match master[0].as_str() {
            Some("") | Some("?") => answered_by.host(),
            Some(host) => host,
            None => return Err(malformed("bad master host")),
        };
        let port = master[1]
            .as_int()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| malformed("bad master port"))?;

        ranges.push(SlotRange::new(start, end, Node::new(host, port)));
    }

    Ok(ranges)
}

fn slot_bound(value: &RedisValue) -> Option<u16> {
    value.as_int().and_then(|n| u16::try_from(n).ok())
}
