//! Merging per-node fan-out results.
//!
//! A fan-out produces one entry per node in a [`NodeResults`] map. The rules
//! here turn that map into a single answer:
//!
//! | Rule | Answer | On node failure |
//! |------|--------|-----------------|
//! | [`union`] | distinct items from every node | first failure (node order) |
//! | [`first_non_empty`] | first present value in node order | skipped unless nothing is found |
//!
//! A node that missed the fan-out deadline fails every rule except
//! [`per_node`] with its `Timeout`.
//! | [`sum`] | total of every node's count | first failure |
//! | [`per_node`] | every node's result | kept in the map |
//! | [`all_succeeded`] | every node's value | first failure |

use super::command::Aggregation;
use crate::cluster::node::Node;
use crate::core::error::{RouterError, RouterResult};
use crate::protocol::RedisValue;
use bytes::Bytes;
use std::collections::{btree_map, BTreeMap, BTreeSet};

/// Results of one fan-out, keyed and ordered by node.
///
/// Each node is written at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResults<T> {
    results: BTreeMap<Node, RouterResult<T>>,
}

impl<T> Default for NodeResults<T> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
        }
    }
}

impl<T> NodeResults<T> {
    /// An empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's result. Returns false, leaving the first result in
    /// place, if the node already has one.
    pub fn insert(&mut self, node: Node, result: RouterResult<T>) -> bool {
        match self.results.entry(node) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(result);
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Number of nodes with a result.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no node has a result.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether a node has a result.
    pub fn contains(&self, node: &Node) -> bool {
        self.results.contains_key(node)
    }

    /// A node's result.
    pub fn get(&self, node: &Node) -> Option<&RouterResult<T>> {
        self.results.get(node)
    }

    /// Every result in node order.
    pub fn iter(&self) -> impl Iterator<Item = (&Node, &RouterResult<T>)> {
        self.results.iter()
    }

    /// Successful results in node order.
    pub fn successes(&self) -> impl Iterator<Item = (&Node, &T)> {
        self.results
            .iter()
            .filter_map(|(node, r)| r.as_ref().ok().map(|v| (node, v)))
    }

    /// Failures in node order.
    pub fn failures(&self) -> impl Iterator<Item = (&Node, &RouterError)> {
        self.results
            .iter()
            .filter_map(|(node, r)| r.as_ref().err().map(|e| (node, e)))
    }

    /// First node, in node order, that missed the deadline.
    pub fn timeout(&self) -> Option<&RouterError> {
        self.failures()
            .map(|(_, e)| e)
            .find(|e| matches!(e, RouterError::Timeout { .. }))
    }

    /// Whether every node succeeded.
    pub fn all_ok(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Apply `f` to every successful value, keeping failures.
    pub fn map<U>(self, mut f: impl FnMut(&Node, T) -> RouterResult<U>) -> NodeResults<U> {
        NodeResults {
            results: self
                .results
                .into_iter()
                .map(|(node, r)| {
                    let mapped = r.and_then(|v| f(&node, v));
                    (node, mapped)
                })
                .collect(),
        }
    }

    /// The underlying map.
    pub fn into_map(self) -> BTreeMap<Node, RouterResult<T>> {
        self.results
    }

    /// Split into successes, or the first failure in node order.
    fn into_all_ok(self) -> RouterResult<BTreeMap<Node, T>> {
        self.results
            .into_iter()
            .map(|(node, r)| r.map(|v| (node, v)))
            .collect()
    }
}

impl<T> FromIterator<(Node, RouterResult<T>)> for NodeResults<T> {
    fn from_iter<I: IntoIterator<Item = (Node, RouterResult<T>)>>(iter: I) -> Self {
        let mut results = Self::new();
        for (node, result) in iter {
            results.insert(node, result);
        }
        results
    }
}

impl<T> IntoIterator for NodeResults<T> {
    type Item = (Node, RouterResult<T>);
    type IntoIter = btree_map::IntoIter<Node, RouterResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Distinct items across all nodes. Every node must succeed.
pub fn union<T: Ord>(results: NodeResults<Vec<T>>) -> RouterResult<BTreeSet<T>> {
    Ok(results.into_all_ok()?.into_values().flatten().collect())
}

/// First present value in node order.
///
/// Failed nodes are skipped. If no node had a value and some node failed,
/// the first failure is returned. A timed-out node fails the whole answer,
/// since it may have held the first value.
pub fn first_non_empty<T>(results: NodeResults<Option<T>>) -> RouterResult<Option<T>> {
    if let Some(timeout) = results.timeout() {
        return Err(timeout.clone());
    }
    let mut first_failure = None;
    for (_, result) in results {
        match result {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(e) => {
                first_failure.get_or_insert(e);
            }
        }
    }
    match first_failure {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Sum of every node's count. Every node must succeed.
pub fn sum(results: NodeResults<i64>) -> RouterResult<i64> {
    Ok(results.into_all_ok()?.into_values().sum())
}

/// Every node's result, failures included.
pub fn per_node<T>(results: NodeResults<T>) -> NodeResults<T> {
    results
}

/// Every node's value, or the first failure in node order.
pub fn all_succeeded<T>(results: NodeResults<T>) -> RouterResult<BTreeMap<Node, T>> {
    results.into_all_ok()
}

/// Merge raw replies with an aggregation rule.
///
/// Per-node results become a [`RedisValue::Map`] of node address to reply,
/// with failures rendered as error replies.
pub fn reduce(
    aggregation: Aggregation,
    results: NodeResults<RedisValue>,
) -> RouterResult<RedisValue> {
    if !aggregation.tolerates_timeouts() {
        if let Some(timeout) = results.timeout() {
            return Err(timeout.clone());
        }
    }
    match aggregation {
        Aggregation::Union => {
            let keys = union(results.map(|node, reply| bulk_items(node, reply)))?;
            Ok(RedisValue::array(
                keys.into_iter().map(RedisValue::BulkString).collect(),
            ))
        }
        Aggregation::FirstNonEmpty => {
            let present = results.map(|_, reply| Ok((!reply.is_null()).then_some(reply)));
            Ok(first_non_empty(present)?.unwrap_or(RedisValue::Null))
        }
        Aggregation::Sum => {
            let counts = results.map(|node, reply| {
                reply.as_int().ok_or_else(|| {
                    RouterError::unexpected_reply(format!("node {}", node), "expected an integer")
                })
            });
            Ok(RedisValue::integer(sum(counts)?))
        }
        Aggregation::PerNode => {
            let pairs = per_node(results)
                .into_iter()
                .map(|(node, result)| {
                    let reply = result.unwrap_or_else(|e| RedisValue::Error(e.to_redis_error()));
                    (RedisValue::bulk_string(node.to_string()), reply)
                })
                .collect();
            Ok(RedisValue::map(pairs))
        }
        Aggregation::AllSucceed => Ok(all_succeeded(results)?
            .into_values()
            .next()
            .unwrap_or_else(RedisValue::ok)),
    }
}

fn bulk_items(node: &Node, reply: RedisValue) -> RouterResult<Vec<Bytes>> {
    let unexpected = || {
        RouterError::unexpected_reply(format!("node {}", node), "expected an array of strings")
    };
    reply
        .into_array()
        .ok_or_else(unexpected)?
        .into_iter()
        .map(|item| item.into_bytes().ok_or_else(unexpected))
        .collect()
}
