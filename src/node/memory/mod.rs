//! In-process nodes.
//!
//! [`MemoryConnector`] hosts any number of [`MemoryNode`]s and hands out
//! connections to them. It records every command each node receives and can
//! make a node fail, drop its connections or answer slowly, which is how the
//! router's failure and timeout behaviour is exercised without sockets.
//!
//! - [`store`] - keyspace and dispatch
//! - string, key, list, set, hash, sorted set and server command modules

mod hashes;
mod keys;
mod lists;
mod server;
mod sets;
mod sorted_sets;
pub mod store;
mod strings;

pub use store::MemoryNode;

use crate::cluster::node::Node;
use crate::core::error::NodeError;
use crate::node::{NodeConnection, NodeConnector, NodeFuture};
use crate::protocol::{RedisCommand, RedisValue};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Injected misbehaviour of one node.
#[derive(Debug, Clone)]
enum Fault {
    /// Refuse connections and break existing ones.
    Down,
    /// Answer every command with this error.
    Fail(NodeError),
}

struct HostedNode {
    store: Arc<MemoryNode>,
    fault: Mutex<Option<Fault>>,
    latency: Mutex<Duration>,
    received: Mutex<Vec<RedisCommand>>,
    connects: AtomicU64,
    /// Bumped on disconnect; connections from an older generation are dead.
    generation: AtomicU64,
}

impl HostedNode {
    fn new(node: Node) -> Self {
        Self {
            store: Arc::new(MemoryNode::new(node)),
            fault: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            received: Mutex::new(Vec::new()),
            connects: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }
}

/// Connector for in-process nodes.
#[derive(Default)]
pub struct MemoryConnector {
    nodes: RwLock<BTreeMap<Node, Arc<HostedNode>>>,
}

impl MemoryConnector {
    /// Create a connector with no nodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host a node, returning its store. Adding an existing node returns
    /// the store already hosted.
    pub fn add_node(&self, node: Node) -> Arc<MemoryNode> {
        self.nodes
            .write()
            .entry(node.clone())
            .or_insert_with(|| Arc::new(HostedNode::new(node)))
            .store
            .clone()
    }

    fn hosted(&self, node: &Node) -> Option<Arc<HostedNode>> {
        self.nodes.read().get(node).cloned()
    }

    /// Store of a hosted node.
    pub fn node(&self, node: &Node) -> Option<Arc<MemoryNode>> {
        self.hosted(node).map(|h| h.store.clone())
    }

    /// Every hosted node in (host, port) order.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.read().keys().cloned().collect()
    }

    /// Commands a node has executed, oldest first.
    pub fn commands(&self, node: &Node) -> Vec<RedisCommand> {
        self.hosted(node)
            .map(|h| h.received.lock().clone())
            .unwrap_or_default()
    }

    /// Names of the commands a node has executed.
    pub fn command_names(&self, node: &Node) -> Vec<String> {
        self.commands(node).into_iter().map(|c| c.name).collect()
    }

    /// Forget the recorded commands of every node.
    pub fn clear_commands(&self) {
        for hosted in self.nodes.read().values() {
            hosted.received.lock().clear();
        }
    }

    /// Connections opened to a node.
    pub fn connect_count(&self, node: &Node) -> u64 {
        self.hosted(node)
            .map(|h| h.connects.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Make every command sent to `node` fail with `error`.
    ///
    /// Connections stay open when the error is a server reply.
    pub fn fail(&self, node: &Node, error: NodeError) {
        if let Some(hosted) = self.hosted(node) {
            *hosted.fault.lock() = Some(Fault::Fail(error));
        }
    }

    /// Take a node down: open connections break and new ones are refused.
    pub fn disconnect(&self, node: &Node) {
        if let Some(hosted) = self.hosted(node) {
            *hosted.fault.lock() = Some(Fault::Down);
            hosted.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Delay every reply from `node`.
    pub fn set_latency(&self, node: &Node, latency: Duration) {
        if let Some(hosted) = self.hosted(node) {
            *hosted.latency.lock() = latency;
        }
    }

    /// Clear faults and latency on a node.
    pub fn restore(&self, node: &Node) {
        if let Some(hosted) = self.hosted(node) {
            *hosted.fault.lock() = None;
            *hosted.latency.lock() = Duration::ZERO;
        }
    }
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("nodes", &self.nodes())
            .finish()
    }
}

impl NodeConnector for MemoryConnector {
    fn connect<'a>(&'a self, node: &'a Node) -> NodeFuture<'a, Box<dyn NodeConnection>> {
        Box::pin(async move {
            let hosted = self
                .hosted(node)
                .ok_or_else(|| NodeError::transport(format!("{}: connection refused", node)))?;
            if matches!(*hosted.fault.lock(), Some(Fault::Down)) {
                return Err(NodeError::transport(format!("{}: connection refused", node)));
            }

            hosted.connects.fetch_add(1, Ordering::Relaxed);
            let client_id = hosted.store.register_client();
            let generation = hosted.generation.load(Ordering::Acquire);
            Ok(Box::new(MemoryConnection {
                hosted,
                client_id,
                generation,
                healthy: true,
            }) as Box<dyn NodeConnection>)
        })
    }
}

/// Connection to an in-process node.
pub struct MemoryConnection {
    hosted: Arc<HostedNode>,
    client_id: u64,
    generation: u64,
    healthy: bool,
}

impl MemoryConnection {
    fn check_alive(&mut self) -> Result<(), NodeError> {
        let current = self.hosted.generation.load(Ordering::Acquire);
        if !self.healthy || current != self.generation {
            self.healthy = false;
            return Err(NodeError::Closed);
        }
        Ok(())
    }
}

impl NodeConnection for MemoryConnection {
    fn execute<'a>(&'a mut self, cmd: &'a RedisCommand) -> NodeFuture<'a, RedisValue> {
        Box::pin(async move {
            self.check_alive()?;

            let latency = *self.hosted.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
                self.check_alive()?;
            }

            let fault = self.hosted.fault.lock().clone();
            if let Some(Fault::Fail(error)) = fault {
                if !error.connection_reusable() {
                    self.healthy = false;
                }
                return Err(error);
            }

            self.hosted.received.lock().push(cmd.clone());
            self.hosted.store.execute(cmd).map_err(NodeError::Server)
        })
    }

    fn is_healthy(&self) -> bool {
        self.healthy && self.hosted.generation.load(Ordering::Acquire) == self.generation
    }

    fn close(&mut self) -> NodeFuture<'_, ()> {
        Box::pin(async move {
            self.healthy = false;
            Ok(())
        })
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.hosted.store.unregister_client(self.client_id);
    }
}
