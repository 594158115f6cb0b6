//! Single-node clients and the per-node connection pool.
//!
//! The router talks to nodes only through [`NodeConnector`] and
//! [`NodeConnection`], so the transport can be swapped:
//!
//! - [`tcp`] - RESP2 over TCP
//! - [`memory`] - in-process nodes for tests and demos
//! - [`pool`] - connection reuse keyed by node

pub mod memory;
pub mod pool;
pub mod tcp;

use crate::cluster::node::Node;
use crate::core::error::NodeError;
use crate::protocol::{RedisCommand, RedisValue};
use std::future::Future;
use std::pin::Pin;

pub use memory::{MemoryConnector, MemoryNode};
pub use pool::{NodeConnectionPool, PoolConfig, PooledConnection};
pub use tcp::TcpConnector;

/// Future returned by node operations.
pub type NodeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NodeError>> + Send + 'a>>;

/// An established connection to one node.
///
/// Error replies from the node are returned as [`NodeError::Server`], never
/// as `Ok(RedisValue::Error)`.
pub trait NodeConnection: Send {
    /// Send a command and wait for its reply.
    fn execute<'a>(&'a mut self, cmd: &'a RedisCommand) -> NodeFuture<'a, RedisValue>;

    /// Whether the connection can be reused.
    fn is_healthy(&self) -> bool;

    /// Close the connection.
    fn close(&mut self) -> NodeFuture<'_, ()>;
}

/// Establishes connections to nodes.
pub trait NodeConnector: Send + Sync {
    /// Open a new connection to a node.
    fn connect<'a>(&'a self, node: &'a Node) -> NodeFuture<'a, Box<dyn NodeConnection>>;
}
