//! Error types and RESP error mapping.
//!
//! Routing failures are distinct from node failures: a [`RouterError`] says
//! why the router could not (or would not) dispatch, while a [`NodeError`]
//! describes what went wrong on one node and is always wrapped together with
//! that node's identity.

use crate::cluster::node::Node;
use crate::protocol::RedisError;
use thiserror::Error;

/// Failure of a single node request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Connect, read or write failed.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The node answered with an error reply.
    #[error("{0}")]
    Server(RedisError),

    /// The node sent bytes that are not a valid reply.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The connection was closed.
    #[error("connection closed")]
    Closed,
}

impl NodeError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether the connection that produced this error can be reused.
    ///
    /// A server-side error reply leaves the stream in sync; anything else
    /// does not.
    pub fn connection_reusable(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}

/// Router error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// No node owns the slot in the current topology. Refresh and retry.
    #[error("no node owns slot {slot} in the current topology")]
    Topology { slot: u16 },

    /// A node-scoped request named an address outside the cluster.
    #[error("node {node} is not part of the cluster")]
    UnknownNode { node: Node },

    /// A multi-key request spans more than one slot.
    #[error("keys in request don't hash to the same slot: {}", .keys.join(", "))]
    CrossSlot { keys: Vec<String> },

    /// The operation has no meaning on a sharded keyspace.
    #[error("{command} is not supported in cluster mode: {reason}")]
    UnsupportedOperation {
        command: String,
        reason: &'static str,
    },

    /// A request to one node failed.
    #[error("node {node} failed: {source}")]
    NodeFailure {
        node: Node,
        #[source]
        source: NodeError,
    },

    /// A node did not answer before the fan-out deadline.
    #[error("node {node} did not respond within {elapsed_ms}ms")]
    Timeout { node: Node, elapsed_ms: u64 },

    /// The request is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The membership source could not produce a topology.
    #[error("membership query failed: {message}")]
    Membership { message: String },

    /// The membership source produced an inconsistent topology.
    #[error("invalid topology: {message}")]
    InvalidTopology { message: String },

    /// A reply did not have the shape the command returns.
    #[error("unexpected reply to {command}: {message}")]
    UnexpectedReply { command: String, message: String },

    /// The connection pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,
}

impl RouterError {
    /// Create a NodeFailure error.
    pub fn node_failure(node: Node, source: NodeError) -> Self {
        Self::NodeFailure { node, source }
    }

    /// Create a CrossSlot error from raw keys.
    pub fn cross_slot<'a>(keys: impl IntoIterator<Item = &'a [u8]>) -> Self {
        Self::CrossSlot {
            keys: keys
                .into_iter()
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .collect(),
        }
    }

    /// Create an UnsupportedOperation error.
    pub fn unsupported(command: impl Into<String>, reason: &'static str) -> Self {
        Self::UnsupportedOperation {
            command: command.into(),
            reason,
        }
    }

    /// Create an InvalidRequest error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a Membership error.
    pub fn membership(message: impl Into<String>) -> Self {
        Self::Membership {
            message: message.into(),
        }
    }

    /// Create an InvalidTopology error.
    pub fn invalid_topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// Create an UnexpectedReply error.
    pub fn unexpected_reply(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedReply {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Check if the caller may retry, possibly after a topology refresh.
    ///
    /// The router itself never retries.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Topology { .. } | Self::Timeout { .. })
    }

    /// The node this error is attributed to, if any.
    pub fn node(&self) -> Option<&Node> {
        match self {
            Self::UnknownNode { node }
            | Self::NodeFailure { node, .. }
            | Self::Timeout { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Map to a RESP error reply.
    pub fn to_redis_error(&self) -> RedisError {
        match self {
            Self::NodeFailure {
                source: NodeError::Server(err),
                ..
            } => err.clone(),
            Self::CrossSlot { .. } => RedisError::crossslot(),
            Self::Topology { slot } => {
                RedisError::clusterdown(format!("Hash slot {} not served", slot))
            }
            Self::PoolClosed => RedisError::clusterdown("connection pool is closed"),
            _ => RedisError::generic(self.to_string()),
        }
    }
}

/// Result type using RouterError.
pub type RouterResult<T> = Result<T, RouterError>;
