//! Trellis - cluster-aware command router for sharded key-value stores.
//!
//! Trellis sits between an application and a cluster of Redis-compatible
//! nodes that each own part of a 16384-slot keyspace. It hashes keys to
//! slots, looks up the owner in an immutable topology snapshot, and forwards
//! commands over pooled per-node connections. Commands without a key are
//! fanned out to every node and the replies are merged.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 ClusterConnection (typed API)                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ClusterRouter                           │
//! │   command table │ single-key │ multi-key │ fan-out + aggregate  │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                                  │
//! ┌──────────────────────────────┐  ┌────────────────────────────────┐
//! │      TopologyRegistry        │  │      NodeConnectionPool        │
//! │ slot hasher │ snapshot swap  │  │  per-node permits │ idle reuse │
//! └──────────────────────────────┘  └────────────────────────────────┘
//!                 │                                  │
//! ┌──────────────────────────────┐  ┌────────────────────────────────┐
//! │      MembershipSource        │  │  NodeConnector (TCP, memory)   │
//! └──────────────────────────────┘  └────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Runtime wiring and background refresh
//! - [`core::error`] - Error types and RESP error mapping
//!
//! ## Cluster
//! - [`cluster::slot`] - CRC16 slot hashing and hash tags
//! - [`cluster::topology`] - Topology snapshots and the registry
//! - [`cluster::membership`] - Static and `CLUSTER SLOTS` membership
//!
//! ## Protocol
//! - [`protocol`] - Reply values, commands and the RESP2 codec
//!
//! ## Nodes
//! - [`node::pool`] - Per-node connection pool
//! - [`node::tcp`] - RESP2 client over TCP
//! - [`node::memory`] - In-process nodes
//!
//! ## Router
//! - [`router::command`] - Command routing tags
//! - [`router::dispatch`] - Dispatch and fan-out
//! - [`router::aggregate`] - Result aggregation
//! - [`router::connection`] - Typed cluster API
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - Equal hash tags map to equal slots
//! - A complete snapshot has exactly one owner per slot; readers never see a
//!   partially updated snapshot
//! - Cross-slot multi-key requests are rejected before any node is contacted
//! - The router never retries on its own

// Core infrastructure
pub mod core;

// Cluster model
pub mod cluster;

// Wire protocol
pub mod protocol;

// Node clients
pub mod node;

// Routing
pub mod router;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use cluster::{membership, slot, topology, Node};
pub use error::{NodeError, RouterError, RouterResult};
pub use router::{ClusterConnection, ClusterRouter, RouterConfig};
