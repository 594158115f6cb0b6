//! Command routing.
//!
//! - [`command`] - per-command routing tags
//! - [`dispatch`] - the router: single-key, multi-key and fan-out paths
//! - [`aggregate`] - merging fan-out results
//! - [`connection`] - typed API over the router

pub mod aggregate;
pub mod command;
pub mod connection;
pub mod dispatch;

pub use aggregate::NodeResults;
pub use command::{classify, command_table, Aggregation, CommandTable, KeySpec, Route};
pub use connection::{ClusterConnection, FromReply};
pub use dispatch::{ClusterRouter, RouterConfig};
