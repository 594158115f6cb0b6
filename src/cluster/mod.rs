//! Cluster model: nodes, slots and topology.
//!
//! - [`node`] - node identity
//! - [`slot`] - key → slot hashing
//! - [`topology`] - snapshots and the registry
//! - [`membership`] - where slot ownership comes from

pub mod membership;
pub mod node;
pub mod slot;
pub mod topology;

pub use membership::{ClusterSlotsMembership, MembershipSource, StaticMembership};
pub use node::Node;
pub use slot::{slot, SLOT_COUNT};
pub use topology::{SlotRange, TopologyRegistry, TopologySnapshot};
