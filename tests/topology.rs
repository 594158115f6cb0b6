//! Topology registry and membership tests.

mod common;

use common::{node_a, node_b, node_c, three_node_ranges, TestCluster};
use std::sync::Arc;
use trellis::cluster::membership::{ClusterSlotsMembership, MembershipSource, StaticMembership};
use trellis::cluster::topology::{SlotRange, TopologyRegistry};
use trellis::node::MemoryConnector;
use trellis::{slot, Node, NodeError, RouterError};

// ============================================================================
// Slot hashing
// ============================================================================

#[test]
fn hash_tags_share_a_slot() {
    assert_eq!(slot::slot(b"{user1000}.following"), slot::slot(b"{user1000}.followers"));
    assert_eq!(slot::slot(b"{user1000}.following"), slot::slot(b"user1000"));
    assert_eq!(slot::slot(b"key1"), 9189);
    assert_eq!(slot::slot(b"foo"), 12182);
    // empty tag hashes the whole key
    assert_eq!(slot::slot(b"{}.x"), slot::crc16(b"{}.x") % slot::SLOT_COUNT);
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn every_slot_has_one_owner() {
    let membership = Arc::new(StaticMembership::new(three_node_ranges()));
    let registry = TopologyRegistry::connect(membership, true).await.unwrap();
    let snapshot = registry.snapshot();
    assert!(snapshot.is_complete());
    assert_eq!(snapshot.nodes(), [node_a(), node_b(), node_c()]);
    assert_eq!(registry.node_for_slot(0).unwrap(), node_a());
    assert_eq!(registry.node_for_slot(5461).unwrap(), node_b());
    assert_eq!(registry.node_for_slot(16383).unwrap(), node_c());
}

#[tokio::test]
async fn overlapping_ranges_rejected() {
    let membership = Arc::new(StaticMembership::new(vec![
        SlotRange::new(0, 9000, node_a()),
        SlotRange::new(8000, 16383, node_b()),
    ]));
    let err = TopologyRegistry::connect(membership, true).await.unwrap_err();
    assert!(matches!(err, RouterError::InvalidTopology { .. }));
}

#[tokio::test]
async fn incomplete_topology_refused_when_coverage_required() {
    let ranges = vec![SlotRange::new(0, 100, node_a())];

    let err = TopologyRegistry::connect(Arc::new(StaticMembership::new(ranges.clone())), true)
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidTopology { .. }));

    let registry = TopologyRegistry::connect(Arc::new(StaticMembership::new(ranges)), false)
        .await
        .unwrap();
    assert!(!registry.snapshot().is_complete());
    assert_eq!(registry.node_for_slot(101), Err(RouterError::Topology { slot: 101 }));
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let membership = Arc::new(StaticMembership::new(three_node_ranges()));
    let registry = TopologyRegistry::connect(membership.clone(), true).await.unwrap();
    let epoch = registry.epoch();

    membership.replace(vec![SlotRange::new(0, 10, node_a())]);
    assert!(registry.refresh().await.is_err());
    assert_eq!(registry.epoch(), epoch);
    assert_eq!(registry.node_for_key(b"key1").unwrap(), node_b());
}

#[tokio::test]
async fn refresh_reroutes_keys() {
    let cluster = TestCluster::start().await;
    cluster.conn.set("key1", "before").await.unwrap();

    // hand B's slots to C
    cluster.membership.replace(vec![
        SlotRange::new(0, 5460, node_a()),
        SlotRange::new(5461, 16383, node_c()),
    ]);
    // routing follows the installed snapshot, not the source
    assert_eq!(cluster.conn.node_for_key("key1").unwrap(), node_b());

    cluster.registry.refresh().await.unwrap();
    assert_eq!(cluster.conn.node_for_key("key1").unwrap(), node_c());
    cluster.conn.set("key1", "after").await.unwrap();
    assert!(cluster.store(&node_c()).contains_key(b"key1"));

    // B left the topology, so fan-outs skip it
    assert_eq!(cluster.registry.all_nodes().len(), 2);
    let err = cluster.conn.dbsize_on(&node_b()).await.unwrap_err();
    assert!(matches!(err, RouterError::UnknownNode { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refresh_under_concurrent_readers() {
    let membership = Arc::new(StaticMembership::new(three_node_ranges()));
    let registry = Arc::new(TopologyRegistry::connect(membership.clone(), true).await.unwrap());
    let alternate = vec![
        SlotRange::new(0, 8191, node_a()),
        SlotRange::new(8192, 16383, node_c()),
    ];

    let mut readers = Vec::new();
    for _ in 0..4 {
        let registry = registry.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..2_000 {
                let snapshot = registry.snapshot();
                // every snapshot a reader sees is whole
                assert!(snapshot.is_complete());
                let owner = snapshot.node_for_slot(9189).cloned().unwrap();
                assert!(owner == node_b() || owner == node_c());
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut refreshers = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        let membership = membership.clone();
        let ranges = if i % 2 == 0 {
            alternate.clone()
        } else {
            three_node_ranges()
        };
        refreshers.push(tokio::spawn(async move {
            membership.replace(ranges);
            registry.refresh().await.unwrap();
        }));
    }

    for handle in refreshers.into_iter().chain(readers) {
        handle.await.unwrap();
    }
    // refreshes are serialized, each one bumps the epoch
    assert_eq!(registry.epoch(), 9);
}

// ============================================================================
// CLUSTER SLOTS discovery
// ============================================================================

#[tokio::test]
async fn discovery_from_seed_nodes() {
    let connector = Arc::new(MemoryConnector::new());
    for node in [node_a(), node_b(), node_c()] {
        connector.add_node(node).set_cluster_slots(three_node_ranges());
    }

    let source = ClusterSlotsMembership::new(
        vec![Node::new("10.0.0.1", 7000), node_b()],
        connector.clone(),
    );
    let mut ranges = source.current_topology().await.unwrap();
    ranges.sort_by_key(|r| r.start);
    assert_eq!(ranges, three_node_ranges());

    // the unreachable seed was skipped; B answered
    assert_eq!(connector.command_names(&node_b()), ["CLUSTER"]);
    assert!(connector.command_names(&node_a()).is_empty());
}

#[tokio::test]
async fn discovery_fails_when_every_seed_fails() {
    let connector = Arc::new(MemoryConnector::new());
    connector.add_node(node_a());
    connector.fail(&node_a(), NodeError::transport("reset"));

    let source = ClusterSlotsMembership::new(vec![node_a()], connector);
    let err = source.current_topology().await.unwrap_err();
    assert!(matches!(err, RouterError::Membership { .. }));

    let empty = ClusterSlotsMembership::new(Vec::new(), Arc::new(MemoryConnector::new()));
    assert!(empty.current_topology().await.is_err());
}
