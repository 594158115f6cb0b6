//! Fan-out deadline and concurrency tests.
//!
//! Node latency is simulated by the in-memory connector; the clock is
//! paused so deadlines are exact.

mod common;

use common::{cmd, node_a, node_b, node_c, TestCluster};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use trellis::node::PoolConfig;
use trellis::{RouterConfig, RouterError};

fn deadline(ms: u64) -> RouterConfig {
    RouterConfig {
        fanout_timeout: Some(Duration::from_millis(ms)),
    }
}

// ============================================================================
// Deadlines
// ============================================================================

#[tokio::test(start_paused = true)]
async fn per_node_result_keeps_partial_answers() {
    let cluster = TestCluster::with_config(deadline(100), PoolConfig::default()).await;
    cluster.connector.set_latency(&node_b(), Duration::from_secs(5));

    let started = Instant::now();
    let info = cluster.conn.info().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(info.len(), 3);
    assert!(info.get(&node_a()).unwrap().is_ok());
    assert!(info.get(&node_c()).unwrap().is_ok());
    assert!(matches!(
        info.get(&node_b()).unwrap(),
        Err(RouterError::Timeout { node, .. }) if *node == node_b()
    ));
}

#[tokio::test(start_paused = true)]
async fn sum_fails_on_timeout() {
    let cluster = TestCluster::with_config(deadline(100), PoolConfig::default()).await;
    cluster.connector.set_latency(&node_c(), Duration::from_secs(5));

    let started = Instant::now();
    let err = cluster.conn.dbsize().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, RouterError::Timeout { ref node, .. } if *node == node_c()));
    assert!(err.is_retriable());
}

#[tokio::test(start_paused = true)]
async fn randomkey_fails_on_timeout() {
    let cluster = TestCluster::with_config(deadline(100), PoolConfig::default()).await;
    cluster.conn.set("key4", "v").await.unwrap();
    cluster.connector.set_latency(&node_a(), Duration::from_secs(5));

    // C holds a key, but A was abandoned before it could answer
    let err = cluster.conn.randomkey().await.unwrap_err();
    assert!(matches!(err, RouterError::Timeout { ref node, .. } if *node == node_a()));

    let raw = cluster.conn.command(cmd(&["KEYS", "*"])).await.unwrap_err();
    assert!(matches!(raw, RouterError::Timeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn slow_nodes_are_awaited_without_deadline() {
    let cluster = TestCluster::start().await;
    cluster.conn.set("key4", "v").await.unwrap();
    cluster.connector.set_latency(&node_c(), Duration::from_secs(2));

    assert_eq!(cluster.conn.dbsize().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn node_scoped_request_honours_deadline() {
    let cluster = TestCluster::with_config(deadline(100), PoolConfig::default()).await;
    cluster.connector.set_latency(&node_a(), Duration::from_secs(5));

    let err = cluster.conn.dbsize_on(&node_a()).await.unwrap_err();
    assert!(matches!(err, RouterError::Timeout { ref node, .. } if *node == node_a()));
}

#[tokio::test(start_paused = true)]
async fn node_recovers_after_timeout() {
    let cluster = TestCluster::with_config(deadline(100), PoolConfig::default()).await;
    cluster.conn.set("key1", "v").await.unwrap();

    cluster.connector.set_latency(&node_b(), Duration::from_secs(5));
    assert!(cluster.conn.dbsize().await.is_err());

    // the aborted request released its permit and dropped its connection
    cluster.connector.restore(&node_b());
    assert_eq!(cluster.conn.dbsize().await.unwrap(), 1);
    assert_eq!(cluster.connector.connect_count(&node_b()), 2);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn concurrent_fan_outs() {
    let cluster = Arc::new(TestCluster::start().await);
    for key in ["key1", "key2", "key4"] {
        cluster.conn.set(key, "v").await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cluster = cluster.clone();
        handles.push(tokio::spawn(async move { cluster.conn.dbsize().await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 3);
    }
}

#[tokio::test(start_paused = true)]
async fn requests_to_one_node_are_serialized() {
    let cluster = Arc::new(TestCluster::start().await);
    cluster.conn.set("key1", "v").await.unwrap();
    cluster
        .connector
        .set_latency(&node_b(), Duration::from_millis(50));

    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let cluster = cluster.clone();
        handles.push(tokio::spawn(async move { cluster.conn.get("key1").await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(cluster.connector.connect_count(&node_b()), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_node_does_not_block_others() {
    let cluster = Arc::new(TestCluster::start().await);
    cluster
        .connector
        .set_latency(&node_b(), Duration::from_secs(10));

    let slow = {
        let cluster = cluster.clone();
        tokio::spawn(async move { cluster.conn.get("key1").await })
    };
    tokio::task::yield_now().await;

    let started = Instant::now();
    cluster.conn.set("key2", "v").await.unwrap();
    cluster.conn.set("key4", "v").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    slow.abort();
}

#[tokio::test]
async fn raw_fan_out_to_subset() {
    let cluster = TestCluster::start().await;
    let nodes = [node_a(), node_c()].into_iter().collect();
    let results = cluster.router.fan_out_to(nodes, &cmd(&["PING"])).await;

    assert_eq!(results.len(), 2);
    assert!(results.all_ok());
    assert!(cluster.connector.command_names(&node_b()).is_empty());
}
