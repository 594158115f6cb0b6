//! Routing tests: single-key, multi-key, fan-out and unsupported paths.

mod common;

use bytes::Bytes;
use common::{cmd, key_on, node_a, node_b, node_c, TestCluster};
use trellis::protocol::RedisValue;
use trellis::{Node, NodeError, RouterError};

// ============================================================================
// Single-key routing
// ============================================================================

#[tokio::test]
async fn set_get_reaches_only_the_owner() {
    let cluster = TestCluster::start().await;
    assert_eq!(cluster.conn.slot_for_key("key1"), 9189);
    assert_eq!(cluster.conn.node_for_key("key1").unwrap(), node_b());

    cluster.conn.set("key1", "value1").await.unwrap();
    let value = cluster.conn.get("key1").await.unwrap();
    assert_eq!(value.as_deref(), Some(b"value1".as_slice()));

    assert!(cluster.connector.command_names(&node_a()).is_empty());
    assert_eq!(cluster.connector.command_names(&node_b()), ["SET", "GET"]);
    assert!(cluster.connector.command_names(&node_c()).is_empty());
    assert!(cluster.store(&node_b()).contains_key(b"key1"));
}

#[tokio::test]
async fn round_trip_on_every_node() {
    let cluster = TestCluster::start().await;
    for node in [node_a(), node_b(), node_c()] {
        let key = key_on(&node);
        assert_eq!(cluster.conn.node_for_key(key).unwrap(), node);
        cluster.conn.set(key, node.to_string()).await.unwrap();
        assert_eq!(
            cluster.store(&node).get_string(key.as_bytes()),
            Some(Bytes::from(node.to_string()))
        );
        assert_eq!(
            cluster.conn.get(key).await.unwrap(),
            Some(Bytes::from(node.to_string()))
        );
    }
}

#[tokio::test]
async fn command_forwarded_unchanged() {
    let cluster = TestCluster::start().await;
    let set = cmd(&["SET", "key4", "v", "PX", "60000"]);
    cluster.router.execute(&set).await.unwrap();
    assert_eq!(cluster.connector.commands(&node_c()), [set]);
}

#[tokio::test]
async fn server_errors_keep_their_kind() {
    let cluster = TestCluster::start().await;
    cluster.conn.rpush("key1", &["a"]).await.unwrap();

    let err = cluster.conn.get("key1").await.unwrap_err();
    assert_eq!(err.node(), Some(&node_b()));
    assert_eq!(err.to_redis_error().kind, "WRONGTYPE");
}

#[tokio::test]
async fn missing_owner_is_topology_error() {
    let cluster = TestCluster::with_ranges(
        vec![trellis::topology::SlotRange::new(0, 8191, node_a())],
        Default::default(),
        Default::default(),
    )
    .await;

    // slot 9189 has no owner
    let err = cluster.conn.get("key1").await.unwrap_err();
    assert_eq!(err, RouterError::Topology { slot: 9189 });
    assert!(err.is_retriable());
    assert!(cluster.untouched());
}

// ============================================================================
// Multi-key routing
// ============================================================================

#[tokio::test]
async fn cross_slot_request_applies_nothing() {
    let cluster = TestCluster::start().await;

    let err = cluster
        .conn
        .mset(&[("key1", "a"), ("key2", "b")])
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::CrossSlot { ref keys } if keys == &["key1", "key2"]));
    assert!(cluster.untouched());
    assert_eq!(cluster.store(&node_a()).dbsize(), 0);
    assert_eq!(cluster.store(&node_b()).dbsize(), 0);

    let err = cluster.conn.rename("key1", "key2").await.unwrap_err();
    assert!(matches!(err, RouterError::CrossSlot { .. }));
    let err = cluster.conn.del(&["key1", "key2", "key4"]).await.unwrap_err();
    assert!(matches!(err, RouterError::CrossSlot { .. }));
    assert!(cluster.untouched());
}

#[tokio::test]
async fn hash_tags_keep_multi_key_requests_on_one_node() {
    let cluster = TestCluster::start().await;
    let owner = cluster.conn.node_for_key("{user1000}").unwrap();

    cluster
        .conn
        .mset(&[("{user1000}.name", "ada"), ("{user1000}.lang", "rust")])
        .await
        .unwrap();
    let values = cluster
        .conn
        .mget(&["{user1000}.name", "{user1000}.lang", "{user1000}.none"])
        .await
        .unwrap();
    assert_eq!(
        values,
        [Some(Bytes::from("ada")), Some(Bytes::from("rust")), None]
    );

    for (node, names) in cluster.received() {
        if node == owner {
            assert_eq!(names, ["MSET", "MGET"]);
        } else {
            assert!(names.is_empty());
        }
    }
}

#[tokio::test]
async fn blocking_pop_keys_exclude_timeout() {
    let cluster = TestCluster::start().await;
    cluster.conn.rpush("{q}jobs", &["j1"]).await.unwrap();

    let popped = cluster.conn.blpop(&["{q}urgent", "{q}jobs"], 0).await.unwrap();
    assert_eq!(popped, Some((Bytes::from("{q}jobs"), Bytes::from("j1"))));
    assert_eq!(cluster.conn.brpop(&["{q}jobs"], 1).await.unwrap(), None);
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn dbsize_sums_every_node() {
    let cluster = TestCluster::start().await;
    cluster.store(&node_a()).set_string("key2", "1");
    cluster.store(&node_a()).set_string("key3", "1");
    cluster.store(&node_c()).set_string("key4", "1");

    assert_eq!(cluster.conn.dbsize().await.unwrap(), 3);
    for (_, names) in cluster.received() {
        assert_eq!(names, ["DBSIZE"]);
    }
}

#[tokio::test]
async fn dbsize_fails_when_a_node_fails() {
    let cluster = TestCluster::start().await;
    cluster.store(&node_a()).set_string("key2", "1");
    cluster
        .connector
        .fail(&node_b(), NodeError::transport("connection reset"));

    let err = cluster.conn.dbsize().await.unwrap_err();
    assert_eq!(err.node(), Some(&node_b()));
    assert!(matches!(err, RouterError::NodeFailure { .. }));
    // the other nodes were still asked
    assert_eq!(cluster.connector.command_names(&node_c()), ["DBSIZE"]);
}

#[tokio::test]
async fn keys_is_a_sorted_union() {
    let cluster = TestCluster::start().await;
    for key in ["key4", "key1", "key2", "other"] {
        cluster.conn.set(key, "v").await.unwrap();
    }

    let keys = cluster.conn.keys("key*").await.unwrap();
    assert_eq!(keys, ["key1", "key2", "key4"]);
}

#[tokio::test]
async fn randomkey_on_empty_cluster_is_null() {
    let cluster = TestCluster::start().await;
    assert_eq!(cluster.conn.randomkey().await.unwrap(), None);

    cluster.conn.set("key4", "v").await.unwrap();
    assert_eq!(
        cluster.conn.randomkey().await.unwrap(),
        Some(Bytes::from("key4"))
    );
}

#[tokio::test]
async fn randomkey_skips_failed_nodes() {
    let cluster = TestCluster::start().await;
    cluster.conn.set("key4", "v").await.unwrap();
    cluster.connector.disconnect(&node_a());

    assert_eq!(
        cluster.conn.randomkey().await.unwrap(),
        Some(Bytes::from("key4"))
    );

    cluster.conn.del(&["key4"]).await.unwrap();
    let err = cluster.conn.randomkey().await.unwrap_err();
    assert_eq!(err.node(), Some(&node_a()));
}

#[tokio::test]
async fn flushdb_clears_every_node() {
    let cluster = TestCluster::start().await;
    for node in [node_a(), node_b(), node_c()] {
        cluster.conn.set(key_on(&node), "v").await.unwrap();
    }

    cluster.conn.flushdb().await.unwrap();
    assert_eq!(cluster.conn.dbsize().await.unwrap(), 0);
}

#[tokio::test]
async fn flushall_fails_if_any_node_fails() {
    let cluster = TestCluster::start().await;
    cluster.connector.disconnect(&node_c());
    let err = cluster.conn.flushall().await.unwrap_err();
    assert_eq!(err.node(), Some(&node_c()));
}

#[tokio::test]
async fn flush_failure_still_reaches_remaining_nodes() {
    let cluster = TestCluster::start().await;
    for node in [node_a(), node_b(), node_c()] {
        cluster.conn.set(key_on(&node), "v").await.unwrap();
    }
    cluster.connector.disconnect(&node_a());

    let err = cluster.conn.flushall().await.unwrap_err();
    assert_eq!(err.node(), Some(&node_a()));
    assert_eq!(cluster.store(&node_a()).dbsize(), 1);
    assert_eq!(cluster.store(&node_b()).dbsize(), 0);
    assert_eq!(cluster.store(&node_c()).dbsize(), 0);
}

#[tokio::test]
async fn ping_on_empty_cluster() {
    let cluster =
        TestCluster::with_ranges(Vec::new(), Default::default(), Default::default()).await;
    assert_eq!(cluster.conn.ping().await.unwrap(), "PONG");
    assert_eq!(
        cluster.conn.command(cmd(&["ping"])).await.unwrap(),
        RedisValue::pong()
    );
    assert_eq!(cluster.conn.dbsize().await.unwrap(), 0);
}

#[tokio::test]
async fn ping_and_admin_commands() {
    let cluster = TestCluster::start().await;
    assert_eq!(cluster.conn.ping().await.unwrap(), "PONG");
    cluster.conn.save().await.unwrap();
    cluster.conn.bgsave().await.unwrap();
    cluster.conn.bgrewriteaof().await.unwrap();
    cluster.conn.config_resetstat().await.unwrap();
}

#[tokio::test]
async fn info_comes_from_every_node() {
    let cluster = TestCluster::start().await;
    let info = cluster.conn.info().await;
    assert_eq!(info.len(), 3);
    for (node, result) in info.iter() {
        let text = result.as_ref().unwrap();
        assert!(text.contains(&format!("tcp_port:{}", node.port())));
    }

    let section = cluster.conn.info_section("keyspace").await;
    assert!(section.all_ok());
}

#[tokio::test]
async fn per_node_results_keep_failures() {
    let cluster = TestCluster::start().await;
    cluster.connector.disconnect(&node_b());

    let info = cluster.conn.info().await;
    assert_eq!(info.len(), 3);
    assert!(info.get(&node_a()).unwrap().is_ok());
    assert!(info.get(&node_b()).unwrap().is_err());
    assert_eq!(info.failures().count(), 1);

    let raw = cluster.router.execute(&cmd(&["INFO"])).await.unwrap();
    let RedisValue::Map(pairs) = raw else {
        panic!("expected a per-node map");
    };
    assert_eq!(pairs.len(), 3);
    assert!(pairs[1].1.is_error());
}

#[tokio::test]
async fn client_list_is_not_empty() {
    let cluster = TestCluster::start().await;
    for (_, result) in cluster.conn.client_list().await {
        assert!(!result.unwrap().trim().is_empty());
    }
}

#[tokio::test]
async fn time_and_lastsave_per_node() {
    let cluster = TestCluster::start().await;
    for (_, result) in cluster.conn.time().await {
        assert_eq!(result.unwrap().len(), 2);
    }
    for (_, result) in cluster.conn.lastsave().await {
        assert!(result.unwrap() > 0);
    }
}

#[tokio::test]
async fn config_get_and_set() {
    let cluster = TestCluster::start().await;
    cluster.conn.config_set("maxmemory", "1024").await.unwrap();
    for (_, result) in cluster.conn.config_get("maxmemory").await {
        let pairs = result.unwrap();
        assert_eq!(pairs, [(Bytes::from("maxmemory"), Bytes::from("1024"))]);
    }
}

// ============================================================================
// Node-scoped requests
// ============================================================================

#[tokio::test]
async fn node_scoped_requests_reach_one_node() {
    let cluster = TestCluster::start().await;
    cluster.conn.set("key2", "v").await.unwrap();
    cluster.conn.set("key4", "v").await.unwrap();

    assert_eq!(cluster.conn.dbsize_on(&node_a()).await.unwrap(), 1);
    assert_eq!(
        cluster.conn.keys_on(&node_c(), "*").await.unwrap(),
        [Bytes::from("key4")]
    );
    assert_eq!(
        cluster.conn.randomkey_on(&node_b()).await.unwrap(),
        None
    );
    assert_eq!(cluster.conn.ping_on(&node_b()).await.unwrap(), "PONG");
    assert!(cluster.conn.info_on(&node_b()).await.unwrap().contains("tcp_port:7001"));
    assert!(!cluster.conn.client_list_on(&node_c()).await.unwrap().is_empty());

    cluster.conn.flushdb_on(&node_a()).await.unwrap();
    assert_eq!(cluster.store(&node_a()).dbsize(), 0);
    assert_eq!(cluster.store(&node_c()).dbsize(), 1);
}

#[tokio::test]
async fn node_scoped_flushdb_on_unknown_address() {
    let cluster = TestCluster::start().await;
    for node in [node_a(), node_b(), node_c()] {
        cluster.conn.set(key_on(&node), "v").await.unwrap();
    }
    cluster.connector.clear_commands();

    let stranger = Node::new("10.0.0.9", 7000);
    let err = cluster.conn.flushdb_on(&stranger).await.unwrap_err();
    assert_eq!(err, RouterError::UnknownNode { node: stranger });
    assert!(cluster.untouched());
    assert_eq!(cluster.conn.dbsize().await.unwrap(), 3);
}

#[tokio::test]
async fn keyed_commands_cannot_target_a_node() {
    let cluster = TestCluster::start().await;
    let err = cluster
        .router
        .execute_on_node(&node_a(), &cmd(&["GET", "key2"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidRequest { .. }));
    assert!(cluster.untouched());
}

// ============================================================================
// Unsupported and invalid requests
// ============================================================================

#[tokio::test]
async fn select_is_unsupported_and_changes_nothing() {
    let cluster = TestCluster::start().await;
    cluster.conn.set("key1", "v").await.unwrap();
    cluster.connector.clear_commands();
    let epoch = cluster.registry.epoch();

    for command in [
        cmd(&["SELECT", "1"]),
        cmd(&["SWAPDB", "0", "1"]),
        cmd(&["MOVE", "key1", "1"]),
        cmd(&["MULTI"]),
        cmd(&["WATCH", "key1"]),
        cmd(&["CLIENT", "SETNAME", "me"]),
    ] {
        let err = cluster.router.execute(&command).await.unwrap_err();
        assert!(
            matches!(err, RouterError::UnsupportedOperation { .. }),
            "{} should be unsupported, got {:?}",
            command,
            err
        );
    }

    assert!(cluster.untouched());
    assert_eq!(cluster.registry.epoch(), epoch);
    assert!(cluster.store(&node_b()).contains_key(b"key1"));
}

#[tokio::test]
async fn unknown_command_is_invalid() {
    let cluster = TestCluster::start().await;
    let err = cluster
        .router
        .execute(&cmd(&["FROBNICATE", "x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidRequest { .. }));

    let err = cluster.router.execute(&cmd(&["GET"])).await.unwrap_err();
    assert!(matches!(err, RouterError::InvalidRequest { .. }));
    assert!(cluster.untouched());
}
