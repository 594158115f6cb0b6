//! Typed cluster API tests.
//!
//! Every call goes through the router to the owning in-memory node, so
//! these check both routing tags and reply conversions.

mod common;

use bytes::Bytes;
use common::TestCluster;
use std::time::Duration;
use trellis::RouterError;

fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

// ============================================================================
// Strings
// ============================================================================

#[tokio::test]
async fn counters() {
    let c = TestCluster::start().await.conn;
    assert_eq!(c.incr("counter").await.unwrap(), 1);
    assert_eq!(c.incr_by("counter", 10).await.unwrap(), 11);
    assert_eq!(c.decr("counter").await.unwrap(), 10);
    assert_eq!(c.decr_by("counter", 4).await.unwrap(), 6);
    assert_eq!(c.incr_by_float("counter", 1.5).await.unwrap(), 7.5);

    c.set("text", "abc").await.unwrap();
    let err = c.incr("text").await.unwrap_err();
    assert!(matches!(err, RouterError::NodeFailure { .. }));
}

#[tokio::test]
async fn string_editing() {
    let c = TestCluster::start().await.conn;
    assert_eq!(c.append("greeting", "Hello").await.unwrap(), 5);
    assert_eq!(c.append("greeting", " World").await.unwrap(), 11);
    assert_eq!(c.strlen("greeting").await.unwrap(), 11);
    assert_eq!(c.getrange("greeting", 0, 4).await.unwrap(), b("Hello"));
    assert_eq!(c.getrange("greeting", -5, -1).await.unwrap(), b("World"));
    assert_eq!(c.setrange("greeting", 6, "Redis").await.unwrap(), 11);
    assert_eq!(c.get("greeting").await.unwrap(), Some(b("Hello Redis")));
    assert_eq!(c.getset("greeting", "bye").await.unwrap(), Some(b("Hello Redis")));
    assert_eq!(c.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn conditional_sets() {
    let c = TestCluster::start().await.conn;
    assert!(c.setnx("lock", "1").await.unwrap());
    assert!(!c.setnx("lock", "2").await.unwrap());
    assert_eq!(c.get("lock").await.unwrap(), Some(b("1")));

    assert!(c.msetnx(&[("{m}a", "1"), ("{m}b", "2")]).await.unwrap());
    assert!(!c.msetnx(&[("{m}b", "3"), ("{m}c", "4")]).await.unwrap());
    assert_eq!(
        c.mget(&["{m}a", "{m}b", "{m}c"]).await.unwrap(),
        [Some(b("1")), Some(b("2")), None]
    );
}

#[tokio::test]
async fn bits() {
    let c = TestCluster::start().await.conn;
    assert!(!c.setbit("bits", 7, true).await.unwrap());
    assert!(c.getbit("bits", 7).await.unwrap());
    assert_eq!(c.bitcount("bits").await.unwrap(), 1);

    c.set("{b}x", "foobar").await.unwrap();
    c.set("{b}y", "abcdef").await.unwrap();
    assert_eq!(c.bitop("AND", "{b}dest", &["{b}x", "{b}y"]).await.unwrap(), 6);
    assert_eq!(c.get("{b}dest").await.unwrap(), Some(b("`bc`ab")));
}

// ============================================================================
// Keys and expiry
// ============================================================================

#[tokio::test]
async fn ttl_reports_missing_and_persistent_keys() {
    let c = TestCluster::start().await.conn;
    assert_eq!(c.ttl("nothing").await.unwrap(), -2);

    c.set("plain", "v").await.unwrap();
    assert_eq!(c.ttl("plain").await.unwrap(), -1);

    assert!(c.expire("plain", 100).await.unwrap());
    let ttl = c.ttl("plain").await.unwrap();
    assert!((99..=100).contains(&ttl));
    assert!(c.pttl("plain").await.unwrap() > 99_000);

    assert!(c.persist("plain").await.unwrap());
    assert_eq!(c.ttl("plain").await.unwrap(), -1);
    assert!(!c.expire("nothing", 10).await.unwrap());
}

#[tokio::test]
async fn set_with_ttl_and_setex() {
    let c = TestCluster::start().await.conn;
    c.set_with_ttl("session", "s", Duration::from_secs(30)).await.unwrap();
    assert!(c.pttl("session").await.unwrap() > 29_000);

    c.setex("short", 5, "v").await.unwrap();
    assert!((4..=5).contains(&c.ttl("short").await.unwrap()));
    c.psetex("shorter", 1500, "v").await.unwrap();
    assert!(c.pttl("shorter").await.unwrap() <= 1500);
}

#[tokio::test]
async fn key_admin() {
    let c = TestCluster::start().await.conn;
    c.set("{k}a", "1").await.unwrap();
    assert_eq!(c.exists(&["{k}a", "{k}b"]).await.unwrap(), 1);
    assert_eq!(c.key_type("{k}a").await.unwrap(), "string");
    assert_eq!(c.key_type("{k}b").await.unwrap(), "none");

    c.rename("{k}a", "{k}b").await.unwrap();
    assert_eq!(c.exists(&["{k}a"]).await.unwrap(), 0);
    c.set("{k}c", "3").await.unwrap();
    assert!(!c.renamenx("{k}b", "{k}c").await.unwrap());
    assert_eq!(c.del(&["{k}b", "{k}c", "{k}d"]).await.unwrap(), 2);
}

#[tokio::test]
async fn dump_and_restore() {
    let c = TestCluster::start().await.conn;
    c.rpush("source", &["a", "b", "c"]).await.unwrap();

    let payload = c.dump("source").await.unwrap().expect("payload");
    assert_eq!(c.dump("absent").await.unwrap(), None);

    c.restore("copy", Duration::ZERO, &payload, false).await.unwrap();
    assert_eq!(c.lrange("copy", 0, -1).await.unwrap(), [b("a"), b("b"), b("c")]);

    // target exists
    assert!(c.restore("copy", Duration::ZERO, &payload, false).await.is_err());
    c.restore("copy", Duration::from_secs(60), &payload, true).await.unwrap();
    assert!(c.ttl("copy").await.unwrap() > 0);
}

#[tokio::test]
async fn sort_list() {
    let c = TestCluster::start().await.conn;
    c.rpush("nums", &["3", "1", "2"]).await.unwrap();
    assert_eq!(c.sort("nums", &[]).await.unwrap(), [b("1"), b("2"), b("3")]);
    assert_eq!(c.sort("nums", &["DESC"]).await.unwrap(), [b("3"), b("2"), b("1")]);
}

// ============================================================================
// Lists
// ============================================================================

#[tokio::test]
async fn list_operations() {
    let c = TestCluster::start().await.conn;
    assert_eq!(c.rpush("list", &["b", "c"]).await.unwrap(), 2);
    assert_eq!(c.lpush("list", &["a"]).await.unwrap(), 3);
    assert_eq!(c.lpushx("absent", "x").await.unwrap(), 0);
    assert_eq!(c.rpushx("list", "d").await.unwrap(), 4);
    assert_eq!(c.llen("list").await.unwrap(), 4);
    assert_eq!(c.lindex("list", -1).await.unwrap(), Some(b("d")));

    assert_eq!(c.linsert("list", true, "c", "bb").await.unwrap(), 5);
    assert_eq!(c.linsert("list", false, "zz", "x").await.unwrap(), -1);
    c.lset("list", 0, "A").await.unwrap();
    assert_eq!(
        c.lrange("list", 0, -1).await.unwrap(),
        [b("A"), b("b"), b("bb"), b("c"), b("d")]
    );

    assert_eq!(c.lrem("list", 0, "bb").await.unwrap(), 1);
    c.ltrim("list", 1, 2).await.unwrap();
    assert_eq!(c.lrange("list", 0, -1).await.unwrap(), [b("b"), b("c")]);
    assert_eq!(c.lpop("list").await.unwrap(), Some(b("b")));
    assert_eq!(c.rpop("list").await.unwrap(), Some(b("c")));
    assert_eq!(c.rpop("list").await.unwrap(), None);
}

#[tokio::test]
async fn list_moves() {
    let c = TestCluster::start().await.conn;
    c.rpush("{l}src", &["1", "2"]).await.unwrap();
    assert_eq!(c.rpoplpush("{l}src", "{l}dst").await.unwrap(), Some(b("2")));
    assert_eq!(c.brpoplpush("{l}src", "{l}dst", 0).await.unwrap(), Some(b("1")));
    assert_eq!(c.brpoplpush("{l}src", "{l}dst", 0).await.unwrap(), None);
    assert_eq!(c.lrange("{l}dst", 0, -1).await.unwrap(), [b("1"), b("2")]);

    let err = c.rpoplpush("src", "dst").await.unwrap_err();
    assert!(matches!(err, RouterError::CrossSlot { .. }));
}

// ============================================================================
// Sets
// ============================================================================

#[tokio::test]
async fn set_operations() {
    let c = TestCluster::start().await.conn;
    assert_eq!(c.sadd("{s}a", &["1", "2", "3"]).await.unwrap(), 3);
    assert_eq!(c.sadd("{s}b", &["2", "3", "4"]).await.unwrap(), 3);
    assert_eq!(c.scard("{s}a").await.unwrap(), 3);
    assert!(c.sismember("{s}a", "1").await.unwrap());

    assert_eq!(c.sinter(&["{s}a", "{s}b"]).await.unwrap(), [b("2"), b("3")]);
    assert_eq!(c.sunion(&["{s}a", "{s}b"]).await.unwrap().len(), 4);
    assert_eq!(c.sdiff(&["{s}a", "{s}b"]).await.unwrap(), [b("1")]);
    assert_eq!(c.sinterstore("{s}i", &["{s}a", "{s}b"]).await.unwrap(), 2);
    assert_eq!(c.sunionstore("{s}u", &["{s}a", "{s}b"]).await.unwrap(), 4);
    assert_eq!(c.sdiffstore("{s}d", &["{s}b", "{s}a"]).await.unwrap(), 1);

    assert!(c.smove("{s}a", "{s}b", "1").await.unwrap());
    assert_eq!(c.smembers("{s}b").await.unwrap().len(), 4);
    assert_eq!(c.srem("{s}b", &["1", "9"]).await.unwrap(), 1);

    let popped = c.spop("{s}i").await.unwrap().expect("member");
    assert!(popped == b("2") || popped == b("3"));
    assert!(c.srandmember("{s}i").await.unwrap().is_some());
    assert_eq!(c.spop("{s}none").await.unwrap(), None);
}

// ============================================================================
// Hashes
// ============================================================================

#[tokio::test]
async fn hash_operations() {
    let c = TestCluster::start().await.conn;
    assert!(c.hset("user", "name", "ada").await.unwrap());
    assert!(!c.hset("user", "name", "grace").await.unwrap());
    assert!(!c.hsetnx("user", "name", "x").await.unwrap());
    c.hmset("user", &[("lang", "rust"), ("visits", "1")]).await.unwrap();

    assert_eq!(c.hget("user", "name").await.unwrap(), Some(b("grace")));
    assert_eq!(
        c.hmget("user", &["lang", "nope"]).await.unwrap(),
        [Some(b("rust")), None]
    );
    assert!(c.hexists("user", "lang").await.unwrap());
    assert_eq!(c.hlen("user").await.unwrap(), 3);
    assert_eq!(c.hincrby("user", "visits", 2).await.unwrap(), 3);
    assert_eq!(c.hincrbyfloat("user", "score", 0.5).await.unwrap(), 0.5);

    assert_eq!(
        c.hkeys("user").await.unwrap(),
        [b("lang"), b("name"), b("score"), b("visits")]
    );
    assert_eq!(c.hvals("user").await.unwrap().len(), 4);
    let all = c.hgetall("user").await.unwrap();
    assert_eq!(all[0], (b("lang"), b("rust")));
    assert_eq!(c.hdel("user", &["lang", "nope"]).await.unwrap(), 1);
    assert!(c.hgetall("none").await.unwrap().is_empty());
}

// ============================================================================
// Sorted sets
// ============================================================================

#[tokio::test]
async fn sorted_set_operations() {
    let c = TestCluster::start().await.conn;
    let added = c
        .zadd("board", &[(3.0, "carol"), (1.0, "alice"), (2.0, "bob")])
        .await
        .unwrap();
    assert_eq!(added, 3);
    assert_eq!(c.zcard("board").await.unwrap(), 3);
    assert_eq!(c.zscore("board", "bob").await.unwrap(), Some(2.0));
    assert_eq!(c.zscore("board", "dave").await.unwrap(), None);
    assert_eq!(c.zrank("board", "carol").await.unwrap(), Some(2));
    assert_eq!(c.zrevrank("board", "carol").await.unwrap(), Some(0));
    assert_eq!(c.zrank("board", "dave").await.unwrap(), None);

    assert_eq!(
        c.zrange("board", 0, -1).await.unwrap(),
        [b("alice"), b("bob"), b("carol")]
    );
    assert_eq!(
        c.zrevrange("board", 0, 0).await.unwrap(),
        [b("carol")]
    );
    assert_eq!(
        c.zrange_withscores("board", 0, 0).await.unwrap(),
        [(b("alice"), 1.0)]
    );
    assert_eq!(c.zincrby("board", 5.0, "alice").await.unwrap(), 6.0);
    assert_eq!(c.zcount("board", "(2", "+inf").await.unwrap(), 2);
    assert_eq!(
        c.zrangebyscore("board", "-inf", "3").await.unwrap(),
        [b("bob"), b("carol")]
    );

    assert_eq!(c.zremrangebyscore("board", "6", "6").await.unwrap(), 1);
    assert_eq!(c.zremrangebyrank("board", 0, 0).await.unwrap(), 1);
    assert_eq!(c.zrem("board", &["carol", "zed"]).await.unwrap(), 1);
    assert_eq!(c.zcard("board").await.unwrap(), 0);
}

// ============================================================================
// Raw commands
// ============================================================================

#[tokio::test]
async fn raw_command_passthrough() {
    let cluster = TestCluster::start().await;
    let c = &cluster.conn;
    c.sadd("tags", &["a", "b"]).await.unwrap();

    let page = c
        .command(common::cmd(&["SSCAN", "tags", "0"]))
        .await
        .unwrap();
    let parts = page.into_array().unwrap();
    assert_eq!(parts[0].as_str(), Some("0"));
    assert_eq!(parts[1].as_array().map(|a| a.len()), Some(2));
}
