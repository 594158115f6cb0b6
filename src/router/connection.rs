//! Typed cluster API.
//!
//! [`ClusterConnection`] offers every store operation with the same shape a
//! single-node client would: the same arguments and the same return
//! semantics. Each call builds a command, hands it to the router and converts
//! the reply. Replies that do not have the expected shape fail with
//! [`RouterError::UnexpectedReply`].
//!
//! Cluster-wide diagnostics (`info`, `time`, `client_list`, ...) return a
//! [`NodeResults`] map so callers see every node's answer or failure.

use super::aggregate::NodeResults;
use super::dispatch::ClusterRouter;
use crate::cluster::node::Node;
use crate::cluster::slot;
use crate::core::error::{RouterError, RouterResult};
use crate::protocol::{RedisCommand, RedisValue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Conversion from a reply to a typed value.
pub trait FromReply: Sized {
    /// `None` when the reply has the wrong shape.
    fn from_reply(value: RedisValue) -> Option<Self>;
}

impl FromReply for RedisValue {
    fn from_reply(value: RedisValue) -> Option<Self> {
        Some(value)
    }
}

impl FromReply for () {
    fn from_reply(value: RedisValue) -> Option<Self> {
        matches!(value, RedisValue::SimpleString(_)).then_some(())
    }
}

impl FromReply for i64 {
    fn from_reply(value: RedisValue) -> Option<Self> {
        match value {
            RedisValue::Integer(n) => Some(n),
            _ => None,
        }
    }
}

impl FromReply for Option<i64> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        match value {
            RedisValue::Null => Some(None),
            other => i64::from_reply(other).map(Some),
        }
    }
}

/// Integer 0/1, OK or null.
impl FromReply for bool {
    fn from_reply(value: RedisValue) -> Option<Self> {
        match value {
            RedisValue::Integer(n) => Some(n != 0),
            RedisValue::SimpleString(_) => Some(true),
            RedisValue::Null => Some(false),
            _ => None,
        }
    }
}

impl FromReply for f64 {
    fn from_reply(value: RedisValue) -> Option<Self> {
        value.as_str().and_then(|s| s.parse().ok())
    }
}

impl FromReply for Option<f64> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        match value {
            RedisValue::Null => Some(None),
            other => f64::from_reply(other).map(Some),
        }
    }
}

impl FromReply for Bytes {
    fn from_reply(value: RedisValue) -> Option<Self> {
        value.into_bytes()
    }
}

impl FromReply for Option<Bytes> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        match value {
            RedisValue::Null => Some(None),
            other => other.into_bytes().map(Some),
        }
    }
}

impl FromReply for String {
    fn from_reply(value: RedisValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromReply for Vec<Bytes> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        match value {
            RedisValue::Null => Some(Vec::new()),
            other => other
                .into_array()?
                .into_iter()
                .map(RedisValue::into_bytes)
                .collect(),
        }
    }
}

impl FromReply for Vec<Option<Bytes>> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        value
            .into_array()?
            .into_iter()
            .map(Option::<Bytes>::from_reply)
            .collect()
    }
}

/// Flat `[a1, b1, a2, b2, ...]` arrays.
impl FromReply for Vec<(Bytes, Bytes)> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        let items = Vec::<Bytes>::from_reply(value)?;
        if items.len() % 2 != 0 {
            return None;
        }
        Some(
            items
                .chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
        )
    }
}

/// Member/score pairs from WITHSCORES.
impl FromReply for Vec<(Bytes, f64)> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        Vec::<(Bytes, Bytes)>::from_reply(value)?
            .into_iter()
            .map(|(member, score)| {
                let score = std::str::from_utf8(&score).ok()?.parse().ok()?;
                Some((member, score))
            })
            .collect()
    }
}

/// `[key, value]` from the blocking pops, or null.
impl FromReply for Option<(Bytes, Bytes)> {
    fn from_reply(value: RedisValue) -> Option<Self> {
        match value {
            RedisValue::Null => Some(None),
            other => {
                let mut pairs = Vec::<(Bytes, Bytes)>::from_reply(other)?;
                (pairs.len() == 1).then(|| pairs.pop())
            }
        }
    }
}

/// Cluster-wide client with single-node method signatures.
#[derive(Debug, Clone)]
pub struct ClusterConnection {
    router: Arc<ClusterRouter>,
}

fn command(name: &str) -> RedisCommand {
    RedisCommand::named(name)
}

fn with_keys<K: AsRef<[u8]>>(mut cmd: RedisCommand, keys: &[K]) -> RedisCommand {
    for key in keys {
        cmd = cmd.arg_slice(key.as_ref());
    }
    cmd
}

fn convert<T: FromReply>(name: &str, value: RedisValue) -> RouterResult<T> {
    let shape = describe(&value);
    T::from_reply(value).ok_or_else(|| {
        RouterError::unexpected_reply(name, format!("{} does not fit the command", shape))
    })
}

fn describe(value: &RedisValue) -> &'static str {
    match value {
        RedisValue::SimpleString(_) => "simple string",
        RedisValue::Error(_) => "error",
        RedisValue::Integer(_) => "integer",
        RedisValue::BulkString(_) => "bulk string",
        RedisValue::Array(_) => "array",
        RedisValue::Null => "null",
        RedisValue::Map(_) => "map",
    }
}

impl ClusterConnection {
    /// Wrap a router.
    pub fn new(router: Arc<ClusterRouter>) -> Self {
        Self { router }
    }

    /// Router behind this connection.
    pub fn router(&self) -> &Arc<ClusterRouter> {
        &self.router
    }

    /// Slot a key hashes to.
    pub fn slot_for_key(&self, key: impl AsRef<[u8]>) -> u16 {
        slot::slot(key.as_ref())
    }

    /// Node currently owning a key.
    pub fn node_for_key(&self, key: impl AsRef<[u8]>) -> RouterResult<Node> {
        self.router.registry().node_for_key(key.as_ref())
    }

    /// Execute any tagged command and return the raw reply.
    pub async fn command(&self, cmd: RedisCommand) -> RouterResult<RedisValue> {
        self.router.execute(&cmd).await
    }

    async fn call<T: FromReply>(&self, cmd: RedisCommand) -> RouterResult<T> {
        let reply = self.router.execute(&cmd).await?;
        convert(&cmd.name, reply)
    }

    async fn call_on<T: FromReply>(&self, node: &Node, cmd: RedisCommand) -> RouterResult<T> {
        let reply = self.router.execute_on_node(node, &cmd).await?;
        convert(&cmd.name, reply)
    }

    async fn call_each<T: FromReply>(&self, cmd: RedisCommand) -> NodeResults<T> {
        self.router
            .fan_out(&cmd)
            .await
            .map(|_, reply| convert(&cmd.name, reply))
    }

    // Strings

    pub async fn get(&self, key: impl AsRef<[u8]>) -> RouterResult<Option<Bytes>> {
        self.call(command("GET").arg_slice(key.as_ref())).await
    }

    pub async fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> RouterResult<()> {
        self.call(command("SET").arg_slice(key.as_ref()).arg_slice(value.as_ref()))
            .await
    }

    /// SET with an expiry in milliseconds.
    pub async fn set_with_ttl(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        ttl: Duration,
    ) -> RouterResult<()> {
        let cmd = command("SET")
            .arg_slice(key.as_ref())
            .arg_slice(value.as_ref())
            .arg("PX")
            .arg_display(ttl.as_millis());
        self.call(cmd).await
    }

    pub async fn setnx(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<bool> {
        self.call(command("SETNX").arg_slice(key.as_ref()).arg_slice(value.as_ref()))
            .await
    }

    pub async fn setex(
        &self,
        key: impl AsRef<[u8]>,
        seconds: u64,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<()> {
        let cmd = command("SETEX")
            .arg_slice(key.as_ref())
            .arg_display(seconds)
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn psetex(
        &self,
        key: impl AsRef<[u8]>,
        millis: u64,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<()> {
        let cmd = command("PSETEX")
            .arg_slice(key.as_ref())
            .arg_display(millis)
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn getset(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<Option<Bytes>> {
        self.call(command("GETSET").arg_slice(key.as_ref()).arg_slice(value.as_ref()))
            .await
    }

    pub async fn mget<K: AsRef<[u8]>>(&self, keys: &[K]) -> RouterResult<Vec<Option<Bytes>>> {
        self.call(with_keys(command("MGET"), keys)).await
    }

    pub async fn mset<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, pairs: &[(K, V)]) -> RouterResult<()> {
        self.call(pairs_command("MSET", pairs)).await
    }

    pub async fn msetnx<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        pairs: &[(K, V)],
    ) -> RouterResult<bool> {
        self.call(pairs_command("MSETNX", pairs)).await
    }

    pub async fn incr(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("INCR").arg_slice(key.as_ref())).await
    }

    pub async fn incr_by(&self, key: impl AsRef<[u8]>, delta: i64) -> RouterResult<i64> {
        self.call(command("INCRBY").arg_slice(key.as_ref()).arg_display(delta))
            .await
    }

    pub async fn incr_by_float(&self, key: impl AsRef<[u8]>, delta: f64) -> RouterResult<f64> {
        self.call(command("INCRBYFLOAT").arg_slice(key.as_ref()).arg_display(delta))
            .await
    }

    pub async fn decr(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("DECR").arg_slice(key.as_ref())).await
    }

    pub async fn decr_by(&self, key: impl AsRef<[u8]>, delta: i64) -> RouterResult<i64> {
        self.call(command("DECRBY").arg_slice(key.as_ref()).arg_display(delta))
            .await
    }

    pub async fn append(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<i64> {
        self.call(command("APPEND").arg_slice(key.as_ref()).arg_slice(value.as_ref()))
            .await
    }

    pub async fn strlen(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("STRLEN").arg_slice(key.as_ref())).await
    }

    pub async fn getrange(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        end: i64,
    ) -> RouterResult<Bytes> {
        let cmd = command("GETRANGE")
            .arg_slice(key.as_ref())
            .arg_display(start)
            .arg_display(end);
        self.call(cmd).await
    }

    pub async fn setrange(
        &self,
        key: impl AsRef<[u8]>,
        offset: u64,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<i64> {
        let cmd = command("SETRANGE")
            .arg_slice(key.as_ref())
            .arg_display(offset)
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn getbit(&self, key: impl AsRef<[u8]>, offset: u64) -> RouterResult<bool> {
        self.call(command("GETBIT").arg_slice(key.as_ref()).arg_display(offset))
            .await
    }

    /// Returns the previous bit.
    pub async fn setbit(
        &self,
        key: impl AsRef<[u8]>,
        offset: u64,
        bit: bool,
    ) -> RouterResult<bool> {
        let cmd = command("SETBIT")
            .arg_slice(key.as_ref())
            .arg_display(offset)
            .arg_display(u8::from(bit));
        self.call(cmd).await
    }

    pub async fn bitcount(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("BITCOUNT").arg_slice(key.as_ref())).await
    }

    /// BITOP `op` into `destination`; the length of the result string.
    pub async fn bitop<K: AsRef<[u8]>>(
        &self,
        op: &str,
        destination: impl AsRef<[u8]>,
        sources: &[K],
    ) -> RouterResult<i64> {
        let cmd = command("BITOP").arg_slice(op.as_bytes()).arg_slice(destination.as_ref());
        self.call(with_keys(cmd, sources)).await
    }

    // Keys

    pub async fn del<K: AsRef<[u8]>>(&self, keys: &[K]) -> RouterResult<i64> {
        self.call(with_keys(command("DEL"), keys)).await
    }

    pub async fn exists<K: AsRef<[u8]>>(&self, keys: &[K]) -> RouterResult<i64> {
        self.call(with_keys(command("EXISTS"), keys)).await
    }

    /// Type name of a key's value (`none` when absent).
    pub async fn key_type(&self, key: impl AsRef<[u8]>) -> RouterResult<String> {
        self.call(command("TYPE").arg_slice(key.as_ref())).await
    }

    pub async fn expire(&self, key: impl AsRef<[u8]>, seconds: i64) -> RouterResult<bool> {
        self.call(command("EXPIRE").arg_slice(key.as_ref()).arg_display(seconds))
            .await
    }

    pub async fn pexpire(&self, key: impl AsRef<[u8]>, millis: i64) -> RouterResult<bool> {
        self.call(command("PEXPIRE").arg_slice(key.as_ref()).arg_display(millis))
            .await
    }

    pub async fn expireat(&self, key: impl AsRef<[u8]>, unix_seconds: i64) -> RouterResult<bool> {
        self.call(command("EXPIREAT").arg_slice(key.as_ref()).arg_display(unix_seconds))
            .await
    }

    pub async fn pexpireat(&self, key: impl AsRef<[u8]>, unix_millis: i64) -> RouterResult<bool> {
        self.call(command("PEXPIREAT").arg_slice(key.as_ref()).arg_display(unix_millis))
            .await
    }

    pub async fn persist(&self, key: impl AsRef<[u8]>) -> RouterResult<bool> {
        self.call(command("PERSIST").arg_slice(key.as_ref())).await
    }

    /// Seconds to live; -1 without expiry, -2 when absent.
    pub async fn ttl(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("TTL").arg_slice(key.as_ref())).await
    }

    pub async fn pttl(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("PTTL").arg_slice(key.as_ref())).await
    }

    pub async fn rename(
        &self,
        key: impl AsRef<[u8]>,
        new_key: impl AsRef<[u8]>,
    ) -> RouterResult<()> {
        self.call(command("RENAME").arg_slice(key.as_ref()).arg_slice(new_key.as_ref()))
            .await
    }

    pub async fn renamenx(
        &self,
        key: impl AsRef<[u8]>,
        new_key: impl AsRef<[u8]>,
    ) -> RouterResult<bool> {
        self.call(command("RENAMENX").arg_slice(key.as_ref()).arg_slice(new_key.as_ref()))
            .await
    }

    /// Serialized value, `None` when the key is absent.
    pub async fn dump(&self, key: impl AsRef<[u8]>) -> RouterResult<Option<Bytes>> {
        self.call(command("DUMP").arg_slice(key.as_ref())).await
    }

    /// Recreate a key from [`dump`](Self::dump) output. `ttl` of zero means
    /// no expiry.
    pub async fn restore(
        &self,
        key: impl AsRef<[u8]>,
        ttl: Duration,
        serialized: impl AsRef<[u8]>,
        replace: bool,
    ) -> RouterResult<()> {
        let mut cmd = command("RESTORE")
            .arg_slice(key.as_ref())
            .arg_display(ttl.as_millis())
            .arg_slice(serialized.as_ref());
        if replace {
            cmd = cmd.arg("REPLACE");
        }
        self.call(cmd).await
    }

    /// SORT with optional extra arguments (`ALPHA`, `DESC`, `LIMIT o c`).
    pub async fn sort(&self, key: impl AsRef<[u8]>, options: &[&str]) -> RouterResult<Vec<Bytes>> {
        let mut cmd = command("SORT").arg_slice(key.as_ref());
        for option in options {
            cmd = cmd.arg_slice(option.as_bytes());
        }
        self.call(cmd).await
    }

    /// Keys matching a pattern on every node.
    pub async fn keys(&self, pattern: impl AsRef<[u8]>) -> RouterResult<Vec<Bytes>> {
        self.call(command("KEYS").arg_slice(pattern.as_ref())).await
    }

    /// A random key from the first node that has one.
    pub async fn randomkey(&self) -> RouterResult<Option<Bytes>> {
        self.call(command("RANDOMKEY")).await
    }

    // Lists

    pub async fn lpush<V: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        values: &[V],
    ) -> RouterResult<i64> {
        self.call(with_keys(command("LPUSH").arg_slice(key.as_ref()), values))
            .await
    }

    pub async fn rpush<V: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        values: &[V],
    ) -> RouterResult<i64> {
        self.call(with_keys(command("RPUSH").arg_slice(key.as_ref()), values))
            .await
    }

    pub async fn lpushx(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<i64> {
        self.call(command("LPUSHX").arg_slice(key.as_ref()).arg_slice(value.as_ref()))
            .await
    }

    pub async fn rpushx(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<i64> {
        self.call(command("RPUSHX").arg_slice(key.as_ref()).arg_slice(value.as_ref()))
            .await
    }

    pub async fn llen(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("LLEN").arg_slice(key.as_ref())).await
    }

    pub async fn lrange(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> RouterResult<Vec<Bytes>> {
        let cmd = command("LRANGE")
            .arg_slice(key.as_ref())
            .arg_display(start)
            .arg_display(stop);
        self.call(cmd).await
    }

    pub async fn ltrim(&self, key: impl AsRef<[u8]>, start: i64, stop: i64) -> RouterResult<()> {
        let cmd = command("LTRIM")
            .arg_slice(key.as_ref())
            .arg_display(start)
            .arg_display(stop);
        self.call(cmd).await
    }

    pub async fn lindex(&self, key: impl AsRef<[u8]>, index: i64) -> RouterResult<Option<Bytes>> {
        self.call(command("LINDEX").arg_slice(key.as_ref()).arg_display(index))
            .await
    }

    /// Insert before or after `pivot`; -1 when the pivot is missing.
    pub async fn linsert(
        &self,
        key: impl AsRef<[u8]>,
        before: bool,
        pivot: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<i64> {
        let cmd = command("LINSERT")
            .arg_slice(key.as_ref())
            .arg(if before { "BEFORE" } else { "AFTER" })
            .arg_slice(pivot.as_ref())
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn lset(
        &self,
        key: impl AsRef<[u8]>,
        index: i64,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<()> {
        let cmd = command("LSET")
            .arg_slice(key.as_ref())
            .arg_display(index)
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn lrem(
        &self,
        key: impl AsRef<[u8]>,
        count: i64,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<i64> {
        let cmd = command("LREM")
            .arg_slice(key.as_ref())
            .arg_display(count)
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn lpop(&self, key: impl AsRef<[u8]>) -> RouterResult<Option<Bytes>> {
        self.call(command("LPOP").arg_slice(key.as_ref())).await
    }

    pub async fn rpop(&self, key: impl AsRef<[u8]>) -> RouterResult<Option<Bytes>> {
        self.call(command("RPOP").arg_slice(key.as_ref())).await
    }

    pub async fn rpoplpush(
        &self,
        source: impl AsRef<[u8]>,
        destination: impl AsRef<[u8]>,
    ) -> RouterResult<Option<Bytes>> {
        let cmd = command("RPOPLPUSH")
            .arg_slice(source.as_ref())
            .arg_slice(destination.as_ref());
        self.call(cmd).await
    }

    pub async fn brpoplpush(
        &self,
        source: impl AsRef<[u8]>,
        destination: impl AsRef<[u8]>,
        timeout_secs: u64,
    ) -> RouterResult<Option<Bytes>> {
        let cmd = command("BRPOPLPUSH")
            .arg_slice(source.as_ref())
            .arg_slice(destination.as_ref())
            .arg_display(timeout_secs);
        self.call(cmd).await
    }

    /// Pop from the first non-empty list: `(key, value)`.
    pub async fn blpop<K: AsRef<[u8]>>(
        &self,
        keys: &[K],
        timeout_secs: u64,
    ) -> RouterResult<Option<(Bytes, Bytes)>> {
        self.call(with_keys(command("BLPOP"), keys).arg_display(timeout_secs))
            .await
    }

    pub async fn brpop<K: AsRef<[u8]>>(
        &self,
        keys: &[K],
        timeout_secs: u64,
    ) -> RouterResult<Option<(Bytes, Bytes)>> {
        self.call(with_keys(command("BRPOP"), keys).arg_display(timeout_secs))
            .await
    }

    // Sets

    pub async fn sadd<M: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        members: &[M],
    ) -> RouterResult<i64> {
        self.call(with_keys(command("SADD").arg_slice(key.as_ref()), members))
            .await
    }

    pub async fn srem<M: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        members: &[M],
    ) -> RouterResult<i64> {
        self.call(with_keys(command("SREM").arg_slice(key.as_ref()), members))
            .await
    }

    pub async fn spop(&self, key: impl AsRef<[u8]>) -> RouterResult<Option<Bytes>> {
        self.call(command("SPOP").arg_slice(key.as_ref())).await
    }

    pub async fn scard(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("SCARD").arg_slice(key.as_ref())).await
    }

    pub async fn sismember(
        &self,
        key: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> RouterResult<bool> {
        self.call(command("SISMEMBER").arg_slice(key.as_ref()).arg_slice(member.as_ref()))
            .await
    }

    pub async fn smembers(&self, key: impl AsRef<[u8]>) -> RouterResult<Vec<Bytes>> {
        self.call(command("SMEMBERS").arg_slice(key.as_ref())).await
    }

    pub async fn srandmember(&self, key: impl AsRef<[u8]>) -> RouterResult<Option<Bytes>> {
        self.call(command("SRANDMEMBER").arg_slice(key.as_ref())).await
    }

    pub async fn smove(
        &self,
        source: impl AsRef<[u8]>,
        destination: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> RouterResult<bool> {
        let cmd = command("SMOVE")
            .arg_slice(source.as_ref())
            .arg_slice(destination.as_ref())
            .arg_slice(member.as_ref());
        self.call(cmd).await
    }

    pub async fn sinter<K: AsRef<[u8]>>(&self, keys: &[K]) -> RouterResult<Vec<Bytes>> {
        self.call(with_keys(command("SINTER"), keys)).await
    }

    pub async fn sunion<K: AsRef<[u8]>>(&self, keys: &[K]) -> RouterResult<Vec<Bytes>> {
        self.call(with_keys(command("SUNION"), keys)).await
    }

    pub async fn sdiff<K: AsRef<[u8]>>(&self, keys: &[K]) -> RouterResult<Vec<Bytes>> {
        self.call(with_keys(command("SDIFF"), keys)).await
    }

    pub async fn sinterstore<K: AsRef<[u8]>>(
        &self,
        destination: impl AsRef<[u8]>,
        keys: &[K],
    ) -> RouterResult<i64> {
        let cmd = command("SINTERSTORE").arg_slice(destination.as_ref());
        self.call(with_keys(cmd, keys)).await
    }

    pub async fn sunionstore<K: AsRef<[u8]>>(
        &self,
        destination: impl AsRef<[u8]>,
        keys: &[K],
    ) -> RouterResult<i64> {
        let cmd = command("SUNIONSTORE").arg_slice(destination.as_ref());
        self.call(with_keys(cmd, keys)).await
    }

    pub async fn sdiffstore<K: AsRef<[u8]>>(
        &self,
        destination: impl AsRef<[u8]>,
        keys: &[K],
    ) -> RouterResult<i64> {
        let cmd = command("SDIFFSTORE").arg_slice(destination.as_ref());
        self.call(with_keys(cmd, keys)).await
    }

    // Hashes

    /// Returns true when the field is new.
    pub async fn hset(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<bool> {
        let cmd = command("HSET")
            .arg_slice(key.as_ref())
            .arg_slice(field.as_ref())
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn hsetnx(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> RouterResult<bool> {
        let cmd = command("HSETNX")
            .arg_slice(key.as_ref())
            .arg_slice(field.as_ref())
            .arg_slice(value.as_ref());
        self.call(cmd).await
    }

    pub async fn hget(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
    ) -> RouterResult<Option<Bytes>> {
        self.call(command("HGET").arg_slice(key.as_ref()).arg_slice(field.as_ref()))
            .await
    }

    pub async fn hmset<F: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        fields: &[(F, V)],
    ) -> RouterResult<()> {
        let mut cmd = command("HMSET").arg_slice(key.as_ref());
        for (field, value) in fields {
            cmd = cmd.arg_slice(field.as_ref()).arg_slice(value.as_ref());
        }
        self.call(cmd).await
    }

    pub async fn hmget<F: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        fields: &[F],
    ) -> RouterResult<Vec<Option<Bytes>>> {
        self.call(with_keys(command("HMGET").arg_slice(key.as_ref()), fields))
            .await
    }

    pub async fn hdel<F: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        fields: &[F],
    ) -> RouterResult<i64> {
        self.call(with_keys(command("HDEL").arg_slice(key.as_ref()), fields))
            .await
    }

    pub async fn hexists(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
    ) -> RouterResult<bool> {
        self.call(command("HEXISTS").arg_slice(key.as_ref()).arg_slice(field.as_ref()))
            .await
    }

    pub async fn hlen(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("HLEN").arg_slice(key.as_ref())).await
    }

    pub async fn hkeys(&self, key: impl AsRef<[u8]>) -> RouterResult<Vec<Bytes>> {
        self.call(command("HKEYS").arg_slice(key.as_ref())).await
    }

    pub async fn hvals(&self, key: impl AsRef<[u8]>) -> RouterResult<Vec<Bytes>> {
        self.call(command("HVALS").arg_slice(key.as_ref())).await
    }

    pub async fn hgetall(&self, key: impl AsRef<[u8]>) -> RouterResult<Vec<(Bytes, Bytes)>> {
        self.call(command("HGETALL").arg_slice(key.as_ref())).await
    }

    pub async fn hincrby(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        delta: i64,
    ) -> RouterResult<i64> {
        let cmd = command("HINCRBY")
            .arg_slice(key.as_ref())
            .arg_slice(field.as_ref())
            .arg_display(delta);
        self.call(cmd).await
    }

    pub async fn hincrbyfloat(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        delta: f64,
    ) -> RouterResult<f64> {
        let cmd = command("HINCRBYFLOAT")
            .arg_slice(key.as_ref())
            .arg_slice(field.as_ref())
            .arg_display(delta);
        self.call(cmd).await
    }

    // Sorted sets

    /// Add or update members; the number of members added.
    pub async fn zadd<M: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        members: &[(f64, M)],
    ) -> RouterResult<i64> {
        let mut cmd = command("ZADD").arg_slice(key.as_ref());
        for (score, member) in members {
            cmd = cmd.arg_display(score).arg_slice(member.as_ref());
        }
        self.call(cmd).await
    }

    pub async fn zrem<M: AsRef<[u8]>>(
        &self,
        key: impl AsRef<[u8]>,
        members: &[M],
    ) -> RouterResult<i64> {
        self.call(with_keys(command("ZREM").arg_slice(key.as_ref()), members))
            .await
    }

    pub async fn zscore(
        &self,
        key: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> RouterResult<Option<f64>> {
        self.call(command("ZSCORE").arg_slice(key.as_ref()).arg_slice(member.as_ref()))
            .await
    }

    pub async fn zcard(&self, key: impl AsRef<[u8]>) -> RouterResult<i64> {
        self.call(command("ZCARD").arg_slice(key.as_ref())).await
    }

    /// Members with scores in `[min, max]`; bounds accept `(`, `-inf`, `+inf`.
    pub async fn zcount(&self, key: impl AsRef<[u8]>, min: &str, max: &str) -> RouterResult<i64> {
        let cmd = command("ZCOUNT")
            .arg_slice(key.as_ref())
            .arg_slice(min.as_bytes())
            .arg_slice(max.as_bytes());
        self.call(cmd).await
    }

    pub async fn zincrby(
        &self,
        key: impl AsRef<[u8]>,
        delta: f64,
        member: impl AsRef<[u8]>,
    ) -> RouterResult<f64> {
        let cmd = command("ZINCRBY")
            .arg_slice(key.as_ref())
            .arg_display(delta)
            .arg_slice(member.as_ref());
        self.call(cmd).await
    }

    pub async fn zrank(
        &self,
        key: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> RouterResult<Option<i64>> {
        self.call(command("ZRANK").arg_slice(key.as_ref()).arg_slice(member.as_ref()))
            .await
    }

    pub async fn zrevrank(
        &self,
        key: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> RouterResult<Option<i64>> {
        self.call(command("ZREVRANK").arg_slice(key.as_ref()).arg_slice(member.as_ref()))
            .await
    }

    pub async fn zrange(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> RouterResult<Vec<Bytes>> {
        self.call(range_command("ZRANGE", key.as_ref(), start, stop))
            .await
    }

    pub async fn zrange_withscores(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> RouterResult<Vec<(Bytes, f64)>> {
        self.call(range_command("ZRANGE", key.as_ref(), start, stop).arg("WITHSCORES"))
            .await
    }

    pub async fn zrevrange(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> RouterResult<Vec<Bytes>> {
        self.call(range_command("ZREVRANGE", key.as_ref(), start, stop))
            .await
    }

    pub async fn zrangebyscore(
        &self,
        key: impl AsRef<[u8]>,
        min: &str,
        max: &str,
    ) -> RouterResult<Vec<Bytes>> {
        let cmd = command("ZRANGEBYSCORE")
            .arg_slice(key.as_ref())
            .arg_slice(min.as_bytes())
            .arg_slice(max.as_bytes());
        self.call(cmd).await
    }

    pub async fn zremrangebyrank(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> RouterResult<i64> {
        self.call(range_command("ZREMRANGEBYRANK", key.as_ref(), start, stop))
            .await
    }

    pub async fn zremrangebyscore(
        &self,
        key: impl AsRef<[u8]>,
        min: &str,
        max: &str,
    ) -> RouterResult<i64> {
        let cmd = command("ZREMRANGEBYSCORE")
            .arg_slice(key.as_ref())
            .arg_slice(min.as_bytes())
            .arg_slice(max.as_bytes());
        self.call(cmd).await
    }

    // Server, cluster-wide

    /// Total keys across every node.
    pub async fn dbsize(&self) -> RouterResult<i64> {
        self.call(command("DBSIZE")).await
    }

    pub async fn flushdb(&self) -> RouterResult<()> {
        self.call(command("FLUSHDB")).await
    }

    pub async fn flushall(&self) -> RouterResult<()> {
        self.call(command("FLUSHALL")).await
    }

    /// Succeeds when every node answers.
    /// PING every node. A cluster with no nodes answers `PONG`.
    pub async fn ping(&self) -> RouterResult<String> {
        self.call(command("PING")).await
    }

    pub async fn save(&self) -> RouterResult<()> {
        self.call(command("SAVE")).await
    }

    pub async fn bgsave(&self) -> RouterResult<()> {
        self.call(command("BGSAVE")).await
    }

    pub async fn bgrewriteaof(&self) -> RouterResult<()> {
        self.call(command("BGREWRITEAOF")).await
    }

    pub async fn config_set(&self, name: &str, value: &str) -> RouterResult<()> {
        let cmd = command("CONFIG")
            .arg("SET")
            .arg_slice(name.as_bytes())
            .arg_slice(value.as_bytes());
        self.call(cmd).await
    }

    pub async fn config_resetstat(&self) -> RouterResult<()> {
        self.call(command("CONFIG").arg("RESETSTAT")).await
    }

    /// INFO from every node.
    pub async fn info(&self) -> NodeResults<String> {
        self.call_each(command("INFO")).await
    }

    /// One INFO section from every node.
    pub async fn info_section(&self, section: &str) -> NodeResults<String> {
        self.call_each(command("INFO").arg_slice(section.as_bytes()))
            .await
    }

    /// Server time of every node as `(seconds, microseconds)` strings.
    pub async fn time(&self) -> NodeResults<Vec<Bytes>> {
        self.call_each(command("TIME")).await
    }

    /// Last successful save of every node, in Unix seconds.
    pub async fn lastsave(&self) -> NodeResults<i64> {
        self.call_each(command("LASTSAVE")).await
    }

    pub async fn client_list(&self) -> NodeResults<String> {
        self.call_each(command("CLIENT").arg("LIST")).await
    }

    /// Matching configuration parameters of every node.
    pub async fn config_get(&self, pattern: &str) -> NodeResults<Vec<(Bytes, Bytes)>> {
        self.call_each(command("CONFIG").arg("GET").arg_slice(pattern.as_bytes()))
            .await
    }

    // Server, one node

    pub async fn flushdb_on(&self, node: &Node) -> RouterResult<()> {
        self.call_on(node, command("FLUSHDB")).await
    }

    pub async fn dbsize_on(&self, node: &Node) -> RouterResult<i64> {
        self.call_on(node, command("DBSIZE")).await
    }

    pub async fn keys_on(
        &self,
        node: &Node,
        pattern: impl AsRef<[u8]>,
    ) -> RouterResult<Vec<Bytes>> {
        self.call_on(node, command("KEYS").arg_slice(pattern.as_ref()))
            .await
    }

    pub async fn randomkey_on(&self, node: &Node) -> RouterResult<Option<Bytes>> {
        self.call_on(node, command("RANDOMKEY")).await
    }

    pub async fn ping_on(&self, node: &Node) -> RouterResult<String> {
        self.call_on(node, command("PING")).await
    }

    pub async fn info_on(&self, node: &Node) -> RouterResult<String> {
        self.call_on(node, command("INFO")).await
    }

    pub async fn client_list_on(&self, node: &Node) -> RouterResult<String> {
        self.call_on(node, command("CLIENT").arg("LIST")).await
    }
}

fn pairs_command<K: AsRef<[u8]>, V: AsRef<[u8]>>(name: &str, pairs: &[(K, V)]) -> RedisCommand {
    let mut cmd = command(name);
    for (key, value) in pairs {
        cmd = cmd.arg_slice(key.as_ref()).arg_slice(value.as_ref());
    }
    cmd
}

fn range_command(name: &str, key: &[u8], start: i64, stop: i64) -> RedisCommand {
    command(name)
        .arg_slice(key)
        .arg_display(start)
        .arg_display(stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RedisValue {
        RedisValue::bulk_string(s)
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(bool::from_reply(RedisValue::integer(1)), Some(true));
        assert_eq!(bool::from_reply(RedisValue::ok()), Some(true));
        assert_eq!(bool::from_reply(RedisValue::Null), Some(false));
        assert_eq!(f64::from_reply(bulk("10.5")), Some(10.5));
        assert_eq!(Option::<f64>::from_reply(RedisValue::Null), Some(None));
        assert_eq!(i64::from_reply(bulk("1")), None);
        assert_eq!(<()>::from_reply(RedisValue::integer(1)), None);
    }

    #[test]
    fn test_collection_conversions() {
        let flat = RedisValue::array(vec![bulk("a"), bulk("1"), bulk("b"), bulk("2")]);
        let pairs = Vec::<(Bytes, f64)>::from_reply(flat).unwrap();
        assert_eq!(pairs, [(Bytes::from("a"), 1.0), (Bytes::from("b"), 2.0)]);

        let mixed = RedisValue::array(vec![bulk("a"), RedisValue::Null]);
        assert_eq!(
            Vec::<Option<Bytes>>::from_reply(mixed),
            Some(vec![Some(Bytes::from("a")), None])
        );

        let popped = RedisValue::array(vec![bulk("list"), bulk("v")]);
        assert_eq!(
            Option::<(Bytes, Bytes)>::from_reply(popped),
            Some(Some((Bytes::from("list"), Bytes::from("v"))))
        );
        assert_eq!(Vec::<(Bytes, Bytes)>::from_reply(RedisValue::array(vec![bulk("x")])), None);
    }

    #[test]
    fn test_convert_reports_command() {
        let err = convert::<i64>("DBSIZE", bulk("x")).unwrap_err();
        assert_eq!(
            err,
            RouterError::unexpected_reply("DBSIZE", "bulk string does not fit the command")
        );
    }
}
