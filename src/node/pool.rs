//! Per-node connection pool.
//!
//! Each node gets its own slot holding idle connections and a semaphore that
//! bounds how many connections to that node are checked out at once. With
//! the default bound of 1, requests to a node are serialized over a single
//! reused connection.
//!
//! The node map lock is held only to find or insert a node's slot. Waiting
//! for a permit and connecting happen outside it, so nodes never contend
//! with each other.

use crate::cluster::node::Node;
use crate::core::error::{NodeError, RouterError, RouterResult};
use crate::node::{NodeConnection, NodeConnector};
use crate::protocol::{RedisCommand, RedisValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections checked out per node.
    pub max_connections_per_node: usize,

    /// Bound on establishing one connection.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_node: 1,
            connect_timeout: Duration::from_secs(1),
        }
    }
}

struct NodeSlot {
    idle: Mutex<Vec<Box<dyn NodeConnection>>>,
    permits: Arc<Semaphore>,
}

impl NodeSlot {
    fn new(max_connections: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
        }
    }
}

/// Pool statistics.
#[derive(Debug, Default)]
struct PoolStats {
    connects: AtomicU64,
    reuses: AtomicU64,
    discards: AtomicU64,
}

/// Reusable connections keyed by node.
pub struct NodeConnectionPool {
    connector: Arc<dyn NodeConnector>,
    config: PoolConfig,
    slots: Mutex<HashMap<Node, Arc<NodeSlot>>>,
    closed: Arc<AtomicBool>,
    stats: PoolStats,
}

impl NodeConnectionPool {
    /// Create a pool.
    pub fn new(connector: Arc<dyn NodeConnector>, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            slots: Mutex::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
            stats: PoolStats::default(),
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn slot(&self, node: &Node) -> Arc<NodeSlot> {
        self.slots
            .lock()
            .entry(node.clone())
            .or_insert_with(|| Arc::new(NodeSlot::new(self.config.max_connections_per_node)))
            .clone()
    }

    /// Check out a connection to a node.
    ///
    /// Waits for a free per-node permit, then reuses an idle healthy
    /// connection or opens a new one.
    pub async fn acquire(&self, node: &Node) -> RouterResult<PooledConnection> {
        if self.is_closed() {
            return Err(RouterError::PoolClosed);
        }

        let slot = self.slot(node);
        let permit = slot
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RouterError::PoolClosed)?;

        // close() may have run while we waited
        if self.is_closed() {
            return Err(RouterError::PoolClosed);
        }

        let reused = loop {
            let candidate = slot.idle.lock().pop();
            match candidate {
                Some(conn) if conn.is_healthy() => break Some(conn),
                Some(_) => {
                    self.stats.discards.fetch_add(1, Ordering::Relaxed);
                }
                None => break None,
            }
        };

        let conn = match reused {
            Some(conn) => {
                self.stats.reuses.fetch_add(1, Ordering::Relaxed);
                conn
            }
            None => self.connect(node).await?,
        };

        Ok(PooledConnection {
            node: node.clone(),
            conn: Some(conn),
            slot,
            closed: self.closed.clone(),
            _permit: permit,
        })
    }

    async fn connect(&self, node: &Node) -> RouterResult<Box<dyn NodeConnection>> {
        let timeout = self.config.connect_timeout;
        let conn = match tokio::time::timeout(timeout, self.connector.connect(node)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                tracing::warn!(node = %node, error = %e, "connect failed");
                return Err(RouterError::node_failure(node.clone(), e));
            }
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!(node = %node, timeout_ms, "connect timed out");
                return Err(RouterError::node_failure(
                    node.clone(),
                    NodeError::transport(format!("connect timed out after {:?}", timeout)),
                ));
            }
        };

        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(node = %node, "opened node connection");
        Ok(conn)
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Acquire, execute one command, release.
    pub async fn execute(&self, node: &Node, cmd: &RedisCommand) -> RouterResult<RedisValue> {
        let mut conn = self.acquire(node).await?;
        conn.execute(cmd)
            .await
            .map_err(|e| RouterError::node_failure(node.clone(), e))
    }

    /// Close every idle connection and refuse further acquires.
    ///
    /// Connections checked out at this point are discarded when released.
    /// Calling `close` again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let slots: Vec<(Node, Arc<NodeSlot>)> = self.slots.lock().drain().collect();
        let mut closed = 0usize;
        for (node, slot) in slots {
            slot.permits.close();
            let idle: Vec<_> = slot.idle.lock().drain(..).collect();
            for mut conn in idle {
                if let Err(e) = conn.close().await {
                    tracing::debug!(node = %node, error = %e, "error closing connection");
                }
                closed += 1;
            }
        }

        tracing::info!(closed, "connection pool closed");
    }

    /// Idle connections currently held for a node.
    pub fn idle_count(&self, node: &Node) -> usize {
        self.slots
            .lock()
            .get(node)
            .map(|slot| slot.idle.lock().len())
            .unwrap_or(0)
    }

    /// Connections opened over the pool's lifetime.
    pub fn connects(&self) -> u64 {
        self.stats.connects.load(Ordering::Relaxed)
    }

    /// Acquires served from an idle connection.
    pub fn reuses(&self) -> u64 {
        self.stats.reuses.load(Ordering::Relaxed)
    }

    /// Idle connections dropped because they were unhealthy.
    pub fn discards(&self) -> u64 {
        self.stats.discards.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for NodeConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnectionPool")
            .field("config", &self.config)
            .field("nodes", &self.slots.lock().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A checked-out connection.
///
/// Dropping it returns the connection to its node's idle list if it is
/// still healthy and the pool is open.
pub struct PooledConnection {
    node: Node,
    conn: Option<Box<dyn NodeConnection>>,
    slot: Arc<NodeSlot>,
    closed: Arc<AtomicBool>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("node", &self.node)
            .field("has_conn", &self.conn.is_some())
            .finish()
    }
}

impl PooledConnection {
    /// Node this connection belongs to.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Send a command on this connection.
    ///
    /// The connection is held by the request while it runs, so a request
    /// cancelled midway drops it instead of returning it to the pool.
    pub async fn execute(&mut self, cmd: &RedisCommand) -> Result<RedisValue, NodeError> {
        let mut conn = self.conn.take().ok_or(NodeError::Closed)?;
        let result = conn.execute(cmd).await;
        match &result {
            Err(e) if !e.connection_reusable() => {
                tracing::debug!(node = %self.node, error = %e, "discarding broken connection");
            }
            _ => self.conn = Some(conn),
        }
        result
    }

    /// Whether the underlying connection can still be used.
    pub fn is_healthy(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| c.is_healthy())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.is_healthy() && !self.closed.load(Ordering::Acquire) {
                self.slot.idle.lock().push(conn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::memory::MemoryConnector;

    fn setup(max: usize) -> (Arc<MemoryConnector>, NodeConnectionPool, Node) {
        let node = Node::new("127.0.0.1", 7000);
        let connector = Arc::new(MemoryConnector::new());
        connector.add_node(node.clone());
        let pool = NodeConnectionPool::new(
            connector.clone(),
            PoolConfig {
                max_connections_per_node: max,
                ..Default::default()
            },
        );
        (connector, pool, node)
    }

    #[tokio::test]
    async fn test_connection_reused() {
        let (connector, pool, node) = setup(1);
        let ping = RedisCommand::named("PING");

        for _ in 0..5 {
            assert_eq!(pool.execute(&node, &ping).await.unwrap(), RedisValue::pong());
        }

        assert_eq!(pool.connects(), 1);
        assert_eq!(pool.reuses(), 4);
        assert_eq!(connector.connect_count(&node), 1);
        assert_eq!(pool.idle_count(&node), 1);
    }

    #[tokio::test]
    async fn test_unknown_node_fails() {
        let (_connector, pool, _node) = setup(1);
        let other = Node::new("127.0.0.1", 9999);
        let err = pool.acquire(&other).await.unwrap_err();
        assert!(matches!(err, RouterError::NodeFailure { ref node, .. } if *node == other));
    }

    #[tokio::test]
    async fn test_broken_connection_replaced() {
        let (connector, pool, node) = setup(1);
        let ping = RedisCommand::named("PING");
        pool.execute(&node, &ping).await.unwrap();

        connector.disconnect(&node);
        assert!(pool.execute(&node, &ping).await.is_err());
        assert_eq!(pool.idle_count(&node), 0);

        connector.restore(&node);
        pool.execute(&node, &ping).await.unwrap();
        assert_eq!(pool.connects(), 2);
    }

    #[tokio::test]
    async fn test_server_error_keeps_connection() {
        let (_connector, pool, node) = setup(1);
        let bad = RedisCommand::named("INCR").arg("k");
        pool.execute(&node, &RedisCommand::named("SET").arg("k").arg("v"))
            .await
            .unwrap();
        assert!(pool.execute(&node, &bad).await.is_err());
        assert_eq!(pool.idle_count(&node), 1);
        assert_eq!(pool.connects(), 1);
    }

    #[tokio::test]
    async fn test_per_node_bound() {
        let (_connector, pool, node) = setup(1);
        let held = pool.acquire(&node).await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(50), pool.acquire(&node)).await;
        assert!(second.is_err(), "second acquire should wait for the permit");

        pool.release(held);
        let again = tokio::time::timeout(Duration::from_millis(500), pool.acquire(&node)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_connector, pool, node) = setup(2);
        pool.execute(&node, &RedisCommand::named("PING")).await.unwrap();

        pool.close().await;
        pool.close().await;

        assert!(pool.is_closed());
        assert!(matches!(
            pool.acquire(&node).await,
            Err(RouterError::PoolClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_drops_connection() {
        let (connector, pool, node) = setup(1);
        let ping = RedisCommand::named("PING");
        pool.execute(&node, &ping).await.unwrap();

        connector.set_latency(&node, Duration::from_secs(10));
        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), pool.execute(&node, &ping)).await;
        assert!(cancelled.is_err());
        assert_eq!(pool.idle_count(&node), 0);

        connector.restore(&node);
        pool.execute(&node, &ping).await.unwrap();
        assert_eq!(pool.connects(), 2);
    }

    #[tokio::test]
    async fn test_checked_out_connection_discarded_after_close() {
        let (_connector, pool, node) = setup(1);
        let conn = pool.acquire(&node).await.unwrap();
        pool.close().await;
        drop(conn);
        assert_eq!(pool.idle_count(&node), 0);
    }
}
