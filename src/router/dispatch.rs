//! Command dispatch.
//!
//! [`ClusterRouter::execute`] tags a command with the command table and
//! takes one of four paths:
//!
//! - single-key: slot of argument 0, owner from the topology, forwarded
//!   unchanged over a pooled connection
//! - multi-key: every key must share one slot, otherwise the request fails
//!   with `CrossSlot` before anything is sent
//! - fan-out: sent to every node concurrently, one task per node, and merged
//!   with the command's aggregation rule
//! - unsupported: rejected without consulting topology or any node

use super::aggregate::{reduce, NodeResults};
use super::command::{classify, Route};
use crate::cluster::node::Node;
use crate::cluster::slot::{common_slot, slot};
use crate::cluster::topology::TopologyRegistry;
use crate::core::error::{NodeError, RouterError, RouterResult};
use crate::node::NodeConnectionPool;
use crate::protocol::{RedisCommand, RedisValue};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Router configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Deadline for a fan-out (and for node-scoped requests). Nodes that
    /// have not answered by then are recorded as timed out. `None` waits
    /// for every node.
    pub fanout_timeout: Option<Duration>,
}

/// Routes commands across the cluster.
pub struct ClusterRouter {
    registry: Arc<TopologyRegistry>,
    pool: Arc<NodeConnectionPool>,
    config: RouterConfig,
}

impl ClusterRouter {
    /// Create a router over a topology registry and connection pool.
    pub fn new(
        registry: Arc<TopologyRegistry>,
        pool: Arc<NodeConnectionPool>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            pool,
            config,
        }
    }

    /// Topology registry commands are routed with.
    pub fn registry(&self) -> &Arc<TopologyRegistry> {
        &self.registry
    }

    /// Connection pool shared by every request.
    pub fn pool(&self) -> &Arc<NodeConnectionPool> {
        &self.pool
    }

    /// Router settings.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Execute a command on whichever nodes its tag selects.
    pub async fn execute(&self, cmd: &RedisCommand) -> RouterResult<RedisValue> {
        match classify(cmd)? {
            Route::SingleKey => {
                let slot = slot(&cmd.args[0]);
                self.execute_on_slot(slot, cmd).await
            }
            Route::MultiKey(spec) => {
                let keys = spec.keys(cmd)?;
                match common_slot(&keys) {
                    Ok(Some(slot)) => self.execute_on_slot(slot, cmd).await,
                    Ok(None) => Err(RouterError::invalid(format!(
                        "{} requires at least one key",
                        cmd.name
                    ))),
                    Err(keys) => {
                        let count = keys.len();
                        tracing::debug!(command = %cmd.name, keys = count, "cross-slot request");
                        Err(RouterError::cross_slot(keys))
                    }
                }
            }
            Route::FanOut(aggregation) => {
                let results = self.fan_out(cmd).await;
                // a cluster without nodes still answers PING like a lone node
                if results.is_empty() && cmd.name == "PING" {
                    return Ok(RedisValue::pong());
                }
                reduce(aggregation, results)
            }
            Route::Unsupported(reason) => Err(RouterError::unsupported(cmd.name.clone(), reason)),
        }
    }

    /// Execute a cluster-wide command on one node only.
    ///
    /// The address must belong to the current topology. The node's own
    /// reply is returned without aggregation.
    pub async fn execute_on_node(
        &self,
        address: &Node,
        cmd: &RedisCommand,
    ) -> RouterResult<RedisValue> {
        match classify(cmd)? {
            Route::FanOut(_) => {}
            Route::Unsupported(reason) => {
                return Err(RouterError::unsupported(cmd.name.clone(), reason));
            }
            Route::SingleKey | Route::MultiKey(_) => {
                return Err(RouterError::invalid(format!(
                    "{} is routed by key and cannot target a node",
                    cmd.name
                )));
            }
        }

        let node = self
            .registry
            .node_matching_address(address.host(), address.port())?;
        tracing::debug!(command = %cmd.name, node = %node, "node-scoped request");

        let started = Instant::now();
        let request = self.pool.execute(&node, cmd);
        match self.config.fanout_timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.map_err(|_| {
                RouterError::Timeout {
                    node: node.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            })?,
            None => request.await,
        }
    }

    /// Send a command to every node in the current topology.
    pub async fn fan_out(&self, cmd: &RedisCommand) -> NodeResults<RedisValue> {
        let nodes = self.registry.all_nodes();
        self.fan_out_to(nodes, cmd).await
    }

    /// Send a command to each of `nodes` concurrently.
    ///
    /// Every node gets an entry: its reply, its failure, or a `Timeout` if
    /// the deadline passed first. Tasks still running at the deadline are
    /// aborted, and dropping the returned future aborts all of them.
    pub async fn fan_out_to(
        &self,
        nodes: BTreeSet<Node>,
        cmd: &RedisCommand,
    ) -> NodeResults<RedisValue> {
        let started = Instant::now();
        let deadline = self.config.fanout_timeout.map(|limit| started + limit);

        let mut tasks = JoinSet::new();
        for node in nodes.iter().cloned() {
            let pool = self.pool.clone();
            let cmd = cmd.clone();
            tasks.spawn(async move {
                let result = pool.execute(&node, &cmd).await;
                (node, result)
            });
        }

        let mut results = NodeResults::new();
        let mut timed_out = false;
        loop {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tasks.abort_all();
                            timed_out = true;
                            break;
                        }
                    }
                }
                None => tasks.join_next().await,
            };

            match next {
                Some(Ok((node, result))) => {
                    if let Err(e) = &result {
                        tracing::warn!(
                            command = %cmd.name,
                            node = %node,
                            error = %e,
                            "fan-out node failed"
                        );
                    }
                    results.insert(node, result);
                }
                Some(Err(e)) => {
                    tracing::warn!(command = %cmd.name, error = %e, "fan-out task failed");
                }
                None => break,
            }
        }

        // Nodes without an entry either missed the deadline or their task died.
        let elapsed_ms = started.elapsed().as_millis() as u64;
        for node in nodes {
            if results.contains(&node) {
                continue;
            }
            let failure = if timed_out {
                tracing::warn!(command = %cmd.name, node = %node, elapsed_ms, "node timed out");
                RouterError::Timeout {
                    node: node.clone(),
                    elapsed_ms,
                }
            } else {
                RouterError::node_failure(
                    node.clone(),
                    NodeError::transport("request task failed"),
                )
            };
            results.insert(node, Err(failure));
        }

        tracing::debug!(
            command = %cmd.name,
            nodes = results.len(),
            failures = results.failures().count(),
            elapsed_ms,
            "fan-out complete"
        );
        results
    }

    async fn execute_on_slot(&self, slot: u16, cmd: &RedisCommand) -> RouterResult<RedisValue> {
        let node = self.registry.node_for_slot(slot)?;
        tracing::debug!(command = %cmd.name, slot, node = %node, "routing command");
        self.pool.execute(&node, cmd).await
    }
}

impl std::fmt::Debug for ClusterRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRouter")
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish()
    }
}
