//! Main runtime orchestration.
//!
//! The runtime wires configuration into the routing stack:
//! - Start order: membership → topology registry → connection pool → router
//!   → background topology refresh
//! - Shutdown order: refresh task → connection pool

use crate::cluster::membership::{ClusterSlotsMembership, MembershipSource, StaticMembership};
use crate::cluster::topology::TopologyRegistry;
use crate::core::config::{Config, Discovery};
use crate::node::{NodeConnectionPool, NodeConnector, TcpConnector};
use crate::router::{ClusterConnection, ClusterRouter};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is degraded but functional.
    Degraded,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Topology registry health. Degraded while slots lack an owner.
    pub topology: ComponentHealth,
    /// Connection pool health.
    pub pool: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            topology: ComponentHealth::Starting,
            pool: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to route requests.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.topology, self.pool),
            (
                ComponentHealth::Healthy | ComponentHealth::Degraded,
                ComponentHealth::Healthy
            )
        )
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        self.topology != ComponentHealth::Failed && self.pool != ComponentHealth::Failed
    }
}

/// Trellis runtime holding the routing components.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Opens connections for the pool and for discovery.
    connector: Arc<dyn NodeConnector>,

    registry: Option<Arc<TopologyRegistry>>,
    pool: Option<Arc<NodeConnectionPool>>,
    router: Option<Arc<ClusterRouter>>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Background refresh task handle.
    refresh_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Create a runtime that reaches nodes over TCP.
    pub fn new(config: Config) -> Result<Self> {
        let connector = Arc::new(TcpConnector::new(config.io_timeout()));
        Self::with_connector(config, connector)
    }

    /// Create a runtime with a custom connector.
    pub fn with_connector(config: Config, connector: Arc<dyn NodeConnector>) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config: Arc::new(config),
            connector,
            registry: None,
            pool: None,
            router: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            refresh_handle: None,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to route requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is alive.
    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Topology registry, once started.
    pub fn registry(&self) -> Option<&Arc<TopologyRegistry>> {
        self.registry.as_ref()
    }

    /// Router, once started.
    pub fn router(&self) -> Option<&Arc<ClusterRouter>> {
        self.router.as_ref()
    }

    /// Typed client over the router.
    pub fn connection(&self) -> Result<ClusterConnection> {
        let router = self
            .router
            .as_ref()
            .context("runtime has not been started")?;
        Ok(ClusterConnection::new(router.clone()))
    }

    /// Load the topology and build the routing stack.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            discovery = ?self.config.cluster.discovery,
            "starting Trellis runtime"
        );

        self.init_topology().await?;
        self.init_router();
        self.start_refresh();

        self.running.store(true, Ordering::Release);
        tracing::info!("Trellis runtime started");
        Ok(())
    }

    fn membership(&self) -> Result<Arc<dyn MembershipSource>> {
        Ok(match self.config.cluster.discovery {
            Discovery::Static => Arc::new(StaticMembership::new(self.config.slot_ranges()?)),
            Discovery::ClusterSlots => Arc::new(ClusterSlotsMembership::new(
                self.config.seed_nodes()?,
                self.connector.clone(),
            )),
        })
    }

    /// Load the first topology snapshot.
    async fn init_topology(&mut self) -> Result<()> {
        tracing::debug!("loading cluster topology");

        let registry = TopologyRegistry::new(
            self.membership()?,
            self.config.cluster.require_full_coverage,
        );
        if let Err(e) = registry.refresh().await {
            self.health.topology = ComponentHealth::Failed;
            return Err(e).context("failed to load cluster topology");
        }

        let snapshot = registry.snapshot();
        self.health.topology = if snapshot.is_complete() {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::Degraded
        };

        tracing::info!(
            epoch = snapshot.epoch(),
            nodes = snapshot.nodes().len(),
            "cluster topology loaded"
        );
        self.registry = Some(Arc::new(registry));
        Ok(())
    }

    /// Build the connection pool and router.
    fn init_router(&mut self) {
        let Some(registry) = self.registry.clone() else {
            return;
        };
        let pool = Arc::new(NodeConnectionPool::new(
            self.connector.clone(),
            self.config.pool_config(),
        ));
        self.router = Some(Arc::new(ClusterRouter::new(
            registry,
            pool.clone(),
            self.config.router_config(),
        )));
        self.pool = Some(pool);
        self.health.pool = ComponentHealth::Healthy;
    }

    /// Spawn the periodic topology refresh, if configured.
    fn start_refresh(&mut self) {
        let (Some(interval), Some(registry)) =
            (self.config.refresh_interval(), self.registry.clone())
        else {
            return;
        };
        let shutdown_rx = self.shutdown_rx.clone();
        self.refresh_handle = Some(tokio::spawn(refresh_loop(registry, interval, shutdown_rx)));
        tracing::info!(interval_secs = interval.as_secs(), "topology refresh started");
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for shutdown signal.
    pub async fn wait_for_shutdown(&mut self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run the runtime until SIGINT or a shutdown request.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop the refresh task and close the pool.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping Trellis runtime");
        self.running.store(false, Ordering::Release);

        // Signal shutdown to all components
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.refresh_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => tracing::debug!("topology refresh stopped"),
                Ok(Err(e)) => tracing::warn!(error = %e, "topology refresh task panicked"),
                Err(_) => tracing::warn!("topology refresh stop timed out"),
            }
        }

        if let Some(pool) = self.pool.as_ref() {
            self.health.pool = ComponentHealth::Stopping;
            pool.close().await;
        }
        self.health.pool = ComponentHealth::Stopped;
        self.health.topology = ComponentHealth::Stopped;

        tracing::info!("Trellis runtime stopped");
        Ok(())
    }
}

/// Refresh the topology every `interval` until shutdown.
///
/// Failures keep the previous snapshot; the registry logs them.
async fn refresh_loop(
    registry: Arc<TopologyRegistry>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = registry.refresh().await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
