//! Cluster orchestration.
//!
//! A [`Cluster`] drives one topology through its lifecycle:
//!
//! ```text
//! Unprovisioned -> NetworkReady -> NodesSpawned -> Bootstrapped -> Destroyed
//! ```
//!
//! Node-level work fans out over the cluster's [`WorkerPool`]; every phase
//! waits for all of its jobs before the next one starts. The two cmdlets
//! run under deadlines.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{NetworkHandle, SharedRuntime};
use crate::cmdlet::Cmdlet;
use crate::config::ClusterConfig;
use crate::container::ContainerState;
use crate::error::{OrchestratorError, Result};
use crate::node::{Node, NodeConfig};
use crate::pool::WorkerPool;
use crate::topology::{ensure_network, parse_layout_output, Endpoint, Layout, Topology};

/// Lifecycle phase of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterPhase {
    /// The network has not been provisioned yet.
    Unprovisioned,

    /// The network exists.
    NetworkReady,

    /// A container exists for every endpoint.
    NodesSpawned,

    /// The bootstrap cmdlet committed the layout.
    Bootstrapped,

    /// Every node container was removed.
    Destroyed,
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unprovisioned => "unprovisioned",
            Self::NetworkReady => "network_ready",
            Self::NodesSpawned => "nodes_spawned",
            Self::Bootstrapped => "bootstrapped",
            Self::Destroyed => "destroyed",
        };
        write!(f, "{}", name)
    }
}

/// Live status of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    /// The node's endpoint.
    pub endpoint: Endpoint,

    /// The node's container name.
    pub container: String,

    /// Container state, `None` when there is no container.
    pub state: Option<ContainerState>,
}

/// A Corfu cluster described by one topology.
pub struct Cluster {
    topology: Topology,
    config: ClusterConfig,
    runtime: SharedRuntime,
    pool: WorkerPool,
    network: Option<NetworkHandle>,
    phase: ClusterPhase,
    query_deadline: Duration,
    bootstrap_deadline: Duration,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("topology", &self.topology.path())
            .field("runtime", &self.runtime.name())
            .field("workers", &self.pool.size())
            .field("phase", &self.phase)
            .finish()
    }
}

impl Cluster {
    /// Creates a cluster without touching the runtime.
    pub fn new(topology: Topology, runtime: SharedRuntime, config: ClusterConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            pool: WorkerPool::new(config.workers),
            query_deadline: config.timeouts.query(),
            bootstrap_deadline: config.timeouts.bootstrap(),
            topology,
            config,
            runtime,
            network: None,
            phase: ClusterPhase::Unprovisioned,
        })
    }

    /// Creates a cluster and provisions its network.
    pub async fn connect(topology: Topology, runtime: SharedRuntime, config: ClusterConfig) -> Result<Self> {
        let mut cluster = Self::new(topology, runtime, config)?;
        cluster.provision_network().await?;
        Ok(cluster)
    }

    /// Overrides the cmdlet deadlines taken from the configuration.
    pub fn with_deadlines(mut self, query: Duration, bootstrap: Duration) -> Self {
        self.query_deadline = query;
        self.bootstrap_deadline = bootstrap;
        self
    }

    /// Returns the current phase.
    pub fn phase(&self) -> ClusterPhase {
        self.phase
    }

    /// Returns the topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Returns the network, once provisioned.
    pub fn network(&self) -> Option<&NetworkHandle> {
        self.network.as_ref()
    }

    /// Makes sure the cluster network exists.
    pub async fn provision_network(&mut self) -> Result<&NetworkHandle> {
        let network = ensure_network(self.runtime.as_ref(), &self.config.network).await?;
        if self.phase == ClusterPhase::Unprovisioned {
            self.phase = ClusterPhase::NetworkReady;
        }
        Ok(&*self.network.insert(network))
    }

    /// Builds a node object for every endpoint of the topology.
    pub fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self
            .topology
            .endpoints()?
            .into_iter()
            .map(|endpoint| self.make_node(endpoint))
            .collect())
    }

    /// Returns the node serving `endpoint`, if it is part of the topology.
    pub fn node(&self, endpoint: &Endpoint) -> Result<Option<Node>> {
        Ok(self
            .topology
            .endpoints()?
            .into_iter()
            .find(|candidate| candidate == endpoint)
            .map(|endpoint| self.make_node(endpoint)))
    }

    fn make_node(&self, endpoint: Endpoint) -> Node {
        Node::new(NodeConfig::from_cluster(endpoint, &self.config), self.runtime.clone())
    }

    /// Spawns every node, then bootstraps the cluster.
    ///
    /// Nodes whose container already exists are kept as they are. The
    /// returned list covers every endpoint of the topology. If any spawn
    /// fails, the others still run to completion and the first error is
    /// returned without bootstrapping.
    pub async fn setup(&mut self) -> Result<Vec<Node>> {
        if self.network.is_none() {
            self.provision_network().await?;
        }

        let nodes = self.nodes()?;
        if nodes.is_empty() {
            info!(topology = %self.topology.path().display(), "Topology has no endpoints");
            return Ok(nodes);
        }
        info!(nodes = nodes.len(), workers = self.pool.size(), "Spawning nodes");

        let jobs = nodes.iter().cloned().map(|node| async move {
            let created = node.create().await?;
            Ok::<_, OrchestratorError>(created.is_some())
        });
        let results = self.pool.run_all(jobs).await;

        let mut spawned = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(true) => spawned += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to spawn node");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.phase = ClusterPhase::NodesSpawned;
        info!(spawned, existing = nodes.len() - spawned, "Nodes ready");

        self.bootstrap().await?;
        Ok(nodes)
    }

    /// Runs the bootstrap cmdlet against the topology.
    pub async fn bootstrap(&mut self) -> Result<()> {
        let output = Cmdlet::bootstrap(&self.config, &self.topology)
            .with_deadline(self.bootstrap_deadline)
            .run(&self.runtime)
            .await?;
        debug!(output = %String::from_utf8_lossy(&output), "Bootstrap output");

        self.phase = ClusterPhase::Bootstrapped;
        info!(topology = %self.topology.path().display(), "Cluster bootstrapped");
        Ok(())
    }

    /// Queries the committed layout from the given layout servers.
    ///
    /// Querying an endpoint nobody answers on hangs until the query deadline
    /// fires.
    pub async fn get_layout(&self, endpoints: &[Endpoint]) -> Result<Layout> {
        let output = Cmdlet::layout_query(&self.config, endpoints)?
            .with_deadline(self.query_deadline)
            .run(&self.runtime)
            .await?;
        parse_layout_output(&output)
    }

    /// Queries the committed layout from the topology's layout servers.
    pub async fn committed_layout(&self) -> Result<Layout> {
        let endpoints = self.topology.layout().layout_server_endpoints()?;
        self.get_layout(&endpoints).await
    }

    /// Removes the container of every node.
    ///
    /// Endpoints without a container are skipped. The network is left in
    /// place for the next cluster.
    pub async fn destroy(&mut self) -> Result<()> {
        let mut existing = Vec::new();
        for node in self.nodes()? {
            if node.exists().await?.is_some() {
                existing.push(node);
            } else {
                debug!(container = %node.name(), "No container, skipping");
            }
        }

        info!(nodes = existing.len(), "Removing nodes");
        let jobs = existing.into_iter().map(|node| async move { node.remove().await });
        let results = self.pool.run_all(jobs).await;

        if let Some(e) = results.into_iter().find_map(|r| r.err()) {
            return Err(e);
        }

        self.phase = ClusterPhase::Destroyed;
        info!("Cluster destroyed");
        Ok(())
    }

    /// Reports the live state of every node.
    pub async fn status(&self) -> Result<Vec<NodeStatus>> {
        let mut statuses = Vec::new();
        for node in self.nodes()? {
            statuses.push(NodeStatus {
                state: node.state().await?,
                container: node.name().to_string(),
                endpoint: node.endpoint().clone(),
            });
        }
        Ok(statuses)
    }
}
