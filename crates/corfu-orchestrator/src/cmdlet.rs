//! One-shot administrative cmdlets.
//!
//! A cmdlet runs in a throwaway container on the cluster network, is waited
//! on under a deadline, and is removed whatever the outcome.

use std::time::Duration;

use tracing::info;

use crate::backend::SharedRuntime;
use crate::config::ClusterConfig;
use crate::container::{RunSpec, VolumeMount};
use crate::deadline::{DeadlineGuard, BOOTSTRAP_DEADLINE, DEFAULT_DEADLINE};
use crate::error::{OrchestratorError, Result};
use crate::topology::{join_endpoints, Endpoint, Topology};

/// Where the bootstrap cmdlet sees the layout file.
pub const LAYOUT_MOUNT_PATH: &str = "/tmp/layout";

/// A prepared cmdlet invocation.
#[derive(Debug, Clone)]
pub struct Cmdlet {
    operation: &'static str,
    spec: RunSpec,
    deadline: Duration,
}

impl Cmdlet {
    /// Bootstraps the cluster with the topology's layout.
    pub fn bootstrap(config: &ClusterConfig, topology: &Topology) -> Self {
        let mount = VolumeMount::bind(topology.path().display().to_string(), LAYOUT_MOUNT_PATH).read_only();
        let spec = RunSpec::new(&config.image, &config.cmdlets.bootstrap)
            .shell(format!("corfu_bootstrap_cluster -l {}", LAYOUT_MOUNT_PATH))
            .network(&config.network.name)
            .volume(mount)
            .tty(true);

        Self {
            operation: "bootstrap",
            spec,
            deadline: BOOTSTRAP_DEADLINE,
        }
    }

    /// Queries the committed layout from the given layout servers.
    pub fn layout_query(config: &ClusterConfig, endpoints: &[Endpoint]) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(OrchestratorError::validation(
                "layout query needs at least one layout server endpoint",
            ));
        }

        let spec = RunSpec::new(&config.image, &config.cmdlets.layout_query)
            .shell(format!("corfu_layouts -c {} query", join_endpoints(endpoints)))
            .network(&config.network.name)
            .tty(true);

        Ok(Self {
            operation: "layout query",
            spec,
            deadline: DEFAULT_DEADLINE,
        })
    }

    /// Overrides the deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Returns the container name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Returns the run specification.
    pub fn spec(&self) -> &RunSpec {
        &self.spec
    }

    /// Returns the deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs the cmdlet to completion and returns its output.
    pub async fn run(&self, runtime: &SharedRuntime) -> Result<Vec<u8>> {
        info!(operation = self.operation, container = %self.spec.name, "Running cmdlet");

        let worker_runtime = runtime.clone();
        let spec = self.spec.clone();
        DeadlineGuard::new(self.operation, runtime.clone())
            .deadline(self.deadline)
            .cleanup_target(&self.spec.name)
            .run(async move { worker_runtime.run_to_completion(&spec).await })
            .await
    }
}
