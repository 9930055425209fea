//! Container orchestration for Corfu log-server clusters.
//!
//! This crate provisions, bootstraps, queries and tears down a fleet of
//! Corfu servers, one container per endpoint of a cluster layout. The
//! servers themselves are opaque: the crate only manages the containers they
//! run in and the one-shot administrative tools shipped in the same image.
//!
//! # Overview
//!
//! The orchestrator handles:
//! - **Network provisioning**: a bridge network with a fixed address pool, so
//!   every node gets the address the layout declares for it
//! - **Node lifecycle**: spawning, pausing, stopping and removing node
//!   containers, all idempotent and addressed by name
//! - **Cmdlets**: bootstrap and layout query, each run in a throwaway
//!   container under a deadline
//! - **Fan-out**: node-level work runs on a bounded worker pool, one phase at
//!   a time
//!
//! # Architecture
//!
//! - [`backend`]: the container runtime trait, a Docker implementation and an
//!   in-memory implementation
//! - [`topology`]: endpoints, layout documents and the cluster network
//! - [`container`]: container handles, states and run specifications
//! - [`node`]: one node's container
//! - [`deadline`]: deadline-guarded execution with forced cleanup
//! - [`pool`]: the bounded worker pool
//! - [`cmdlet`]: bootstrap and layout query invocations
//! - [`cluster`]: the cluster lifecycle
//! - [`config`]: cluster configuration
//! - [`error`]: error types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use corfu_orchestrator::{Cluster, ClusterConfig, DockerRuntime, Topology};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Arc::new(DockerRuntime::connect().await?);
//!     let topology = Topology::from_file("layout.json")?;
//!
//!     let mut cluster = Cluster::connect(topology, runtime, ClusterConfig::default()).await?;
//!     let nodes = cluster.setup().await?;
//!
//!     let layout = cluster.committed_layout().await?;
//!     println!("epoch {:?}", layout.epoch);
//!
//!     let listing = nodes[0].execute_command("ls -la /var/corfu/").await?;
//!     println!("{}", String::from_utf8_lossy(&listing));
//!
//!     cluster.destroy().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod cluster;
pub mod cmdlet;
pub mod config;
pub mod container;
pub mod deadline;
pub mod error;
pub mod node;
pub mod pool;
pub mod topology;

// Re-export commonly used types at the crate root
pub use backend::{ContainerRuntime, DockerRuntime, ExecOutput, SharedRuntime};
#[cfg(any(test, feature = "test-util"))]
pub use backend::InMemoryRuntime;
pub use cluster::{Cluster, ClusterPhase, NodeStatus};
pub use config::ClusterConfig;
pub use container::{ContainerHandle, ContainerState};
pub use deadline::{run_with_deadline, DeadlineGuard};
pub use error::{OrchestratorError, Result};
pub use node::{Node, NodeConfig};
pub use pool::WorkerPool;
pub use topology::{Endpoint, Layout, NetworkSpec, Topology};
