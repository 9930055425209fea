//! Container runtime trait definition.
//!
//! The orchestrator talks to the container runtime only through this trait.
//! Every call addresses its container or network by name, so callers never
//! hold on to runtime state between calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::container::{ContainerHandle, RunSpec};
use crate::error::Result;
use crate::topology::NetworkSpec;

/// Narrow interface to a container runtime.
///
/// # Error contract
///
/// - Absence of the named container or network is reported as
///   `ContainerNotFound` / `NetworkNotFound`.
/// - A create call whose name is already taken reports `AlreadyExists`.
/// - Anything else is a runtime failure and is passed through unchanged.
///
/// # Thread Safety
///
/// Implementations are shared between the workers of a cluster as
/// `Arc<dyn ContainerRuntime>`. Calls are individually atomic from the
/// orchestrator's point of view; no locking happens on this side.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the name of this runtime.
    fn name(&self) -> &str;

    /// Inspects a container by name.
    async fn inspect(&self, name: &str) -> Result<ContainerHandle>;

    /// Creates and starts a container that keeps running after the call.
    async fn run_detached(&self, spec: &RunSpec) -> Result<ContainerHandle>;

    /// Runs a one-shot container to completion and returns its output.
    ///
    /// The container is removed afterwards whatever the outcome. A non-zero
    /// exit status is reported as `CmdletFailed`.
    async fn run_to_completion(&self, spec: &RunSpec) -> Result<Vec<u8>>;

    /// Attaches a container to a network with a fixed IPv4 address.
    async fn connect_network(&self, network: &str, container: &str, ipv4_address: &str) -> Result<()>;

    /// Runs a command inside a running container.
    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput>;

    /// Pauses a container.
    async fn pause(&self, name: &str) -> Result<()>;

    /// Unpauses a container.
    async fn unpause(&self, name: &str) -> Result<()>;

    /// Starts a stopped container.
    async fn start(&self, name: &str) -> Result<()>;

    /// Kills a container's main process.
    async fn kill(&self, name: &str) -> Result<()>;

    /// Removes a container.
    async fn remove(&self, name: &str, force: bool) -> Result<()>;

    /// Copies a path out of a container as a tar archive.
    async fn copy_from(&self, name: &str, path: &str) -> Result<Vec<u8>>;

    /// Inspects a network by name.
    async fn inspect_network(&self, name: &str) -> Result<NetworkHandle>;

    /// Creates a network.
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkHandle>;
}

/// Snapshot of a network as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHandle {
    /// Network ID assigned by the runtime.
    pub id: String,

    /// Network name.
    pub name: String,
}

impl NetworkHandle {
    /// Creates a new network handle.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Output from executing a command in a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: Vec<u8>,

    /// Standard error from the command.
    pub stderr: Vec<u8>,

    /// Exit code of the command.
    pub exit_code: i64,
}

impl ExecOutput {
    /// Creates a new exec output.
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, exit_code: i64) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout followed by stderr.
    pub fn combined_output(&self) -> Vec<u8> {
        let mut out = self.stdout.clone();
        out.extend_from_slice(&self.stderr);
        out
    }
}

/// A shared container runtime.
pub type SharedRuntime = std::sync::Arc<dyn ContainerRuntime>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_output() {
        let output = ExecOutput::new("total 0\n", "", 0);
        assert!(output.success());
        assert_eq!(output.combined_output(), b"total 0\n");

        let output = ExecOutput::new("", "ls: /nope: No such file", 1);
        assert!(!output.success());
        assert_eq!(output.combined_output(), b"ls: /nope: No such file");
    }

    #[test]
    fn test_exec_output_combined() {
        let output = ExecOutput::new("out", "err", 0);
        assert_eq!(output.combined_output(), b"outerr");
    }
}
