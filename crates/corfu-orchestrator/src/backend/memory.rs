//! In-memory container runtime.
//!
//! Models just enough of a container runtime to drive the orchestrator end
//! to end without a daemon: unique names, running/paused/exited states,
//! networks with static addresses, and scriptable one-shot containers. Every
//! call is counted so tests can assert on what the orchestrator asked for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::r#trait::{ContainerRuntime, ExecOutput, NetworkHandle};
use crate::container::{ContainerHandle, ContainerState, RunSpec};
use crate::error::{OrchestratorError, Result};
use crate::topology::NetworkSpec;

/// How a one-shot container behaves when run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdletBehavior {
    /// Exits 0 after printing the given bytes.
    Output(Vec<u8>),

    /// Exits 0 after the delay, printing the given bytes.
    Delayed(Duration, Vec<u8>),

    /// Exits with the given non-zero status.
    Fail {
        /// Exit status.
        exit_code: i64,
        /// Output printed before exiting.
        output: Vec<u8>,
    },

    /// Never exits.
    Hang,
}

impl Default for CmdletBehavior {
    fn default() -> Self {
        Self::Output(Vec::new())
    }
}

/// A container known to the in-memory runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContainer {
    /// Current handle.
    pub handle: ContainerHandle,

    /// The spec it was created from.
    pub spec: RunSpec,

    /// Networks joined after creation, with the static address used.
    pub networks: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    containers: HashMap<String, MemoryContainer>,
    networks: HashMap<String, (NetworkHandle, NetworkSpec)>,
    calls: HashMap<&'static str, usize>,
    cmdlets: HashMap<String, CmdletBehavior>,
    files: HashMap<(String, String), Vec<u8>>,
    run_failures: HashMap<String, String>,
    network_failure: Option<String>,
    next_id: u64,
}

impl MemoryState {
    fn record(&mut self, operation: &'static str) {
        *self.calls.entry(operation).or_insert(0) += 1;
    }

    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:064x}", self.next_id)
    }

    fn container_mut(&mut self, name: &str) -> Result<&mut MemoryContainer> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| OrchestratorError::container_not_found(name))
    }

    fn register(&mut self, spec: &RunSpec) -> Result<ContainerHandle> {
        if self.containers.contains_key(&spec.name) {
            return Err(OrchestratorError::already_exists(&spec.name));
        }
        if let Some(network) = &spec.network {
            if !self.networks.contains_key(network) {
                return Err(OrchestratorError::network_not_found(network));
            }
        }

        let handle = ContainerHandle::new(self.next_id(), &spec.name, ContainerState::Running);
        self.containers.insert(
            spec.name.clone(),
            MemoryContainer {
                handle: handle.clone(),
                spec: spec.clone(),
                networks: Vec::new(),
            },
        );
        Ok(handle)
    }
}

/// Container runtime that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    state: RwLock<MemoryState>,
    run_delay: RwLock<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryRuntime {
    /// Creates an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the behaviour of the one-shot container named `name`.
    pub async fn set_cmdlet(&self, name: impl Into<String>, behavior: CmdletBehavior) {
        self.state.write().await.cmdlets.insert(name.into(), behavior);
    }

    /// Makes `run_detached` fail for the container named `name`.
    pub async fn fail_run(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.state
            .write()
            .await
            .run_failures
            .insert(name.into(), reason.into());
    }

    /// Makes every `create_network` call fail.
    pub async fn fail_network_creation(&self, reason: impl Into<String>) {
        self.state.write().await.network_failure = Some(reason.into());
    }

    /// Slows every `run_detached` call down by `delay`.
    pub async fn set_run_delay(&self, delay: Duration) {
        *self.run_delay.write().await = Some(delay);
    }

    /// Places an archive at `path` inside container `name`.
    pub async fn put_file(&self, name: impl Into<String>, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.state
            .write()
            .await
            .files
            .insert((name.into(), path.into()), contents.into());
    }

    /// Returns how many times `operation` was called.
    pub async fn calls(&self, operation: &str) -> usize {
        self.state.read().await.calls.get(operation).copied().unwrap_or(0)
    }

    /// Returns a container by name.
    pub async fn container(&self, name: &str) -> Option<MemoryContainer> {
        self.state.read().await.containers.get(name).cloned()
    }

    /// Returns the sorted names of all containers.
    pub async fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.containers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of containers.
    pub async fn container_count(&self) -> usize {
        self.state.read().await.containers.len()
    }

    /// Returns the spec a network was created with.
    pub async fn network_spec(&self, name: &str) -> Option<NetworkSpec> {
        self.state
            .read()
            .await
            .networks
            .get(name)
            .map(|(_, spec)| spec.clone())
    }

    /// Returns the number of networks.
    pub async fn network_count(&self) -> usize {
        self.state.read().await.networks.len()
    }

    /// Returns the highest number of overlapping `run_detached` calls seen.
    pub fn peak_concurrent_runs(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn transition(
        &self,
        operation: &'static str,
        name: &str,
        apply: impl FnOnce(&ContainerState) -> std::result::Result<ContainerState, &'static str>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(operation);
        let container = state.container_mut(name)?;
        let next = apply(&container.handle.state)
            .map_err(|reason| OrchestratorError::runtime_operation(operation, name, reason))?;
        container.handle.state = next;
        Ok(())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn inspect(&self, name: &str) -> Result<ContainerHandle> {
        let mut state = self.state.write().await;
        state.record("inspect");
        state
            .containers
            .get(name)
            .map(|c| c.handle.clone())
            .ok_or_else(|| OrchestratorError::container_not_found(name))
    }

    async fn run_detached(&self, spec: &RunSpec) -> Result<ContainerHandle> {
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        let delay = *self.run_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        state.record("run_detached");
        if let Some(reason) = state.run_failures.get(&spec.name) {
            return Err(OrchestratorError::runtime_operation("run", &spec.name, reason.clone()));
        }
        state.register(spec)
    }

    async fn run_to_completion(&self, spec: &RunSpec) -> Result<Vec<u8>> {
        let behavior = {
            let mut state = self.state.write().await;
            state.record("run_to_completion");
            state.register(spec)?;
            state.cmdlets.get(&spec.name).cloned().unwrap_or_default()
        };

        let outcome = match behavior {
            CmdletBehavior::Output(output) => Ok(output),
            CmdletBehavior::Delayed(delay, output) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
            CmdletBehavior::Fail { exit_code, output } => Err(OrchestratorError::cmdlet_failed(
                &spec.name,
                exit_code,
                String::from_utf8_lossy(&output),
            )),
            CmdletBehavior::Hang => std::future::pending().await,
        };

        self.state.write().await.containers.remove(&spec.name);
        outcome
    }

    async fn connect_network(&self, network: &str, container: &str, ipv4_address: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.record("connect_network");
        if !state.networks.contains_key(network) {
            return Err(OrchestratorError::network_not_found(network));
        }
        state
            .container_mut(container)?
            .networks
            .push((network.to_string(), ipv4_address.to_string()));
        Ok(())
    }

    /// Echoes the command back on stdout.
    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput> {
        let mut state = self.state.write().await;
        state.record("exec");
        let container = state.container_mut(name)?;
        if !container.handle.is_running() {
            return Err(OrchestratorError::runtime_operation(
                "exec",
                name,
                "container is not running",
            ));
        }
        Ok(ExecOutput::new(cmd.join(" "), Vec::<u8>::new(), 0))
    }

    async fn pause(&self, name: &str) -> Result<()> {
        self.transition("pause", name, |current| match current {
            ContainerState::Running => Ok(ContainerState::Paused),
            ContainerState::Paused => Err("container is already paused"),
            _ => Err("container is not running"),
        })
        .await
    }

    async fn unpause(&self, name: &str) -> Result<()> {
        self.transition("unpause", name, |current| match current {
            ContainerState::Paused => Ok(ContainerState::Running),
            _ => Err("container is not paused"),
        })
        .await
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.transition("start", name, |current| match current {
            ContainerState::Paused => Err("cannot start a paused container"),
            _ => Ok(ContainerState::Running),
        })
        .await
    }

    async fn kill(&self, name: &str) -> Result<()> {
        self.transition("kill", name, |current| match current {
            ContainerState::Running => Ok(ContainerState::Exited { exit_code: 137 }),
            ContainerState::Paused => Err("container is paused, unpause it before killing"),
            _ => Err("container is not running"),
        })
        .await
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.record("remove");
        let current = state.container_mut(name)?.handle.state.clone();
        match current {
            ContainerState::Paused => Err(OrchestratorError::runtime_operation(
                "remove",
                name,
                "cannot remove a paused container",
            )),
            ContainerState::Running if !force => Err(OrchestratorError::runtime_operation(
                "remove",
                name,
                "container is running, stop it or use force",
            )),
            _ => {
                state.containers.remove(name);
                Ok(())
            }
        }
    }

    async fn copy_from(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        let mut state = self.state.write().await;
        state.record("copy_from");
        state.container_mut(name)?;
        state
            .files
            .get(&(name.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| OrchestratorError::runtime_operation("copy_from", name, format!("no such path: {}", path)))
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkHandle> {
        let mut state = self.state.write().await;
        state.record("inspect_network");
        state
            .networks
            .get(name)
            .map(|(handle, _)| handle.clone())
            .ok_or_else(|| OrchestratorError::network_not_found(name))
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkHandle> {
        let mut state = self.state.write().await;
        state.record("create_network");
        if let Some(reason) = &state.network_failure {
            return Err(OrchestratorError::network_creation_failed(&spec.name, reason.clone()));
        }
        if state.networks.contains_key(&spec.name) {
            return Err(OrchestratorError::already_exists(&spec.name));
        }

        let handle = NetworkHandle::new(state.next_id(), &spec.name);
        state
            .networks
            .insert(spec.name.clone(), (handle.clone(), spec.clone()));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> RunSpec {
        RunSpec::new("corfu_test", name).shell("sleep 1000")
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let runtime = InMemoryRuntime::new();
        runtime.run_detached(&spec("a")).await.unwrap();

        let err = runtime.run_detached(&spec("a")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(runtime.container_count().await, 1);
    }

    #[tokio::test]
    async fn test_paused_container_state_machine() {
        let runtime = InMemoryRuntime::new();
        runtime.run_detached(&spec("a")).await.unwrap();

        runtime.pause("a").await.unwrap();
        assert!(runtime.pause("a").await.is_err());
        assert!(runtime.kill("a").await.is_err());
        assert!(runtime.remove("a", true).await.is_err());

        runtime.unpause("a").await.unwrap();
        runtime.kill("a").await.unwrap();
        assert_eq!(
            runtime.inspect("a").await.unwrap().state,
            ContainerState::Exited { exit_code: 137 }
        );

        runtime.remove("a", false).await.unwrap();
        assert!(runtime.inspect("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cmdlet_is_discarded_after_run() {
        let runtime = InMemoryRuntime::new();
        runtime
            .set_cmdlet("once", CmdletBehavior::Output(b"done".to_vec()))
            .await;

        let output = runtime.run_to_completion(&spec("once")).await.unwrap();
        assert_eq!(output, b"done");
        assert!(runtime.container("once").await.is_none());
    }

    #[tokio::test]
    async fn test_failing_cmdlet() {
        let runtime = InMemoryRuntime::new();
        runtime
            .set_cmdlet(
                "once",
                CmdletBehavior::Fail {
                    exit_code: 3,
                    output: b"bad layout".to_vec(),
                },
            )
            .await;

        let err = runtime.run_to_completion(&spec("once")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::CmdletFailed { exit_code: 3, .. }));
        assert!(runtime.container("once").await.is_none());
    }

    #[tokio::test]
    async fn test_connect_requires_network() {
        let runtime = InMemoryRuntime::new();
        runtime.run_detached(&spec("a")).await.unwrap();

        let err = runtime.connect_network("corfunet", "a", "10.0.0.1").await.unwrap_err();
        assert!(err.is_not_found());

        runtime.create_network(&NetworkSpec::default()).await.unwrap();
        runtime.connect_network("corfunet", "a", "10.0.0.1").await.unwrap();
        assert_eq!(
            runtime.container("a").await.unwrap().networks,
            vec![("corfunet".to_string(), "10.0.0.1".to_string())]
        );
    }
}
