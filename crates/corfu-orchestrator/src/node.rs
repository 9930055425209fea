//! Node management.
//!
//! A [`Node`] binds one endpoint to one container. It keeps no container
//! state of its own: every operation looks the container up by name and
//! re-inspects it after mutating it.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::backend::{ContainerRuntime, ExecOutput, SharedRuntime};
use crate::config::{ClusterConfig, NodeDefaults, DEFAULT_IMAGE};
use crate::container::{ContainerHandle, ContainerState, RunSpec};
use crate::error::Result;
use crate::topology::{Endpoint, DEFAULT_NETWORK_NAME};

/// Launcher script of the server binary.
pub const SERVER_SCRIPT: &str = "corfu_server";

/// Configuration of a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Endpoint the node serves.
    pub endpoint: Endpoint,

    /// Image the container runs.
    pub image: String,

    /// Network the container is attached to.
    pub network: String,

    /// Keep the log in memory instead of on disk.
    pub memory: bool,

    /// On-disk log directory.
    pub log_path: String,

    /// File the server's console output is appended to.
    pub console_log_path: String,

    /// Bootstrap as a single-node cluster.
    pub single: bool,

    /// Server log level.
    pub logging_level: String,
}

impl NodeConfig {
    /// Creates a node configuration with default settings.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_defaults(endpoint, DEFAULT_IMAGE, DEFAULT_NETWORK_NAME, &NodeDefaults::default())
    }

    /// Creates a node configuration from the cluster configuration.
    pub fn from_cluster(endpoint: Endpoint, config: &ClusterConfig) -> Self {
        Self::with_defaults(endpoint, &config.image, &config.network.name, &config.node)
    }

    fn with_defaults(endpoint: Endpoint, image: &str, network: &str, defaults: &NodeDefaults) -> Self {
        Self {
            endpoint,
            image: image.to_string(),
            network: network.to_string(),
            memory: defaults.memory,
            log_path: defaults.log_path.clone(),
            console_log_path: defaults.console_log_path.clone(),
            single: defaults.single,
            logging_level: defaults.logging_level.clone(),
        }
    }

    /// Name of the node's container.
    pub fn container_name(&self) -> String {
        self.endpoint.container_name()
    }

    /// Builds the shell command that launches the server.
    ///
    /// `-m` and `-l` are mutually exclusive; memory mode wins.
    pub fn generate_run_command(&self) -> String {
        let mut command = format!("{} -a {} ", SERVER_SCRIPT, self.endpoint.host());
        if self.memory {
            command.push_str("-m ");
        } else {
            command.push_str(&format!("-l {} ", self.log_path));
        }
        if self.single {
            command.push_str("-s ");
        }
        command.push_str(&format!(
            "-d {} {} >> {}",
            self.logging_level,
            self.endpoint.port(),
            self.console_log_path
        ));
        command
    }

    fn run_spec(&self) -> RunSpec {
        RunSpec::new(&self.image, self.container_name())
            .shell(self.generate_run_command())
            .tty(true)
    }
}

/// Looks a container up by exact name.
///
/// Absence is the expected negative answer and comes back as `None`.
pub async fn find_container(runtime: &dyn ContainerRuntime, name: &str) -> Result<Option<ContainerHandle>> {
    match runtime.inspect(name).await {
        Ok(handle) => Ok(Some(handle)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// One managed server container.
#[derive(Clone)]
pub struct Node {
    config: NodeConfig,
    name: String,
    runtime: SharedRuntime,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("runtime", &self.runtime.name())
            .finish()
    }
}

impl Node {
    /// Creates a node object. No container is touched.
    pub fn new(config: NodeConfig, runtime: SharedRuntime) -> Self {
        let name = config.container_name();
        Self { config, name, runtime }
    }

    /// Returns the container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    /// Returns the node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Returns the container, if it exists.
    pub async fn exists(&self) -> Result<Option<ContainerHandle>> {
        find_container(self.runtime.as_ref(), &self.name).await
    }

    /// Returns the live state of the container, if it exists.
    pub async fn state(&self) -> Result<Option<ContainerState>> {
        Ok(self.exists().await?.map(|handle| handle.state))
    }

    /// Starts the node's container unless one already exists.
    ///
    /// Returns `None` when the container was already there. A new container
    /// runs detached and is attached to the cluster network with the node's
    /// address as its static IP.
    pub async fn create(&self) -> Result<Option<ContainerHandle>> {
        if self.exists().await?.is_some() {
            info!(container = %self.name, "Container already running");
            return Ok(None);
        }

        let handle = match self.runtime.run_detached(&self.config.run_spec()).await {
            Ok(handle) => handle,
            Err(e) if e.is_already_exists() => {
                info!(container = %self.name, "Container already running");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.runtime
            .connect_network(&self.config.network, &self.name, self.config.endpoint.host())
            .await?;

        info!(
            container = %self.name,
            container_id = %handle.short_id(),
            network = %self.config.network,
            address = %self.config.endpoint.host(),
            "Spawned container"
        );
        self.runtime.inspect(&self.name).await.map(Some)
    }

    /// Runs a command inside the container.
    pub async fn exec(&self, cmd: &[String]) -> Result<ExecOutput> {
        self.runtime.exec(&self.name, cmd).await
    }

    /// Runs a shell command inside the container and returns its output.
    pub async fn execute_command(&self, command: &str) -> Result<Vec<u8>> {
        let cmd = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        let output = self.exec(&cmd).await?;
        if !output.success() {
            debug!(container = %self.name, exit_code = output.exit_code, "Command exited non-zero");
        }
        Ok(output.combined_output())
    }

    /// Pauses the container. A paused container is left alone.
    pub async fn pause(&self) -> Result<ContainerHandle> {
        let handle = self.runtime.inspect(&self.name).await?;
        if handle.is_paused() {
            return Ok(handle);
        }

        self.runtime.pause(&self.name).await?;
        info!(container = %self.name, "Paused container");
        self.runtime.inspect(&self.name).await
    }

    /// Unpauses the container if it is paused.
    pub async fn unpause(&self) -> Result<ContainerHandle> {
        let handle = self.runtime.inspect(&self.name).await?;
        if !handle.is_paused() {
            return Ok(handle);
        }

        self.runtime.unpause(&self.name).await?;
        info!(container = %self.name, "Unpaused container");
        self.runtime.inspect(&self.name).await
    }

    /// Starts a stopped container.
    pub async fn start(&self) -> Result<ContainerHandle> {
        let handle = self.unpause().await?;
        if handle.is_running() {
            return Ok(handle);
        }

        self.runtime.start(&self.name).await?;
        info!(container = %self.name, "Started container");
        self.runtime.inspect(&self.name).await
    }

    /// Kills the server process. A paused container is resumed first.
    pub async fn stop(&self) -> Result<ContainerHandle> {
        let handle = self.unpause().await?;
        if !handle.is_running() {
            return Ok(handle);
        }

        self.runtime.kill(&self.name).await?;
        info!(container = %self.name, "Stopped container");
        self.runtime.inspect(&self.name).await
    }

    /// Force-removes the container. An absent container is not an error.
    pub async fn remove(&self) -> Result<()> {
        remove_container(self.runtime.as_ref(), &self.name).await
    }

    /// Copies the on-disk log directory out as a tar archive.
    ///
    /// Writes to `./<name>.data.tar` unless `dest` is given.
    pub async fn save_data_log(&self, dest: Option<&Path>) -> Result<PathBuf> {
        let dest = dest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("{}.data.tar", self.name)));
        self.save_archive(&self.config.log_path, dest).await
    }

    /// Copies the console log file out as a tar archive.
    ///
    /// Writes to `./<name>.console.tar` unless `dest` is given.
    pub async fn save_console_log(&self, dest: Option<&Path>) -> Result<PathBuf> {
        let dest = dest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("{}.console.tar", self.name)));
        self.save_archive(&self.config.console_log_path, dest).await
    }

    async fn save_archive(&self, source: &str, dest: PathBuf) -> Result<PathBuf> {
        let archive = self.runtime.copy_from(&self.name, source).await?;
        tokio::fs::write(&dest, &archive).await?;
        info!(
            container = %self.name,
            source = %source,
            dest = %dest.display(),
            bytes = archive.len(),
            "Saved archive"
        );
        Ok(dest)
    }
}

/// Force-removes a container by name, resuming it first if paused.
///
/// Absence is success.
pub async fn remove_container(runtime: &dyn ContainerRuntime, name: &str) -> Result<()> {
    let Some(handle) = find_container(runtime, name).await? else {
        debug!(container = %name, "Container already absent");
        return Ok(());
    };

    if handle.is_paused() {
        match runtime.unpause(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }
    }

    match runtime.remove(name, true).await {
        Ok(()) => {
            info!(container = %name, "Removed container");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
