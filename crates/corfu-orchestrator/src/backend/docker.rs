//! Docker runtime implementation.
//!
//! Talks to the local Docker daemon through bollard. Containers and
//! networks are addressed by name throughout; nothing is cached here.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    KillContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{
    ContainerState as DockerContainerState, ContainerStateStatusEnum, EndpointIpamConfig,
    EndpointSettings, HostConfig, Ipam, IpamConfig,
};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, InspectNetworkOptions};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::backend::r#trait::{ContainerRuntime, ExecOutput, NetworkHandle};
use crate::container::{ContainerHandle, ContainerState, RunSpec, VolumeMount};
use crate::error::{OrchestratorError, Result};
use crate::topology::NetworkSpec;

/// Container runtime backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon and checks that it answers.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;

        // Verify connection
        docker.ping().await?;

        info!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Wraps an existing client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn container_config(spec: &RunSpec) -> Config<String> {
        let binds: Vec<String> = spec.volumes.iter().map(VolumeMount::as_bind).collect();

        let host_config = HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            network_mode: spec.network.clone(),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            tty: Some(spec.tty),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn create(&self, spec: &RunSpec) -> Result<()> {
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), Self::container_config(spec))
            .await
            .map_err(|e| match status_code(&e) {
                Some(409) => OrchestratorError::already_exists(&spec.name),
                Some(404) => OrchestratorError::runtime_operation("create", &spec.name, e.to_string()),
                _ => e.into(),
            })?;

        debug!(container = %spec.name, image = %spec.image, "Created container");
        Ok(())
    }

    async fn discard(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => debug!(container = %name, "Discarded container"),
            Err(e) if status_code(&e) == Some(404) => {}
            Err(e) => warn!(container = %name, error = %e, "Failed to discard container"),
        }
    }

    async fn wait_and_collect(&self, name: &str) -> Result<Vec<u8>> {
        self.start(name).await?;

        let mut exit_code = 0;
        let mut wait = std::pin::pin!(self
            .docker
            .wait_container(name, None::<WaitContainerOptions<String>>));
        while let Some(result) = wait.next().await {
            match result {
                Ok(response) => exit_code = response.status_code,
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => exit_code = code,
                Err(e) => return Err(container_error(name, e)),
            }
        }

        let output = self.collect_logs(name).await?;
        if exit_code != 0 {
            return Err(OrchestratorError::cmdlet_failed(
                name,
                exit_code,
                String::from_utf8_lossy(&output),
            ));
        }

        Ok(output)
    }

    async fn collect_logs(&self, name: &str) -> Result<Vec<u8>> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut output: Vec<u8> = Vec::new();
        while let Some(result) = stream.next().await {
            let log = result.map_err(|e| container_error(name, e))?;
            output.extend_from_slice(&log.into_bytes());
        }

        Ok(output)
    }
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn container_error(name: &str, err: bollard::errors::Error) -> OrchestratorError {
    match status_code(&err) {
        Some(404) => OrchestratorError::container_not_found(name),
        _ => err.into(),
    }
}

/// Docker answers a connect with 404 for a missing network or container
/// alike; only the message tells them apart.
fn connect_error(network: &str, container: &str, err: bollard::errors::Error) -> OrchestratorError {
    match &err {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, message } => {
            if message.contains("container") {
                OrchestratorError::container_not_found(container)
            } else {
                OrchestratorError::network_not_found(network)
            }
        }
        _ => OrchestratorError::runtime_operation("connect_network", container, err.to_string()),
    }
}

fn convert_state(state: &DockerContainerState) -> ContainerState {
    match state.status {
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removing,
        Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited {
            exit_code: state.exit_code.unwrap_or(0),
        },
        Some(ContainerStateStatusEnum::DEAD) => ContainerState::Dead,
        Some(ContainerStateStatusEnum::CREATED) | Some(ContainerStateStatusEnum::EMPTY) | None => {
            ContainerState::Created
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn inspect(&self, name: &str) -> Result<ContainerHandle> {
        let info = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| container_error(name, e))?;

        let state = info
            .state
            .as_ref()
            .map(convert_state)
            .unwrap_or(ContainerState::Created);
        Ok(ContainerHandle::new(info.id.unwrap_or_default(), name, state))
    }

    async fn run_detached(&self, spec: &RunSpec) -> Result<ContainerHandle> {
        self.create(spec).await?;

        if let Err(e) = self.start(&spec.name).await {
            self.discard(&spec.name).await;
            return Err(e);
        }

        info!(container = %spec.name, image = %spec.image, "Started container");
        self.inspect(&spec.name).await
    }

    async fn run_to_completion(&self, spec: &RunSpec) -> Result<Vec<u8>> {
        self.create(spec).await?;
        let result = self.wait_and_collect(&spec.name).await;
        self.discard(&spec.name).await;
        result
    }

    async fn connect_network(&self, network: &str, container: &str, ipv4_address: &str) -> Result<()> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings {
                ipam_config: Some(EndpointIpamConfig {
                    ipv4_address: Some(ipv4_address.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };

        self.docker
            .connect_network(network, options)
            .await
            .map_err(|e| connect_error(network, container, e))?;

        debug!(network = %network, container = %container, address = %ipv4_address, "Connected container");
        Ok(())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput> {
        debug!(container = %name, cmd = ?cmd, "Executing command");

        let exec_options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(name, exec_options)
            .await
            .map_err(|e| container_error(name, e))?;

        let start_result = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(result) = output.next().await {
                match result {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        stdout.extend_from_slice(&message);
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.extend_from_slice(&message);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(OrchestratorError::runtime_operation("exec", name, e.to_string()));
                    }
                }
            }
        }

        // Get exit code
        let exec_inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = exec_inspect.exit_code.unwrap_or(-1);

        Ok(ExecOutput::new(stdout, stderr, exit_code))
    }

    async fn pause(&self, name: &str) -> Result<()> {
        self.docker
            .pause_container(name)
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn unpause(&self, name: &str) -> Result<()> {
        self.docker
            .unpause_container(name)
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn start(&self, name: &str) -> Result<()> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // Already started.
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) => Err(container_error(name, e)),
        }
    }

    async fn kill(&self, name: &str) -> Result<()> {
        self.docker
            .kill_container(name, None::<KillContainerOptions<String>>)
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn copy_from(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };

        let mut stream = std::pin::pin!(self.docker.download_from_container(name, Some(options)));
        let mut archive: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| container_error(name, e))?;
            archive.extend_from_slice(&chunk);
        }

        Ok(archive)
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkHandle> {
        let network = self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => OrchestratorError::network_not_found(name),
                _ => e.into(),
            })?;

        Ok(NetworkHandle::new(network.id.unwrap_or_default(), name))
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkHandle> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            ipam: Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(spec.subnet.clone()),
                    gateway: Some(spec.gateway.clone()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| match status_code(&e) {
                Some(409) => OrchestratorError::already_exists(&spec.name),
                _ => OrchestratorError::network_creation_failed(&spec.name, e.to_string()),
            })?;

        if response.id.is_empty() {
            return Err(OrchestratorError::network_creation_failed(
                &spec.name,
                "no ID returned",
            ));
        }

        Ok(NetworkHandle::new(response.id, &spec.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_config_for_cmdlet() {
        let spec = RunSpec::new("corfu_test", "orchestrator")
            .shell("corfu_bootstrap_cluster -l /tmp/layout")
            .network("corfunet")
            .volume(VolumeMount::bind("/home/me/layout.json", "/tmp/layout").read_only());

        let config = DockerRuntime::container_config(&spec);
        assert_eq!(config.image.as_deref(), Some("corfu_test"));
        assert_eq!(config.tty, Some(true));
        assert_eq!(
            config.cmd,
            Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "corfu_bootstrap_cluster -l /tmp/layout".to_string()
            ])
        );

        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.network_mode.as_deref(), Some("corfunet"));
        assert_eq!(
            host_config.binds,
            Some(vec!["/home/me/layout.json:/tmp/layout:ro".to_string()])
        );
    }

    #[test]
    fn test_container_config_without_mounts() {
        let spec = RunSpec::new("corfu_test", "10.0.0.1_9000");
        let config = DockerRuntime::container_config(&spec);
        assert!(config.cmd.is_none());

        let host_config = config.host_config.unwrap();
        assert!(host_config.binds.is_none());
        assert!(host_config.network_mode.is_none());
    }

    #[test]
    fn test_convert_state() {
        let state = DockerContainerState {
            status: Some(ContainerStateStatusEnum::EXITED),
            exit_code: Some(137),
            ..Default::default()
        };
        assert_eq!(convert_state(&state), ContainerState::Exited { exit_code: 137 });

        let state = DockerContainerState {
            status: Some(ContainerStateStatusEnum::PAUSED),
            ..Default::default()
        };
        assert_eq!(convert_state(&state), ContainerState::Paused);

        assert_eq!(convert_state(&DockerContainerState::default()), ContainerState::Created);
    }

    #[test]
    fn test_status_code_mapping() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: 10.0.0.1_9000".to_string(),
        };
        assert!(container_error("10.0.0.1_9000", err).is_not_found());

        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        };
        assert!(matches!(
            container_error("10.0.0.1_9000", err),
            OrchestratorError::DockerApi(_)
        ));
    }

    #[test]
    fn test_connect_error_mapping() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "network corfunet not found".to_string(),
        };
        assert!(matches!(
            connect_error("corfunet", "10.0.0.1_9000", err),
            OrchestratorError::NetworkNotFound(name) if name == "corfunet"
        ));

        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: 10.0.0.1_9000".to_string(),
        };
        assert!(matches!(
            connect_error("corfunet", "10.0.0.1_9000", err),
            OrchestratorError::ContainerNotFound(name) if name == "10.0.0.1_9000"
        ));

        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 403,
            message: "address already in use".to_string(),
        };
        assert!(matches!(
            connect_error("corfunet", "10.0.0.1_9000", err),
            OrchestratorError::RuntimeOperation { .. }
        ));
    }
}
