//! Container run specifications.

use serde::{Deserialize, Serialize};

/// Everything the runtime needs to start one container.
///
/// Node containers are started detached and outlive the call; cmdlet
/// containers are run to completion and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Image reference.
    pub image: String,

    /// Container name. Doubles as the lookup key for every later call.
    pub name: String,

    /// Command to run (overrides the image entrypoint arguments).
    pub command: Vec<String>,

    /// Network the container joins at creation time, if any.
    pub network: Option<String>,

    /// Whether to allocate a pseudo-TTY.
    pub tty: bool,

    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,
}

impl RunSpec {
    /// Creates a run spec for `image` named `name` with no command.
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            command: Vec::new(),
            network: None,
            tty: true,
            volumes: Vec::new(),
        }
    }

    /// Runs `script` through `sh -c`.
    pub fn shell(mut self, script: impl Into<String>) -> Self {
        self.command = vec!["sh".to_string(), "-c".to_string(), script.into()];
        self
    }

    /// Attaches the container to `network` at creation.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Sets whether a TTY is allocated.
    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Adds a volume mount.
    pub fn volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }
}

/// Bind mount of a host path into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Source path on the host.
    pub source: String,

    /// Target path in the container.
    pub target: String,

    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl VolumeMount {
    /// Creates a new bind mount.
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Sets the mount to read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Returns the Docker `binds` string for this mount.
    pub fn as_bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.source, self.target, mode)
    }
}
