//! Container handles and states.
//!
//! A handle is a snapshot of what the runtime reported at inspection time.
//! It is never treated as the source of truth: lifecycle operations
//! re-inspect the container by name after every mutation.

use serde::{Deserialize, Serialize};

/// Snapshot of a container as last reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container ID assigned by the runtime.
    pub id: String,

    /// Container name.
    pub name: String,

    /// State at inspection time.
    pub state: ContainerState,
}

impl ContainerHandle {
    /// Creates a new container handle.
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: ContainerState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state,
        }
    }

    /// Returns the short container ID (first 12 characters).
    pub fn short_id(&self) -> &str {
        if self.id.len() > 12 {
            &self.id[..12]
        } else {
            &self.id
        }
    }

    /// Returns true if the container is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state, ContainerState::Running)
    }

    /// Returns true if the container is paused.
    pub fn is_paused(&self) -> bool {
        matches!(self.state, ContainerState::Paused)
    }
}

/// Container state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    /// Container has been created but not started.
    Created,

    /// Container is running.
    Running,

    /// Container is paused.
    Paused,

    /// Container is being restarted.
    Restarting,

    /// Container is being removed.
    Removing,

    /// Container has exited.
    Exited {
        /// Exit code.
        exit_code: i64,
    },

    /// Container is dead.
    Dead,
}

impl ContainerState {
    /// Returns the lowercase name the runtime uses for this state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited { .. } => "exited",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited { exit_code } => write!(f, "exited ({})", exit_code),
            other => f.write_str(other.name()),
        }
    }
}
