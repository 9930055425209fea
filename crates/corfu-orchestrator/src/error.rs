//! Error types for the orchestrator crate.
//!
//! Absence of a container or network is an ordinary answer to an existence
//! check and is absorbed close to the runtime call; every other error is
//! surfaced to the caller unchanged. Nothing in this crate retries.

use std::time::Duration;

use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur during orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Container not found.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Network not found.
    #[error("network not found: {0}")]
    NetworkNotFound(String),

    /// A create call lost a race against another creator of the same name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An endpoint string could not be split into host and port.
    #[error("invalid endpoint {input:?}: {reason}")]
    InvalidEndpoint {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A guarded operation overran its deadline.
    #[error("{operation} timed out after {deadline:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that elapsed.
        deadline: Duration,
        /// The timer expiry that ended the wait.
        #[source]
        source: tokio::time::error::Elapsed,
    },

    /// A container runtime call failed for a reason other than absence.
    #[error("runtime operation {operation} failed on {target}: {reason}")]
    RuntimeOperation {
        /// The runtime call that failed.
        operation: String,
        /// Container or network name.
        target: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Docker API error.
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    /// A one-shot cmdlet container exited with a non-zero status.
    #[error("cmdlet {name} exited with status {exit_code}")]
    CmdletFailed {
        /// Cmdlet container name.
        name: String,
        /// Exit status of the cmdlet.
        exit_code: i64,
        /// Whatever the cmdlet printed before exiting.
        output: String,
    },

    /// Cmdlet output did not contain a parsable payload.
    #[error("malformed cmdlet output: {0}")]
    MalformedOutput(String),

    /// Network creation failed.
    #[error("failed to create network {name}: {reason}")]
    NetworkCreationFailed {
        /// The network name.
        name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A pooled or guarded worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    WorkerFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}

impl OrchestratorError {
    /// Creates a container not found error.
    pub fn container_not_found(name: impl Into<String>) -> Self {
        Self::ContainerNotFound(name.into())
    }

    /// Creates a network not found error.
    pub fn network_not_found(name: impl Into<String>) -> Self {
        Self::NetworkNotFound(name.into())
    }

    /// Creates an already exists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists(name.into())
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(
        operation: impl Into<String>,
        deadline: Duration,
        source: tokio::time::error::Elapsed,
    ) -> Self {
        Self::Timeout {
            operation: operation.into(),
            deadline,
            source,
        }
    }

    /// Creates a runtime operation error.
    pub fn runtime_operation(
        operation: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RuntimeOperation {
            operation: operation.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates a cmdlet failed error.
    pub fn cmdlet_failed(name: impl Into<String>, exit_code: i64, output: impl Into<String>) -> Self {
        Self::CmdletFailed {
            name: name.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Creates a malformed output error.
    pub fn malformed_output(reason: impl Into<String>) -> Self {
        Self::MalformedOutput(reason.into())
    }

    /// Creates a network creation failed error.
    pub fn network_creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkCreationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a worker failed error.
    pub fn worker_failed(reason: impl Into<String>) -> Self {
        Self::WorkerFailed(reason.into())
    }

    /// Creates a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Returns true if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContainerNotFound(_) | Self::NetworkNotFound(_))
    }

    /// Returns true if a create call found the name already taken.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns true if a guarded operation overran its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
