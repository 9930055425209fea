//! Cluster configuration.
//!
//! Every knob the orchestrator reads lives here, with defaults that match a
//! stock `corfu_test` image. Sections deserialize independently, so a
//! configuration file only needs to name what it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::topology::NetworkSpec;

/// Default image the nodes and cmdlets run.
pub const DEFAULT_IMAGE: &str = "corfu_test";

/// Default number of concurrent node operations.
pub const DEFAULT_WORKERS: usize = 5;

/// Default server port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default on-disk log directory inside a node container.
pub const DEFAULT_LOG_PATH: &str = "/var/corfu";

/// Default console log file inside a node container.
pub const DEFAULT_CONSOLE_LOG_PATH: &str = "/var/log/corfu.9000.log";

/// Log levels the server binary accepts.
pub const LOGGING_LEVELS: &[&str] = &["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// Top-level cluster configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Image for nodes and cmdlets.
    pub image: String,

    /// Size of the worker pool used for node fan-out.
    pub workers: usize,

    /// Cluster network.
    pub network: NetworkSpec,

    /// Defaults applied to every node.
    pub node: NodeDefaults,

    /// Deadlines of the guarded cmdlets.
    pub timeouts: TimeoutConfig,

    /// Names of the cmdlet containers.
    pub cmdlets: CmdletNames,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            workers: DEFAULT_WORKERS,
            network: NetworkSpec::default(),
            node: NodeDefaults::default(),
            timeouts: TimeoutConfig::default(),
            cmdlets: CmdletNames::default(),
        }
    }
}

impl ClusterConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(OrchestratorError::configuration("image must not be empty"));
        }

        if self.workers == 0 {
            return Err(OrchestratorError::configuration("workers must be greater than zero"));
        }

        if self.timeouts.query_secs == 0 || self.timeouts.bootstrap_secs == 0 {
            return Err(OrchestratorError::configuration("timeouts must be greater than zero"));
        }

        if self.cmdlets.bootstrap.is_empty() || self.cmdlets.layout_query.is_empty() {
            return Err(OrchestratorError::configuration("cmdlet names must not be empty"));
        }

        if self.cmdlets.bootstrap == self.cmdlets.layout_query {
            return Err(OrchestratorError::configuration(
                "bootstrap and layout query cmdlets need distinct container names",
            ));
        }

        self.node.validate()?;
        self.network
            .validate()
            .map_err(|e| OrchestratorError::configuration(format!("network: {}", e)))
    }
}

/// Node settings shared by every node of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDefaults {
    /// Port assumed for an endpoint given as a bare host.
    pub port: u16,

    /// Keep the log in memory instead of on disk.
    pub memory: bool,

    /// On-disk log directory.
    pub log_path: String,

    /// File the server's console output is appended to.
    pub console_log_path: String,

    /// Bootstrap each node as a single-node cluster.
    pub single: bool,

    /// Server log level.
    pub logging_level: String,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            memory: false,
            log_path: DEFAULT_LOG_PATH.to_string(),
            console_log_path: DEFAULT_CONSOLE_LOG_PATH.to_string(),
            single: false,
            logging_level: "INFO".to_string(),
        }
    }
}

impl NodeDefaults {
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(OrchestratorError::configuration("node port must not be 0"));
        }

        if !LOGGING_LEVELS.contains(&self.logging_level.as_str()) {
            return Err(OrchestratorError::configuration(format!(
                "invalid node logging level: {} (expected one of {})",
                self.logging_level,
                LOGGING_LEVELS.join(", ")
            )));
        }

        if !self.memory && self.log_path.is_empty() {
            return Err(OrchestratorError::configuration(
                "log_path must be set unless memory is enabled",
            ));
        }

        if self.console_log_path.is_empty() {
            return Err(OrchestratorError::configuration("console_log_path must not be empty"));
        }

        Ok(())
    }
}

/// Deadlines of the guarded cmdlets, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Layout query deadline.
    pub query_secs: u64,

    /// Bootstrap deadline.
    pub bootstrap_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_secs: 30,
            bootstrap_secs: 60,
        }
    }
}

impl TimeoutConfig {
    /// Returns the layout query deadline.
    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }

    /// Returns the bootstrap deadline.
    pub fn bootstrap(&self) -> Duration {
        Duration::from_secs(self.bootstrap_secs)
    }
}

/// Container names of the one-shot cmdlets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmdletNames {
    /// Bootstrap cmdlet container.
    pub bootstrap: String,

    /// Layout query cmdlet container.
    pub layout_query: String,
}

impl Default for CmdletNames {
    fn default() -> Self {
        Self {
            bootstrap: "orchestrator".to_string(),
            layout_query: "layout_getter".to_string(),
        }
    }
}
