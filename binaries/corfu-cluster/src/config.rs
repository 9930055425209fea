//! Command-line configuration.
//!
//! The cluster section is handed to the orchestrator as is; the logging
//! section only drives subscriber setup in `main`.

use std::path::Path;

use corfu_orchestrator::ClusterConfig;
use serde::{Deserialize, Serialize};

/// Complete configuration of the `corfu-cluster` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Cluster configuration.
    pub cluster: ClusterConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) {
        // Override log level if specified
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.json_logs {
            self.logging.format = "json".to_string();
        }

        if let Some(ref image) = args.image {
            self.cluster.image = image.clone();
        }

        if let Some(workers) = args.workers {
            self.cluster.workers = workers;
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        // Validate log format
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        self.cluster.validate()?;
        Ok(())
    }
}
