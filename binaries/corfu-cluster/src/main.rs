//! corfu-cluster - Drives containerised Corfu clusters.
//!
//! # Usage
//!
//! ```bash
//! # Spawn and bootstrap the cluster described by a layout, print the
//! # committed layout
//! corfu-cluster up layout.json
//!
//! # Inspect and poke at nodes
//! corfu-cluster status layout.json
//! corfu-cluster exec 192.168.0.5:9000 "ls -la /var/corfu/"
//! corfu-cluster pause 192.168.0.5:9000
//! corfu-cluster logs 192.168.0.5:9000 --console
//!
//! # Remove every node container
//! corfu-cluster down layout.json
//!
//! # Start from a configuration file
//! corfu-cluster --config corfu-cluster.toml up layout.json
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::CliConfig;
use corfu_orchestrator::cmdlet::Cmdlet;
use corfu_orchestrator::topology::parse_layout_output;
use corfu_orchestrator::{
    Cluster, ClusterConfig, DockerRuntime, Endpoint, Layout, Node, NodeConfig, SharedRuntime,
    Topology,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI arguments for corfu-cluster.
#[derive(Parser, Debug)]
#[command(
    name = "corfu-cluster",
    about = "Provision, bootstrap and tear down containerised Corfu clusters",
    version
)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long)]
    json_logs: bool,

    /// Image for nodes and cmdlets.
    #[arg(long, value_name = "IMAGE")]
    image: Option<String>,

    /// Number of concurrent node operations.
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Print the default configuration and exit.
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Spawn every node of a layout, bootstrap, and print the committed layout.
    Up {
        /// Layout file describing the cluster.
        topology: PathBuf,
    },

    /// Remove every node container of a layout.
    Down {
        /// Layout file describing the cluster.
        topology: PathBuf,
    },

    /// Show the container state of every node of a layout.
    Status {
        /// Layout file describing the cluster.
        topology: PathBuf,
    },

    /// Query the committed layout from layout servers.
    Layout {
        /// Layout server endpoints (host:port, or host for the configured node port).
        #[arg(required = true)]
        endpoints: Vec<String>,
    },

    /// Run a shell command inside a node.
    Exec {
        /// Node endpoint (host:port, or host for the configured node port).
        endpoint: String,

        /// Shell command.
        command: String,
    },

    /// Pause a node.
    Pause {
        /// Node endpoint (host:port, or host for the configured node port).
        endpoint: String,
    },

    /// Unpause a node.
    Unpause {
        /// Node endpoint (host:port, or host for the configured node port).
        endpoint: String,
    },

    /// Start a stopped node.
    Start {
        /// Node endpoint (host:port, or host for the configured node port).
        endpoint: String,
    },

    /// Kill a node's server process.
    Stop {
        /// Node endpoint (host:port, or host for the configured node port).
        endpoint: String,
    },

    /// Copy a node's logs out as a tar archive.
    Logs {
        /// Node endpoint (host:port, or host for the configured node port).
        endpoint: String,

        /// Copy the console log instead of the data log.
        #[arg(long)]
        console: bool,

        /// Destination file.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Initialize tracing with the given configuration.
fn init_tracing(config: &config::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}

fn parse_endpoint(input: &str, config: &ClusterConfig) -> Result<Endpoint> {
    Endpoint::parse_or_default_port(input, config.node.port)
        .with_context(|| format!("Invalid endpoint {:?}", input))
}

fn load_topology(path: &Path) -> Result<Topology> {
    Topology::from_file(path).with_context(|| format!("Failed to load topology from {:?}", path))
}

fn print_layout(layout: &Layout) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(layout)?);
    Ok(())
}

async fn connect_cluster(path: &Path, runtime: SharedRuntime, config: &ClusterConfig) -> Result<Cluster> {
    let topology = load_topology(path)?;
    Cluster::connect(topology, runtime, config.clone())
        .await
        .context("Failed to provision cluster network")
}

async fn run(command: Command, runtime: SharedRuntime, config: &ClusterConfig) -> Result<()> {
    let node = |endpoint: &str| -> Result<Node> {
        let endpoint = parse_endpoint(endpoint, config)?;
        Ok(Node::new(NodeConfig::from_cluster(endpoint, config), runtime.clone()))
    };

    match command {
        Command::Up { topology } => {
            let mut cluster = connect_cluster(&topology, runtime.clone(), config).await?;
            let nodes = cluster.setup().await.context("Cluster setup failed")?;
            info!(nodes = nodes.len(), "Cluster is up");

            if cluster.topology().layout().layout_servers.is_empty() {
                info!("Topology has no layout servers, skipping layout fetch");
                return Ok(());
            }

            info!("Fetching committed layout");
            let layout = cluster
                .committed_layout()
                .await
                .context("Failed to fetch committed layout")?;
            print_layout(&layout)?;
        }
        Command::Down { topology } => {
            let mut cluster = connect_cluster(&topology, runtime.clone(), config).await?;
            cluster.destroy().await.context("Cluster teardown failed")?;
        }
        Command::Status { topology } => {
            let cluster = Cluster::new(load_topology(&topology)?, runtime.clone(), config.clone())?;
            for status in cluster.status().await? {
                let state = status
                    .state
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "absent".to_string());
                println!("{:<24} {:<24} {}", status.endpoint.to_string(), status.container, state);
            }
        }
        Command::Layout { endpoints } => {
            let endpoints = endpoints
                .iter()
                .map(|e| parse_endpoint(e, config))
                .collect::<Result<Vec<_>>>()?;
            let output = Cmdlet::layout_query(config, &endpoints)?
                .with_deadline(config.timeouts.query())
                .run(&runtime)
                .await
                .context("Layout query failed")?;
            print_layout(&parse_layout_output(&output)?)?;
        }
        Command::Exec { endpoint, command } => {
            let output = node(&endpoint)?.execute_command(&command).await?;
            print!("{}", String::from_utf8_lossy(&output));
        }
        Command::Pause { endpoint } => {
            let handle = node(&endpoint)?.pause().await?;
            println!("{} {}", handle.name, handle.state);
        }
        Command::Unpause { endpoint } => {
            let handle = node(&endpoint)?.unpause().await?;
            println!("{} {}", handle.name, handle.state);
        }
        Command::Start { endpoint } => {
            let handle = node(&endpoint)?.start().await?;
            println!("{} {}", handle.name, handle.state);
        }
        Command::Stop { endpoint } => {
            let handle = node(&endpoint)?.stop().await?;
            println!("{} {}", handle.name, handle.state);
        }
        Command::Logs {
            endpoint,
            console,
            output,
        } => {
            let node = node(&endpoint)?;
            let path = if console {
                node.save_console_log(output.as_deref()).await?
            } else {
                node.save_data_log(output.as_deref()).await?
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Handle --print-config
    if args.print_config {
        let config = CliConfig::default();
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        CliConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    // Merge CLI arguments
    config.merge_cli_args(&args);

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    init_tracing(&config.logging)?;

    let Some(command) = args.command else {
        anyhow::bail!("No command given, see --help");
    };

    let runtime: SharedRuntime = Arc::new(
        DockerRuntime::connect()
            .await
            .context("Failed to connect to Docker")?,
    );

    if let Err(e) = run(command, runtime, &config.cluster).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corfu_orchestrator::backend::CmdletBehavior;
    use corfu_orchestrator::InMemoryRuntime;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::parse_from(["corfu-cluster", "up", "layout.json"]);
        assert!(args.config.is_none());
        assert!(!args.json_logs);
        assert!(matches!(args.command, Some(Command::Up { .. })));
    }

    #[test]
    fn test_cli_args_with_options() {
        let args = CliArgs::parse_from([
            "corfu-cluster",
            "--config",
            "cluster.toml",
            "--log-level",
            "debug",
            "logs",
            "10.0.0.1:9000",
            "--console",
            "--output",
            "console.tar",
        ]);

        assert_eq!(args.config, Some(PathBuf::from("cluster.toml")));
        assert_eq!(args.log_level, Some("debug".to_string()));
        match args.command {
            Some(Command::Logs {
                endpoint,
                console,
                output,
            }) => {
                assert_eq!(endpoint, "10.0.0.1:9000");
                assert!(console);
                assert_eq!(output, Some(PathBuf::from("console.tar")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_layout_requires_endpoints() {
        assert!(CliArgs::try_parse_from(["corfu-cluster", "layout"]).is_err());
    }

    #[test]
    fn test_print_config_without_command() {
        let args = CliArgs::parse_from(["corfu-cluster", "--print-config"]);
        assert!(args.print_config);
        assert!(args.command.is_none());
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let dir = tempfile::tempdir().unwrap();
        let layout = r#"{"layoutServers": ["10.0.0.1:9000"], "sequencers": ["10.0.0.1:9000"]}"#;
        let path = dir.path().join("layout.json");
        std::fs::write(&path, layout).unwrap();

        let memory = Arc::new(InMemoryRuntime::new());
        memory
            .set_cmdlet("layout_getter", CmdletBehavior::Output(layout.as_bytes().to_vec()))
            .await;
        let runtime: SharedRuntime = memory.clone();
        let config = ClusterConfig::default();

        run(Command::Up { topology: path.clone() }, runtime.clone(), &config)
            .await
            .unwrap();
        assert_eq!(memory.container_names().await, vec!["10.0.0.1_9000"]);

        run(
            Command::Pause {
                endpoint: "10.0.0.1:9000".to_string(),
            },
            runtime.clone(),
            &config,
        )
        .await
        .unwrap();

        run(Command::Down { topology: path }, runtime, &config).await.unwrap();
        assert_eq!(memory.container_count().await, 0);
    }

    #[tokio::test]
    async fn test_up_empty_topology() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, "{}").unwrap();

        let memory = Arc::new(InMemoryRuntime::new());
        let runtime: SharedRuntime = memory.clone();

        run(Command::Up { topology: path }, runtime, &ClusterConfig::default())
            .await
            .unwrap();
        assert_eq!(memory.container_count().await, 0);
    }

    #[tokio::test]
    async fn test_bare_host_uses_node_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, r#"{"sequencers": ["10.0.0.1:9001"]}"#).unwrap();

        let memory = Arc::new(InMemoryRuntime::new());
        let runtime: SharedRuntime = memory.clone();
        let mut config = ClusterConfig::default();
        config.node.port = 9001;

        run(Command::Up { topology: path }, runtime.clone(), &config)
            .await
            .unwrap();
        run(
            Command::Pause {
                endpoint: "10.0.0.1".to_string(),
            },
            runtime,
            &config,
        )
        .await
        .unwrap();

        let container = memory.container("10.0.0.1_9001").await.unwrap();
        assert!(container.handle.is_paused());
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let runtime: SharedRuntime = Arc::new(InMemoryRuntime::new());
        let err = run(
            Command::Exec {
                endpoint: "10.0.0.1:abc".to_string(),
                command: "ls".to_string(),
            },
            runtime,
            &ClusterConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Invalid endpoint"));
    }
}
