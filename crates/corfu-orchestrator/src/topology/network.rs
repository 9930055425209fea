//! Cluster network specification and provisioning.
//!
//! Every node joins one bridge network with a fixed address pool, so that
//! the address a node is declared at in the topology can be assigned to its
//! container verbatim.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{ContainerRuntime, NetworkHandle};
use crate::error::{OrchestratorError, Result};

/// Default network name.
pub const DEFAULT_NETWORK_NAME: &str = "corfunet";

/// Default subnet of the cluster network.
pub const DEFAULT_SUBNET: &str = "192.168.0.0/16";

/// Default gateway of the cluster network.
pub const DEFAULT_GATEWAY: &str = "192.168.0.254";

/// Network specification for a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    /// Name of the network.
    pub name: String,

    /// Network driver.
    pub driver: String,

    /// Subnet (CIDR notation).
    pub subnet: String,

    /// Gateway address.
    pub gateway: String,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_NETWORK_NAME.to_string(),
            driver: "bridge".to_string(),
            subnet: DEFAULT_SUBNET.to_string(),
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }
}

impl NetworkSpec {
    /// Creates a new network specification builder.
    pub fn builder(name: impl Into<String>) -> NetworkSpecBuilder {
        NetworkSpecBuilder::new(name)
    }

    /// Checks that the subnet is a valid IPv4 CIDR and contains the gateway.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(OrchestratorError::validation("network name is empty"));
        }

        let (base, prefix) = parse_cidr(&self.subnet)?;
        let gateway: Ipv4Addr = self.gateway.parse().map_err(|_| {
            OrchestratorError::validation(format!("invalid gateway address: {}", self.gateway))
        })?;

        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        if u32::from(base) & mask != u32::from(gateway) & mask {
            return Err(OrchestratorError::validation(format!(
                "gateway {} is outside subnet {}",
                self.gateway, self.subnet
            )));
        }

        Ok(())
    }
}

fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u32)> {
    let invalid = || OrchestratorError::validation(format!("invalid subnet: {}", cidr));

    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let prefix: u32 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }

    Ok((addr, prefix))
}

/// Builder for `NetworkSpec`.
#[derive(Debug)]
pub struct NetworkSpecBuilder {
    spec: NetworkSpec,
}

impl NetworkSpecBuilder {
    /// Creates a new builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            spec: NetworkSpec {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Sets the network driver.
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.spec.driver = driver.into();
        self
    }

    /// Sets the subnet.
    pub fn subnet(mut self, subnet: impl Into<String>) -> Self {
        self.spec.subnet = subnet.into();
        self
    }

    /// Sets the gateway.
    pub fn gateway(mut self, gateway: impl Into<String>) -> Self {
        self.spec.gateway = gateway.into();
        self
    }

    /// Builds the network specification.
    pub fn build(self) -> NetworkSpec {
        self.spec
    }
}

/// Makes sure the network described by `spec` exists.
///
/// Idempotent: an existing network of that name is returned as is, and a
/// concurrent creator winning the race is treated as success. Any other
/// failure is fatal.
pub async fn ensure_network(runtime: &dyn ContainerRuntime, spec: &NetworkSpec) -> Result<NetworkHandle> {
    match runtime.inspect_network(&spec.name).await {
        Ok(network) => {
            debug!(network = %spec.name, id = %network.id, "Using existing network");
            return Ok(network);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    match runtime.create_network(spec).await {
        Ok(network) => {
            info!(
                network = %spec.name,
                subnet = %spec.subnet,
                gateway = %spec.gateway,
                "Created network"
            );
            Ok(network)
        }
        Err(e) if e.is_already_exists() => {
            debug!(network = %spec.name, "Network created concurrently");
            runtime.inspect_network(&spec.name).await
        }
        Err(e @ OrchestratorError::NetworkCreationFailed { .. }) => Err(e),
        Err(e) => Err(OrchestratorError::network_creation_failed(&spec.name, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryRuntime;

    #[test]
    fn test_default_network_spec() {
        let spec = NetworkSpec::default();
        assert_eq!(spec.name, "corfunet");
        assert_eq!(spec.driver, "bridge");
        assert_eq!(spec.subnet, "192.168.0.0/16");
        assert_eq!(spec.gateway, "192.168.0.254");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_network_spec_validation() {
        let spec = NetworkSpec::builder("test").subnet("10.0.0.0/8").gateway("10.0.0.1").build();
        assert!(spec.validate().is_ok());

        let spec = NetworkSpec::builder("test").gateway("10.0.0.1").build();
        assert!(spec.validate().is_err());

        let spec = NetworkSpec::builder("test").subnet("10.0.0.0").build();
        assert!(spec.validate().is_err());

        let spec = NetworkSpec::builder("test").subnet("10.0.0.0/33").build();
        assert!(spec.validate().is_err());

        let spec = NetworkSpec::builder("").build();
        assert!(spec.validate().is_err());
    }

    #[tokio::test]
    async fn test_ensure_network_creates_once() {
        let runtime = InMemoryRuntime::new();
        let spec = NetworkSpec::default();

        let first = ensure_network(&runtime, &spec).await.unwrap();
        let second = ensure_network(&runtime, &spec).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(runtime.calls("create_network").await, 1);
        assert_eq!(runtime.network_spec("corfunet").await, Some(spec));
    }

    #[tokio::test]
    async fn test_ensure_network_concurrent_callers() {
        let runtime = std::sync::Arc::new(InMemoryRuntime::new());
        let spec = NetworkSpec::default();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let runtime = runtime.clone();
                let spec = spec.clone();
                tokio::spawn(async move { ensure_network(runtime.as_ref(), &spec).await })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(runtime.network_count().await, 1);
    }

    #[tokio::test]
    async fn test_ensure_network_propagates_failures() {
        let runtime = InMemoryRuntime::new();
        runtime.fail_network_creation("address pool exhausted").await;

        let err = ensure_network(&runtime, &NetworkSpec::default()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NetworkCreationFailed { .. }));
    }
}
