//! Node endpoints.
//!
//! An endpoint is the `host:port` pair a Corfu server listens on. It is the
//! identity of a node: the container name, the static network address and
//! the launch command are all derived from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// A `host:port` pair identifying one node.
///
/// Both parts keep the exact text they were parsed from, so `"10.0.0.1:09000"`
/// and `"10.0.0.1:9000"` are different endpoints with different containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: String,
}

impl Endpoint {
    /// Creates an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: port.to_string(),
        }
    }

    /// Parses a `host:port` string.
    ///
    /// The port is taken from the last `:`. An empty host, a missing
    /// separator or a port outside `1..=65535` is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| OrchestratorError::invalid_endpoint(input, "missing ':' separator"))?;

        if host.is_empty() {
            return Err(OrchestratorError::invalid_endpoint(input, "empty host"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(OrchestratorError::invalid_endpoint(input, "whitespace in host"));
        }

        match port.parse::<u16>() {
            Ok(number) if number != 0 => {}
            _ => {
                return Err(OrchestratorError::invalid_endpoint(
                    input,
                    "port is not a number in 1..=65535",
                ))
            }
        }

        Ok(Self {
            host: host.to_string(),
            port: port.to_string(),
        })
    }

    /// Parses `host:port`, or a bare `host` that gets `default_port`.
    pub fn parse_or_default_port(input: &str, default_port: u16) -> Result<Self> {
        if input.contains(':') {
            Self::parse(input)
        } else {
            Self::parse(&format!("{}:{}", input, default_port))
        }
    }

    /// Returns the host part.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port, exactly as written.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Returns the container name for this endpoint: every `:` becomes `_`.
    pub fn container_name(&self) -> String {
        self.to_string().replace(':', "_")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = OrchestratorError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Joins endpoints with `,` in the given order.
pub fn join_endpoints(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(Endpoint::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let endpoint = Endpoint::parse("192.168.0.5:9000").unwrap();
        assert_eq!(endpoint.host(), "192.168.0.5");
        assert_eq!(endpoint.port(), "9000");
        assert_eq!(endpoint.to_string(), "192.168.0.5:9000");
    }

    #[test]
    fn test_container_name() {
        let endpoint: Endpoint = "192.168.0.5:9000".parse().unwrap();
        assert_eq!(endpoint.container_name(), "192.168.0.5_9000");

        let endpoint = Endpoint::new("corfu-1", 9001);
        assert_eq!(endpoint.container_name(), "corfu-1_9001");
    }

    #[test]
    fn test_port_text_is_kept() {
        let padded = Endpoint::parse("10.0.0.1:09000").unwrap();
        assert_eq!(padded.port(), "09000");
        assert_eq!(padded.to_string(), "10.0.0.1:09000");
        assert_eq!(padded.container_name(), "10.0.0.1_09000");

        let signed = Endpoint::parse("10.0.0.1:+9000").unwrap();
        let plain = Endpoint::parse("10.0.0.1:9000").unwrap();
        assert_ne!(signed, plain);
        assert_ne!(padded, plain);
        assert_eq!(
            join_endpoints(&[padded, plain]),
            "10.0.0.1:09000,10.0.0.1:9000"
        );
    }

    #[test]
    fn test_parse_or_default_port() {
        let endpoint = Endpoint::parse_or_default_port("10.0.0.1", 9000).unwrap();
        assert_eq!(endpoint.to_string(), "10.0.0.1:9000");

        let endpoint = Endpoint::parse_or_default_port("10.0.0.1:9001", 9000).unwrap();
        assert_eq!(endpoint.port(), "9001");

        assert!(Endpoint::parse_or_default_port("", 9000).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", "10.0.0.1", ":9000", "10.0.0.1:", "10.0.0.1:abc", "10.0.0.1:70000", "10.0.0.1:0", "a b:9000"] {
            let err = Endpoint::parse(input).unwrap_err();
            assert!(
                matches!(err, OrchestratorError::InvalidEndpoint { .. }),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let endpoint = Endpoint::new("10.0.0.1", 9000);
        let json = serde_json::to_string(&endpoint).unwrap();
        assert_eq!(json, "\"10.0.0.1:9000\"");

        let parsed: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, endpoint);

        assert!(serde_json::from_str::<Endpoint>("\"no-port\"").is_err());
    }

    #[test]
    fn test_join_endpoints_keeps_order() {
        let endpoints = vec![Endpoint::new("10.0.0.2", 9000), Endpoint::new("10.0.0.1", 9000)];
        assert_eq!(join_endpoints(&endpoints), "10.0.0.2:9000,10.0.0.1:9000");
    }
}
