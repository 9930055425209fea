//! Corfu layout documents.
//!
//! The topology file handed to the orchestrator and the committed layout
//! printed by the layout-query cmdlet share one JSON schema, so a single
//! [`Layout`] type serves both.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::topology::endpoint::Endpoint;

/// A Corfu cluster layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    /// Servers holding the layout.
    #[serde(default)]
    pub layout_servers: Vec<String>,

    /// Sequencer servers.
    #[serde(default)]
    pub sequencers: Vec<String>,

    /// Address-space segments.
    #[serde(default)]
    pub segments: Vec<LayoutSegment>,

    /// Servers currently marked unresponsive.
    #[serde(default)]
    pub unresponsive_servers: Vec<String>,

    /// Layout epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<i64>,

    /// Cluster identifier, in whatever shape the server emits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<serde_json::Value>,
}

/// One segment of the address space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSegment {
    /// Replication mode, e.g. `CHAIN_REPLICATION`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_mode: Option<String>,

    /// First address of the segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    /// Last address of the segment (`-1` when open-ended).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,

    /// Stripes of the segment.
    #[serde(default)]
    pub stripes: Vec<LayoutStripe>,
}

/// One stripe of a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutStripe {
    /// Log servers of the stripe.
    #[serde(default)]
    pub log_servers: Vec<String>,
}

impl Layout {
    /// Parses a layout from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Log servers of the first stripe of the first segment.
    ///
    /// Only that stripe is read; further segments and stripes are not part
    /// of the node set.
    pub fn first_stripe_log_servers(&self) -> &[String] {
        self.segments
            .first()
            .and_then(|segment| segment.stripes.first())
            .map(|stripe| stripe.log_servers.as_slice())
            .unwrap_or(&[])
    }

    /// Resolves the unique endpoints of every role in the layout.
    ///
    /// The union of layout servers, sequencers, first-stripe log servers and
    /// unresponsive servers. An empty union is a valid, empty cluster.
    pub fn endpoints(&self) -> Result<BTreeSet<Endpoint>> {
        self.layout_servers
            .iter()
            .chain(&self.sequencers)
            .chain(self.first_stripe_log_servers())
            .chain(&self.unresponsive_servers)
            .map(|s| Endpoint::parse(s))
            .collect()
    }

    /// Layout servers in declaration order.
    pub fn layout_server_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.layout_servers.iter().map(|s| Endpoint::parse(s)).collect()
    }
}

/// Extracts a layout from cmdlet output.
///
/// The layout tools print log banners and warnings before the payload, so
/// everything before the first `{` is discarded. A `{` inside a warning line
/// would derail this; the tools are not known to emit one. Text after the
/// JSON value is ignored.
pub fn parse_layout_output(output: &[u8]) -> Result<Layout> {
    let text = String::from_utf8_lossy(output);
    let start = text
        .find('{')
        .ok_or_else(|| OrchestratorError::malformed_output("no JSON object in cmdlet output"))?;

    let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Layout>();
    match values.next() {
        Some(Ok(layout)) => Ok(layout),
        Some(Err(e)) => Err(OrchestratorError::malformed_output(e.to_string())),
        None => Err(OrchestratorError::malformed_output("empty payload")),
    }
}

/// A layout loaded from disk, used as the cluster topology.
#[derive(Debug, Clone)]
pub struct Topology {
    layout: Layout,
    path: PathBuf,
}

impl Topology {
    /// Reads and parses a topology file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::fs::canonicalize(path.as_ref())?;
        let text = std::fs::read_to_string(&path)?;
        let layout = Layout::from_json(&text)?;
        Ok(Self { layout, path })
    }

    /// Returns the parsed layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the absolute path of the topology file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves the node set of this topology.
    pub fn endpoints(&self) -> Result<BTreeSet<Endpoint>> {
        self.layout.endpoints()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_NODE: &str = r#"{
        "layoutServers": ["10.0.0.1:9000", "10.0.0.2:9000", "10.0.0.3:9000"],
        "sequencers": ["10.0.0.1:9000"],
        "segments": [{
            "replicationMode": "CHAIN_REPLICATION",
            "start": 0,
            "end": -1,
            "stripes": [{"logServers": ["10.0.0.2:9000", "10.0.0.3:9000"]}]
        }],
        "unresponsiveServers": [],
        "epoch": 0
    }"#;

    fn endpoint_strings(layout: &Layout) -> Vec<String> {
        layout
            .endpoints()
            .unwrap()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_endpoints_deduplicate_across_roles() {
        let layout = Layout::from_json(THREE_NODE).unwrap();
        assert_eq!(
            endpoint_strings(&layout),
            vec!["10.0.0.1:9000", "10.0.0.2:9000", "10.0.0.3:9000"]
        );
    }

    #[test]
    fn test_endpoints_ignore_declaration_order() {
        let mut layout = Layout::from_json(THREE_NODE).unwrap();
        let before = layout.endpoints().unwrap();

        layout.layout_servers.reverse();
        layout.segments[0].stripes[0].log_servers.reverse();
        assert_eq!(layout.endpoints().unwrap(), before);
        assert_eq!(layout.endpoints().unwrap(), layout.endpoints().unwrap());
    }

    #[test]
    fn test_endpoints_include_unresponsive_servers() {
        let mut layout = Layout::from_json(THREE_NODE).unwrap();
        layout.unresponsive_servers.push("10.0.0.9:9000".to_string());
        assert!(endpoint_strings(&layout).contains(&"10.0.0.9:9000".to_string()));
    }

    #[test]
    fn test_only_first_stripe_of_first_segment() {
        let layout = Layout::from_json(
            r#"{
                "layoutServers": [],
                "sequencers": [],
                "segments": [
                    {"stripes": [{"logServers": ["10.0.0.1:9000"]}, {"logServers": ["10.0.0.2:9000"]}]},
                    {"stripes": [{"logServers": ["10.0.0.3:9000"]}]}
                ],
                "unresponsiveServers": []
            }"#,
        )
        .unwrap();
        assert_eq!(endpoint_strings(&layout), vec!["10.0.0.1:9000"]);
    }

    #[test]
    fn test_empty_topology_is_empty_set() {
        let layout = Layout::from_json("{}").unwrap();
        assert!(layout.endpoints().unwrap().is_empty());
        assert!(layout.first_stripe_log_servers().is_empty());
    }

    #[test]
    fn test_malformed_endpoint_is_rejected() {
        let layout = Layout {
            sequencers: vec!["10.0.0.1".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            layout.endpoints().unwrap_err(),
            OrchestratorError::InvalidEndpoint { .. }
        ));
    }

    #[test]
    fn test_parse_output_skips_banner() {
        let output = format!(
            "WARNING: An illegal reflective access operation has occurred\n\
             SLF4J: Defaulting to no-operation logger\n{}\n",
            THREE_NODE
        );
        let layout = parse_layout_output(output.as_bytes()).unwrap();
        assert_eq!(layout.layout_servers.len(), 3);
        assert_eq!(layout.epoch, Some(0));
    }

    #[test]
    fn test_parse_output_ignores_trailing_text() {
        let output = format!("{}\nQuery complete.\n", r#"{"layoutServers": ["10.0.0.1:9000"]}"#);
        let layout = parse_layout_output(output.as_bytes()).unwrap();
        assert_eq!(layout.layout_servers, vec!["10.0.0.1:9000"]);
    }

    #[test]
    fn test_parse_output_without_payload() {
        let err = parse_layout_output(b"Exception in thread main: connection refused").unwrap_err();
        assert!(matches!(err, OrchestratorError::MalformedOutput(_)));

        let err = parse_layout_output(b"warning\n{ not json").unwrap_err();
        assert!(matches!(err, OrchestratorError::MalformedOutput(_)));
    }

    #[test]
    fn test_topology_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, THREE_NODE).unwrap();

        let topology = Topology::from_file(&path).unwrap();
        assert!(topology.path().is_absolute());
        assert_eq!(topology.endpoints().unwrap().len(), 3);
        assert_eq!(topology.layout().sequencers, vec!["10.0.0.1:9000"]);
    }

    #[test]
    fn test_topology_from_missing_file() {
        let err = Topology::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, OrchestratorError::Io(_)));
    }
}
