//! Cluster topology: endpoints, layout documents and the cluster network.

mod endpoint;
mod layout;
mod network;

pub use endpoint::{join_endpoints, Endpoint};
pub use layout::{parse_layout_output, Layout, LayoutSegment, LayoutStripe, Topology};
pub use network::{
    ensure_network, NetworkSpec, NetworkSpecBuilder, DEFAULT_GATEWAY, DEFAULT_NETWORK_NAME,
    DEFAULT_SUBNET,
};
