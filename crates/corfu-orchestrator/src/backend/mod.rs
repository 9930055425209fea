//! Container runtime backends.
//!
//! This module provides the trait the orchestrator drives containers
//! through, a Docker implementation and an in-memory implementation. The
//! in-memory one is only built for tests or with the `test-util` feature.

mod docker;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod r#trait;

pub use docker::DockerRuntime;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{CmdletBehavior, InMemoryRuntime, MemoryContainer};
pub use r#trait::{ContainerRuntime, ExecOutput, NetworkHandle, SharedRuntime};
