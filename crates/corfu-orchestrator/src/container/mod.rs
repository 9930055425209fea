//! Container handles, states and run specifications.

mod lifecycle;
mod spec;

pub use lifecycle::{ContainerHandle, ContainerState};
pub use spec::{RunSpec, VolumeMount};
