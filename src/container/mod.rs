//! Dependency Container Module
//!
//! Registers named service factories and resolves them on demand, caching
//! singletons and rejecting circular or runaway resolution chains.

#[allow(clippy::module_inception)]
mod container;
mod definition;
mod resolver;

pub use container::Container;
pub use definition::{ContainerOptions, Instance, Placeholder, ServiceOptions};
pub use resolver::Resolver;
