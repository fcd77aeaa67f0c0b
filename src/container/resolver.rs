//! Factory-side resolution handle
//!
//! A [`Resolver`] is lent to each factory while it runs and resolves
//! dependencies as children of that factory's service.

use std::any::Any;
use std::sync::Arc;

use crate::container::definition::{downcast, Instance};
use crate::container::Container;
use crate::error::ContainerError;

/// Handle passed to factories for resolving their own dependencies.
///
/// Carries the chain of tokens currently being resolved, which the container
/// checks for cycles and depth before building each dependency.
pub struct Resolver<'a> {
    container: &'a Container,
    chain: &'a [String],
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(container: &'a Container, chain: &'a [String]) -> Self {
        Self { container, chain }
    }

    pub fn resolve<T: Any + Send + Sync>(&self, token: &str) -> Result<Arc<T>, ContainerError> {
        downcast(token, self.resolve_any(token)?)
    }

    pub fn resolve_any(&self, token: &str) -> Result<Instance, ContainerError> {
        self.container.resolve_within(token, self.chain)
    }

    pub fn resolve_or_default<T>(&self, token: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync + Default,
    {
        match self.resolve(token) {
            Err(ContainerError::Placeholder { .. }) => Ok(Arc::new(T::default())),
            other => other,
        }
    }

    /// Tokens being resolved, outermost first; the last one is the service
    /// whose factory holds this resolver.
    pub fn chain(&self) -> &[String] {
        self.chain
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn container(&self) -> &Container {
        self.container
    }
}
