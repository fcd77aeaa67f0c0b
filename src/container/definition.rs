//! Registration records and options for the dependency container.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::container::Resolver;
use crate::error::ContainerError;

/// A resolved service, type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory = Arc<dyn Fn(&Resolver<'_>) -> anyhow::Result<Instance> + Send + Sync>;

/// Container-wide behavior switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Fail on circular resolution instead of handing back a placeholder
    pub strict: bool,
    /// Return a placeholder for unregistered tokens instead of failing
    pub auto_create: bool,
    /// Longest resolution chain allowed
    pub max_depth: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            strict: true,
            auto_create: false,
            max_depth: 10,
        }
    }
}

impl ContainerOptions {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Per-registration lifecycle settings. Defaults to a transient, eager
/// service with no declared dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOptions {
    pub singleton: bool,
    pub lazy: bool,
    pub dependencies: Vec<String>,
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Skipped by `initialize_all`.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn depends_on(mut self, token: impl Into<String>) -> Self {
        self.dependencies.push(token.into());
        self
    }
}

/// Empty stand-in handed out by auto-create and non-strict cycle resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placeholder;

#[derive(Clone)]
pub(crate) struct ServiceDefinition {
    pub factory: Factory,
    pub options: ServiceOptions,
    pub type_name: &'static str,
}

/// Recovers the concrete type behind `instance`.
pub(crate) fn downcast<T: Any + Send + Sync>(
    token: &str,
    instance: Instance,
) -> Result<Arc<T>, ContainerError> {
    instance.downcast::<T>().map_err(|instance| {
        if instance.is::<Placeholder>() {
            ContainerError::Placeholder {
                token: token.to_string(),
            }
        } else {
            ContainerError::TypeMismatch {
                token: token.to_string(),
                expected: type_name::<T>(),
            }
        }
    })
}
