//! Dependency Container
//!
//! Named factories behind `parking_lot` locks. Singletons are cached after
//! their first build. Each thread's in-flight resolution chain is recorded
//! on the container, so a factory that re-enters through [`Container`]
//! directly is still subject to cycle detection and the depth guard.

use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::container::definition::{
    downcast, ContainerOptions, Factory, Instance, Placeholder, ServiceDefinition, ServiceOptions,
};
use crate::container::Resolver;
use crate::error::ContainerError;

/// Named-service container with singleton caching and cycle detection.
///
/// Cloning is cheap; clones share registrations and singletons.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    options: ContainerOptions,
    services: RwLock<HashMap<String, ServiceDefinition>>,
    singletons: RwLock<HashMap<String, Instance>>,
    /// Chain of tokens whose factories are running, per thread.
    resolving: Mutex<HashMap<ThreadId, Vec<String>>>,
}

/// Marks a chain as in flight on the current thread until dropped, then
/// restores whatever chain was active before.
struct ResolvingGuard<'a> {
    inner: &'a Inner,
    thread: ThreadId,
    previous: Option<Vec<String>>,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        let mut resolving = self.inner.resolving.lock();
        match self.previous.take() {
            Some(chain) => {
                resolving.insert(self.thread, chain);
            }
            None => {
                resolving.remove(&self.thread);
            }
        }
    }
}

impl Container {
    pub fn new(options: ContainerOptions) -> Self {
        debug!(
            strict = options.strict,
            auto_create = options.auto_create,
            max_depth = options.max_depth,
            "Creating new DI container"
        );
        Self {
            inner: Arc::new(Inner {
                options,
                services: RwLock::new(HashMap::new()),
                singletons: RwLock::new(HashMap::new()),
                resolving: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    /// Registers `factory` under `token`, replacing any previous
    /// registration and any singleton it produced.
    pub fn register<T, F>(&self, token: impl Into<String>, factory: F, options: ServiceOptions)
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let token = token.into();
        let type_name = type_name::<T>();
        let factory: Factory = Arc::new(move |resolver: &Resolver<'_>| {
            factory(resolver).map(|instance| Arc::new(instance) as Instance)
        });

        trace!(token = %token, "Acquiring write lock for registration");
        let replaced = self.inner.services.write().insert(
            token.clone(),
            ServiceDefinition {
                factory,
                options: options.clone(),
                type_name,
            },
        );
        self.inner.singletons.write().remove(&token);

        debug!(
            token = %token,
            service = type_name,
            singleton = options.singleton,
            lazy = options.lazy,
            replaced = replaced.is_some(),
            "Service registered in DI container"
        );
    }

    /// Registers an already-built value as a singleton.
    pub fn register_instance<T>(&self, token: impl Into<String>, instance: T)
    where
        T: Any + Send + Sync + Clone,
    {
        self.register(
            token,
            move |_: &Resolver<'_>| Ok(instance.clone()),
            ServiceOptions::new().singleton(),
        );
    }

    // == Resolution ==
    pub fn resolve<T: Any + Send + Sync>(&self, token: &str) -> Result<Arc<T>, ContainerError> {
        downcast(token, self.resolve_any(token)?)
    }

    /// Resolves `token` as a dependency of whatever this thread is already
    /// resolving, so re-entrant calls from inside a factory keep their chain.
    pub fn resolve_any(&self, token: &str) -> Result<Instance, ContainerError> {
        let parents = self.active_chain();
        self.resolve_within(token, &parents)
    }

    /// Like [`resolve`](Self::resolve), but turns a placeholder into
    /// `T::default()`.
    pub fn resolve_or_default<T>(&self, token: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync + Default,
    {
        match self.resolve(token) {
            Err(ContainerError::Placeholder { .. }) => Ok(Arc::new(T::default())),
            other => other,
        }
    }

    /// Resolves `token` as a dependency of the services in `parents`.
    pub(crate) fn resolve_within(
        &self,
        token: &str,
        parents: &[String],
    ) -> Result<Instance, ContainerError> {
        let options = &self.inner.options;
        trace!(token, depth = parents.len(), "Attempting to resolve service");

        if parents.iter().any(|parent| parent == token) {
            let mut chain = parents.to_vec();
            chain.push(token.to_string());
            if options.strict {
                warn!(chain = %chain.join(" -> "), "Circular dependency detected");
                return Err(ContainerError::CircularDependency { chain });
            }
            debug!(chain = %chain.join(" -> "), "Circular dependency tolerated");
            return Ok(self
                .cached_singleton(token)
                .unwrap_or_else(|| Arc::new(Placeholder) as Instance));
        }

        if parents.len() >= options.max_depth {
            warn!(token, max_depth = options.max_depth, "Maximum dependency depth exceeded");
            return Err(ContainerError::DepthExceeded {
                token: token.to_string(),
                max_depth: options.max_depth,
            });
        }

        let Some(definition) = self.inner.services.read().get(token).cloned() else {
            if options.auto_create {
                debug!(token, "Unregistered service auto-created as placeholder");
                return Ok(Arc::new(Placeholder));
            }
            debug!(token, "Service not found in container");
            return Err(ContainerError::ServiceNotFound {
                token: token.to_string(),
            });
        };

        if definition.options.singleton {
            if let Some(instance) = self.cached_singleton(token) {
                trace!(token, "Singleton served from cache");
                return Ok(instance);
            }
        }

        self.create_instance(token, parents, definition)
    }

    fn create_instance(
        &self,
        token: &str,
        parents: &[String],
        definition: ServiceDefinition,
    ) -> Result<Instance, ContainerError> {
        let mut chain = parents.to_vec();
        chain.push(token.to_string());
        let resolver = Resolver::new(self, &chain);

        let result = {
            let _guard = self.enter(&chain);
            (definition.factory)(&resolver)
        };
        let instance = result.map_err(|err| match err.downcast::<ContainerError>() {
            Ok(nested) => nested,
            Err(source) => ContainerError::FactoryFailed {
                token: token.to_string(),
                source,
            },
        })?;

        if !definition.options.singleton {
            debug!(token, service = definition.type_name, "Service resolved successfully");
            return Ok(instance);
        }

        // First stored instance wins if another caller raced us here.
        let stored = Arc::clone(
            self.inner
                .singletons
                .write()
                .entry(token.to_string())
                .or_insert(instance),
        );
        debug!(token, service = definition.type_name, "Singleton created");
        Ok(stored)
    }

    fn cached_singleton(&self, token: &str) -> Option<Instance> {
        self.inner.singletons.read().get(token).cloned()
    }

    fn active_chain(&self) -> Vec<String> {
        self.inner
            .resolving
            .lock()
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_default()
    }

    fn enter(&self, chain: &[String]) -> ResolvingGuard<'_> {
        let thread = thread::current().id();
        let previous = self.inner.resolving.lock().insert(thread, chain.to_vec());
        ResolvingGuard {
            inner: &self.inner,
            thread,
            previous,
        }
    }

    // == Introspection ==
    pub fn has(&self, token: &str) -> bool {
        let exists = self.inner.services.read().contains_key(token);
        trace!(token, exists, "Checked service existence");
        exists
    }

    /// Registered tokens in sorted order.
    pub fn registered_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.inner.services.read().keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn is_instantiated(&self, token: &str) -> bool {
        self.inner.singletons.read().contains_key(token)
    }

    /// Drops every registration, cached singleton and in-flight marker.
    pub fn clear(&self) {
        let count = {
            let mut services = self.inner.services.write();
            let count = services.len();
            services.clear();
            count
        };
        self.inner.singletons.write().clear();
        self.inner.resolving.lock().clear();
        debug!(service_count = count, "Cleared all services from container");
    }

    // == Lifecycle ==
    /// Resolves every non-lazy service, returning the first failure.
    pub async fn initialize_all(&self) -> Result<(), ContainerError> {
        let eager: Vec<String> = self
            .inner
            .services
            .read()
            .iter()
            .filter(|(_, definition)| !definition.options.lazy)
            .map(|(token, _)| token.clone())
            .collect();
        let count = eager.len();

        try_join_all(
            eager
                .into_iter()
                .map(|token| async move { self.resolve_any(&token).map(drop) }),
        )
        .await?;

        info!(service_count = count, "Initialized eager services");
        Ok(())
    }

    /// Checks declared dependencies without running any factory: every
    /// dependency must be registered and the declared graph must be acyclic.
    pub fn validate_dependencies(&self) -> Result<(), ContainerError> {
        let graph: HashMap<String, Vec<String>> = self
            .inner
            .services
            .read()
            .iter()
            .map(|(token, definition)| (token.clone(), definition.options.dependencies.clone()))
            .collect();

        let mut roots: Vec<&String> = graph.keys().collect();
        roots.sort();

        let mut visited = HashSet::new();
        let mut path = Vec::new();
        for root in roots {
            visit(&graph, root, &mut path, &mut visited)?;
        }
        Ok(())
    }
}

fn visit(
    graph: &HashMap<String, Vec<String>>,
    token: &str,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
) -> Result<(), ContainerError> {
    if path.iter().any(|step| step == token) {
        let mut chain = path.clone();
        chain.push(token.to_string());
        return Err(ContainerError::CircularDependency { chain });
    }
    if visited.contains(token) {
        return Ok(());
    }

    path.push(token.to_string());
    for dependency in graph.get(token).into_iter().flatten() {
        if !graph.contains_key(dependency) {
            return Err(ContainerError::MissingDependency {
                token: token.to_string(),
                dependency: dependency.clone(),
            });
        }
        visit(graph, dependency, path, visited)?;
    }
    path.pop();
    visited.insert(token.to_string());
    Ok(())
}

impl Default for Container {
    fn default() -> Self {
        Self::new(ContainerOptions::default())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("options", &self.inner.options)
            .field("services", &self.registered_tokens())
            .finish()
    }
}
