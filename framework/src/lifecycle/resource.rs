//! Resource orchestration over one engine family
//!
//! A `Resource` owns the set of engines it manages (one default engine or
//! several named ones), creates and starts them through a shared
//! [`EngineFactory`], and on every acquire enters one [`Context`] per engine
//! and publishes it into the request scope under the family tag.

use std::sync::Arc;

use async_trait::async_trait;

use super::context::{Context, ContextFactory, default_context_factory};
use super::error::LifecycleError;
use super::factory::EngineFactory;
use super::module::Lifecycle;
use super::scope::RequestScope;
use crate::core::constants::DEFAULT_ENGINE_NAME;
use crate::engine::{Engine, EngineError, ScopeOutcome};

/// Engines managed by a resource
#[derive(Debug, Clone)]
pub enum EngineSet<C> {
    /// One engine registered as `default`
    Single(C),
    /// Named engines, kept in declaration order
    Named(Vec<(String, C)>),
}

impl<C> EngineSet<C> {
    pub fn entries(&self) -> Vec<(&str, &C)> {
        match self {
            Self::Single(config) => vec![(DEFAULT_ENGINE_NAME, config)],
            Self::Named(list) => list.iter().map(|(n, c)| (n.as_str(), c)).collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries().into_iter().map(|(n, _)| n).collect()
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Named(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Resource<E: Engine> {
    name: String,
    factory: Arc<EngineFactory<E>>,
    engines: EngineSet<E::Config>,
    context_factory: ContextFactory<E>,
}

impl<E: Engine> Resource<E> {
    pub fn new(factory: Arc<EngineFactory<E>>, engines: EngineSet<E::Config>) -> Self {
        Self {
            name: E::FAMILY.to_string(),
            factory,
            engines,
            context_factory: default_context_factory(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use a custom context constructor (hooks, instrumentation)
    pub fn with_context_factory(mut self, context_factory: ContextFactory<E>) -> Self {
        self.context_factory = context_factory;
        self
    }

    pub fn factory(&self) -> &Arc<EngineFactory<E>> {
        &self.factory
    }

    pub fn engines(&self) -> &EngineSet<E::Config> {
        &self.engines
    }

    /// Create every engine in the factory, then start each in order.
    ///
    /// If a start fails, the engines this call already started are stopped
    /// in reverse before the error is returned.
    pub async fn create_engines(&self) -> Result<(), EngineError> {
        let mut engines = Vec::with_capacity(self.engines.len());
        for (name, config) in self.engines.entries() {
            engines.push(self.factory.create(name, config)?);
        }

        let mut started: Vec<Arc<E>> = Vec::with_capacity(engines.len());
        for engine in engines {
            if let Err(e) = engine.start().await {
                tracing::warn!(
                    resource = %self.name,
                    engine = %engine.name(),
                    error = %e,
                    "Engine start failed, rolling back"
                );
                for started in started.iter().rev() {
                    started.stop().await;
                }
                return Err(e);
            }
            tracing::debug!(resource = %self.name, engine = %engine.name(), family = E::FAMILY, "Engine started");
            started.push(engine);
        }

        Ok(())
    }

    /// Stop every managed engine in reverse creation order
    pub async fn destroy_engines(&self) {
        for name in self.engines.names().into_iter().rev() {
            match self.factory.get(name) {
                Some(engine) => {
                    engine.stop().await;
                    tracing::debug!(resource = %self.name, engine = %name, "Engine stopped");
                }
                None => {
                    tracing::debug!(resource = %self.name, engine = %name, "Engine not in factory, skipping stop");
                }
            }
        }
    }

    /// Enter one context per engine and publish it into `scope`.
    ///
    /// On failure the contexts this call already entered are taken back and
    /// exited with a failure outcome.
    pub async fn acquire_contexts(&self, scope: &RequestScope) -> Result<(), EngineError> {
        let names = self.engines.names();
        let mut acquired: Vec<&str> = Vec::with_capacity(names.len());

        for name in names {
            if let Err(e) = self.acquire_one(scope, name).await {
                for name in acquired.iter().rev() {
                    if let Some(context) = scope.take::<E>(name) {
                        context.exit(ScopeOutcome::Failure).await;
                    }
                }
                return Err(e);
            }
            acquired.push(name);
        }

        Ok(())
    }

    async fn acquire_one(&self, scope: &RequestScope, name: &str) -> Result<(), EngineError> {
        let engine = self
            .factory
            .get(name)
            .ok_or_else(|| EngineError::NotStarted(name.to_string()))?;

        let context: Arc<Context<E>> = Arc::new((self.context_factory)(engine));
        context.enter().await?;

        if let Err(e) = scope.publish(Arc::clone(&context)) {
            context.exit(ScopeOutcome::Failure).await;
            return Err(e);
        }

        tracing::trace!(resource = %self.name, engine = %name, scope = %scope.id(), "Context published");
        Ok(())
    }

    /// Take each engine's context back from `scope` in reverse order and
    /// exit it. Engines with nothing published are skipped.
    pub async fn release_contexts(&self, scope: &RequestScope, outcome: ScopeOutcome) {
        if !scope.contains(E::FAMILY) {
            return;
        }

        for name in self.engines.names().into_iter().rev() {
            if let Some(context) = scope.take::<E>(name) {
                context.exit(outcome).await;
            }
        }
    }
}

#[async_trait]
impl<E: Engine> Lifecycle for Resource<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self) -> Result<(), LifecycleError> {
        self.create_engines()
            .await
            .map_err(|e| LifecycleError::engine(&self.name, e))
    }

    async fn destroy(&self) {
        self.destroy_engines().await
    }

    async fn acquire(&self, scope: &RequestScope) -> Result<(), LifecycleError> {
        self.acquire_contexts(scope)
            .await
            .map_err(|e| LifecycleError::engine(&self.name, e))
    }

    async fn release(&self, scope: &RequestScope, outcome: ScopeOutcome) {
        self.release_contexts(scope, outcome).await
    }
}
