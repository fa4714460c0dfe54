//! Module orchestrator
//!
//! A `Module` runs the four lifecycle phases over an ordered list of
//! components with stack discipline: create/acquire go front to back,
//! destroy/release back to front. A failed phase unwinds whatever the same
//! call already did before returning the error.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use super::error::LifecycleError;
use super::scope::RequestScope;
use crate::engine::ScopeOutcome;

/// A component with create/destroy and acquire/release phases
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self) -> Result<(), LifecycleError>;

    /// Never fails; problems are logged
    async fn destroy(&self);

    async fn acquire(&self, scope: &RequestScope) -> Result<(), LifecycleError>;

    /// Never fails; problems are logged
    async fn release(&self, scope: &RequestScope, outcome: ScopeOutcome);
}

/// Ordered group of lifecycle components, itself a component
pub struct Module {
    name: String,
    components: Vec<Arc<dyn Lifecycle>>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("components", &self.component_names())
            .finish()
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    /// Append a component (builder form)
    pub fn with(mut self, component: impl Lifecycle + 'static) -> Self {
        self.components.push(Arc::new(component));
        self
    }

    pub fn push(&mut self, component: Arc<dyn Lifecycle>) {
        self.components.push(component);
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Run `f` inside a fresh request scope.
    ///
    /// Every component is acquired before `f` runs and released afterwards
    /// with the outcome of `f`. A panic in `f` releases with a failure
    /// outcome and is then resumed.
    pub async fn run_scoped<F, Fut, T, Er>(&self, f: F) -> Result<T, Er>
    where
        F: FnOnce(Arc<RequestScope>) -> Fut,
        Fut: Future<Output = Result<T, Er>>,
        Er: From<LifecycleError>,
    {
        let scope = Arc::new(RequestScope::new());
        self.acquire(&scope).await?;

        let handler_scope = Arc::clone(&scope);
        let result = AssertUnwindSafe(async move { f(handler_scope).await })
            .catch_unwind()
            .await;

        match result {
            Ok(result) => {
                self.release(&scope, ScopeOutcome::of(&result)).await;
                result
            }
            Err(panic) => {
                tracing::warn!(module = %self.name, scope = %scope.id(), "Scoped handler panicked, releasing");
                self.release(&scope, ScopeOutcome::Failure).await;
                std::panic::resume_unwind(panic)
            }
        }
    }
}

#[async_trait]
impl Lifecycle for Module {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self) -> Result<(), LifecycleError> {
        for (index, component) in self.components.iter().enumerate() {
            if let Err(e) = component.create().await {
                tracing::error!(
                    module = %self.name,
                    component = %component.name(),
                    error = %e,
                    "Component create failed, destroying created components"
                );
                for created in self.components[..index].iter().rev() {
                    created.destroy().await;
                }
                return Err(e);
            }
            tracing::debug!(module = %self.name, component = %component.name(), "Component created");
        }
        Ok(())
    }

    async fn destroy(&self) {
        for component in self.components.iter().rev() {
            component.destroy().await;
            tracing::debug!(module = %self.name, component = %component.name(), "Component destroyed");
        }
    }

    async fn acquire(&self, scope: &RequestScope) -> Result<(), LifecycleError> {
        for (index, component) in self.components.iter().enumerate() {
            if let Err(e) = component.acquire(scope).await {
                tracing::debug!(
                    module = %self.name,
                    component = %component.name(),
                    error = %e,
                    "Component acquire failed, releasing acquired components"
                );
                for acquired in self.components[..index].iter().rev() {
                    acquired.release(scope, ScopeOutcome::Failure).await;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn release(&self, scope: &RequestScope, outcome: ScopeOutcome) {
        for component in self.components.iter().rev() {
            component.release(scope, outcome).await;
        }
    }
}
