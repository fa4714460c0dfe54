//! Type-keyed dependency injection container
//!
//! Providers are registered per `(TypeId, name)` with a constructor and a
//! [`Lifetime`]. Constructors receive a [`Resolver`] and pull their own
//! dependencies through it, which is also where dependency cycles are caught.
//! Built instances are cached per lifetime scope:
//!
//! | lifetime    | cached per              |
//! |-------------|-------------------------|
//! | `Process`   | container               |
//! | `Component` | component id            |
//! | `Session`   | session id              |
//! | `Request`   | request id              |
//! | `Transient` | never cached            |

pub mod error;
pub mod registry;

pub use error::ContainerError;
pub use registry::NamedRegistry;

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::lifecycle::RequestScope;

type Instance = dyn Any + Send + Sync;
type BuildFn = dyn Fn(&Resolver<'_>) -> Result<Arc<Instance>, ContainerError> + Send + Sync;

/// How long a resolved instance is reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    Process,
    Component,
    Session,
    Request,
    Transient,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Process => "process",
            Self::Component => "component",
            Self::Session => "session",
            Self::Request => "request",
            Self::Transient => "transient",
        };
        f.write_str(name)
    }
}

/// Cache partition for one lifetime scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Process,
    Component(String),
    Session(Uuid),
    Request(Uuid),
}

/// Scope ids available to a resolution
#[derive(Debug, Clone, Default)]
pub struct ResolveScope {
    pub component: Option<String>,
    pub session: Option<Uuid>,
    pub request: Option<Uuid>,
}

impl ResolveScope {
    /// Scope with no ids; only process and transient providers resolve
    pub fn process() -> Self {
        Self::default()
    }

    /// Scope keyed by a request scope's id
    pub fn for_request(scope: &RequestScope) -> Self {
        Self {
            request: Some(scope.id()),
            ..Self::default()
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_session(mut self, session: Uuid) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_request(mut self, request: Uuid) -> Self {
        self.request = Some(request);
        self
    }

    /// Cache partition for `lifetime`; `Ok(None)` means not cached
    fn key_for(
        &self,
        lifetime: Lifetime,
        type_name: &'static str,
    ) -> Result<Option<ScopeKey>, ContainerError> {
        let missing = || ContainerError::MissingScope {
            type_name,
            lifetime,
        };
        Ok(match lifetime {
            Lifetime::Process => Some(ScopeKey::Process),
            Lifetime::Component => Some(ScopeKey::Component(
                self.component.clone().ok_or_else(missing)?,
            )),
            Lifetime::Session => Some(ScopeKey::Session(self.session.ok_or_else(missing)?)),
            Lifetime::Request => Some(ScopeKey::Request(self.request.ok_or_else(missing)?)),
            Lifetime::Transient => None,
        })
    }
}

struct Provider {
    lifetime: Lifetime,
    type_name: &'static str,
    build: Box<BuildFn>,
}

#[derive(Default)]
pub struct Container {
    providers: RwLock<NamedRegistry<TypeId, Provider>>,
    instances: RwLock<HashMap<ScopeKey, NamedRegistry<TypeId, Instance>>>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("providers", &self.providers.read().len())
            .field("scopes", &self.instances.read().len())
            .finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the unnamed provider of `T`. Returns `false` if one exists.
    pub fn register<T, F>(&self, lifetime: Lifetime, f: F) -> bool
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert_provider::<T, F>(None, lifetime, f)
    }

    /// Register a named provider of `T`. Returns `false` if the name is taken.
    pub fn register_named<T, F>(&self, name: &str, lifetime: Lifetime, f: F) -> bool
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert_provider::<T, F>(Some(name), lifetime, f)
    }

    /// Register an already built process-wide value
    pub fn register_instance<T: Any + Send + Sync>(&self, value: T) -> bool {
        self.register_shared(Arc::new(value))
    }

    /// Register an already shared process-wide value
    pub fn register_shared<T: Any + Send + Sync>(&self, value: Arc<T>) -> bool {
        let value: Arc<Instance> = value;
        let provider = Provider {
            lifetime: Lifetime::Process,
            type_name: type_name::<T>(),
            build: Box::new(move |_| Ok(Arc::clone(&value))),
        };
        self.providers
            .write()
            .set(TypeId::of::<T>(), Arc::new(provider), None)
    }

    fn insert_provider<T, F>(&self, name: Option<&str>, lifetime: Lifetime, f: F) -> bool
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        let provider = Provider {
            lifetime,
            type_name: type_name::<T>(),
            build: Box::new(move |resolver| {
                let value: Arc<Instance> = Arc::new(f(resolver)?);
                Ok(value)
            }),
        };
        let added = self
            .providers
            .write()
            .set(TypeId::of::<T>(), Arc::new(provider), name);
        if !added {
            tracing::warn!(
                type_name = type_name::<T>(),
                name = name.unwrap_or_default(),
                "Provider already registered, keeping the existing one"
            );
        }
        added
    }

    pub fn is_registered<T: Any>(&self, name: Option<&str>) -> bool {
        self.providers.read().has(&TypeId::of::<T>(), name)
    }

    /// Remove a provider; cached instances stay until their scope is cleared
    pub fn unregister<T: Any>(&self, name: Option<&str>) -> bool {
        self.providers.write().remove(&TypeId::of::<T>(), name)
    }

    pub fn resolve<T: Any + Send + Sync>(
        &self,
        scope: &ResolveScope,
    ) -> Result<Arc<T>, ContainerError> {
        Resolver::new(self, scope).resolve::<T>()
    }

    pub fn resolve_named<T: Any + Send + Sync>(
        &self,
        name: &str,
        scope: &ResolveScope,
    ) -> Result<Arc<T>, ContainerError> {
        Resolver::new(self, scope).resolve_named::<T>(name)
    }

    /// Drop every instance cached for `scope`. Returns how many were dropped.
    pub fn clear_scope(&self, scope: &ScopeKey) -> usize {
        self.instances
            .write()
            .remove(scope)
            .map(|cached| cached.len())
            .unwrap_or(0)
    }

    fn cached(&self, key: &ScopeKey, type_id: &TypeId, name: &str) -> Option<Arc<Instance>> {
        self.instances.read().get(key)?.get(type_id, Some(name))
    }

    /// Cache `value`, or return the instance another resolution cached first
    fn store(
        &self,
        key: ScopeKey,
        type_id: TypeId,
        name: &str,
        value: Arc<Instance>,
    ) -> Arc<Instance> {
        let mut instances = self.instances.write();
        let cache = instances.entry(key).or_default();
        if let Some(existing) = cache.get(&type_id, Some(name)) {
            return existing;
        }
        cache.set(type_id, Arc::clone(&value), Some(name));
        value
    }
}

/// Resolution handle passed to provider constructors
pub struct Resolver<'a> {
    container: &'a Container,
    scope: &'a ResolveScope,
    stack: RefCell<Vec<(TypeId, String, &'static str)>>,
}

impl<'a> Resolver<'a> {
    fn new(container: &'a Container, scope: &'a ResolveScope) -> Self {
        Self {
            container,
            scope,
            stack: RefCell::new(Vec::new()),
        }
    }

    pub fn scope(&self) -> &ResolveScope {
        self.scope
    }

    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ContainerError> {
        self.resolve_inner::<T>(None)
    }

    pub fn resolve_named<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, ContainerError> {
        self.resolve_inner::<T>(Some(name))
    }

    fn resolve_inner<T: Any + Send + Sync>(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<T>, ContainerError> {
        let type_id = TypeId::of::<T>();
        let type_label = type_name::<T>();

        let (registered_name, provider) = self
            .container
            .providers
            .read()
            .entry(&type_id, name)
            .ok_or_else(|| ContainerError::NotRegistered {
                type_name: type_label,
                name: name.map(str::to_string),
            })?;

        if self
            .stack
            .borrow()
            .iter()
            .any(|(id, n, _)| *id == type_id && *n == registered_name)
        {
            let mut chain: Vec<String> = self
                .stack
                .borrow()
                .iter()
                .map(|(_, _, label)| label.to_string())
                .collect();
            chain.push(type_label.to_string());
            return Err(ContainerError::Cycle { chain });
        }

        let scope_key = self.scope.key_for(provider.lifetime, provider.type_name)?;
        if let Some(key) = &scope_key
            && let Some(cached) = self.container.cached(key, &type_id, &registered_name)
        {
            return downcast::<T>(cached);
        }

        self.stack
            .borrow_mut()
            .push((type_id, registered_name.clone(), type_label));
        let built = (provider.build)(self);
        self.stack.borrow_mut().pop();
        let built = built?;

        let value = match scope_key {
            Some(key) => self
                .container
                .store(key, type_id, &registered_name, built),
            None => built,
        };
        downcast::<T>(value)
    }
}

fn downcast<T: Any + Send + Sync>(value: Arc<Instance>) -> Result<Arc<T>, ContainerError> {
    value
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            type_name: type_name::<T>(),
        })
}
