//! Lifecycle layer: contexts, factories, resources, request scopes, modules

pub mod context;
pub mod error;
pub mod factory;
pub mod module;
pub mod resource;
pub mod scope;

pub use context::{Context, ContextFactory, SessionHooks, default_context_factory};
pub use error::LifecycleError;
pub use factory::{EngineConstructor, EngineFactory};
pub use module::{Lifecycle, Module};
pub use resource::{EngineSet, Resource};
pub use scope::{Published, RequestScope};
