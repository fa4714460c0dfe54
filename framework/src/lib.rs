//! Lifecycle-managed engines for external data systems.
//!
//! Engines own connection pools and start/stop them by reference count.
//! Contexts share one session per engine across nested consumers, resources
//! publish contexts into a [`lifecycle::RequestScope`], and modules order the
//! whole thing. A small [`container::Container`] wires providers by type.

pub mod app;
pub mod container;
pub mod core;
pub mod engine;
pub mod engines;
pub mod lifecycle;

pub use container::{Container, ContainerError, Lifetime, ResolveScope};
pub use engine::{Engine, EngineError, ScopeOutcome, SharedSession};
pub use lifecycle::{
    Context, EngineFactory, EngineSet, Lifecycle, LifecycleError, Module, RequestScope, Resource,
};
