//! Lifecycle orchestration errors

use thiserror::Error;

use crate::container::ContainerError;
use crate::engine::EngineError;

/// Error raised by a lifecycle phase, tagged with the failing component
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Component '{component}' failed: {source}")]
    Engine {
        component: String,
        #[source]
        source: EngineError,
    },

    #[error("Component '{component}' failed to resolve dependencies: {source}")]
    Container {
        component: String,
        #[source]
        source: ContainerError,
    },
}

impl LifecycleError {
    pub fn engine(component: impl Into<String>, source: EngineError) -> Self {
        Self::Engine {
            component: component.into(),
            source,
        }
    }

    pub fn container(component: impl Into<String>, source: ContainerError) -> Self {
        Self::Container {
            component: component.into(),
            source,
        }
    }

    /// Name of the component that failed
    pub fn component(&self) -> &str {
        match self {
            Self::Engine { component, .. } | Self::Container { component, .. } => component,
        }
    }
}
