//! Container error types

use thiserror::Error;

use super::Lifetime;
use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum ContainerError {
    /// No provider registered for the requested type/name
    #[error("No provider registered for {type_name}{}", name_suffix(.name))]
    NotRegistered {
        type_name: &'static str,
        name: Option<String>,
    },

    /// The resolve scope lacks the id the provider's lifetime needs
    #[error("Cannot resolve {type_name}: no {lifetime} id in resolve scope")]
    MissingScope {
        type_name: &'static str,
        lifetime: Lifetime,
    },

    /// Resolution re-entered a provider already being constructed
    #[error("Dependency cycle: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// A cached or constructed value had an unexpected type
    #[error("Provider for {type_name} produced a value of another type")]
    TypeMismatch { type_name: &'static str },

    /// A provider failed to construct its value
    #[error("Failed to construct {type_name}: {reason}")]
    Construction {
        type_name: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn name_suffix(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" named '{name}'"),
        None => String::new(),
    }
}

impl ContainerError {
    pub fn construction(type_name: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Construction {
            type_name,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_registered_display() {
        let err = ContainerError::NotRegistered {
            type_name: "Cache",
            name: None,
        };
        assert_eq!(err.to_string(), "No provider registered for Cache");

        let err = ContainerError::NotRegistered {
            type_name: "Cache",
            name: Some("hot".into()),
        };
        assert_eq!(err.to_string(), "No provider registered for Cache named 'hot'");
    }

    #[test]
    fn test_cycle_display() {
        let err = ContainerError::Cycle {
            chain: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle: A -> B -> A");
    }

    #[test]
    fn test_missing_scope_display() {
        let err = ContainerError::MissingScope {
            type_name: "Repo",
            lifetime: Lifetime::Request,
        };
        assert_eq!(
            err.to_string(),
            "Cannot resolve Repo: no request id in resolve scope"
        );
    }
}
