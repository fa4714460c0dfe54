//! Named engine registry

use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::{Engine, EngineError};

/// Builds a stopped engine from its name and configuration
pub type EngineConstructor<E> =
    Arc<dyn Fn(&str, &<E as Engine>::Config) -> Result<E, EngineError> + Send + Sync>;

/// Maps logical names to engine instances, creating on first request.
///
/// Iteration follows creation order. `destroy` only forgets an engine; it
/// never stops it.
pub struct EngineFactory<E: Engine> {
    engines: RwLock<Vec<(String, Arc<E>)>>,
    constructor: EngineConstructor<E>,
}

impl<E: Engine> Default for EngineFactory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> EngineFactory<E> {
    /// Factory constructing engines through `Engine::from_config`
    pub fn new() -> Self {
        Self::with_constructor(Arc::new(|name: &str, config: &E::Config| {
            E::from_config(name, config)
        }))
    }

    pub fn with_constructor(constructor: EngineConstructor<E>) -> Self {
        Self {
            engines: RwLock::new(Vec::new()),
            constructor,
        }
    }

    /// Existing engine for `name`, or a freshly constructed one.
    ///
    /// The config is ignored when the name already exists.
    pub fn create(&self, name: &str, config: &E::Config) -> Result<Arc<E>, EngineError> {
        let mut engines = self.engines.write();
        if let Some((_, engine)) = engines.iter().find(|(n, _)| n == name) {
            return Ok(Arc::clone(engine));
        }

        let engine = Arc::new((self.constructor)(name, config)?);
        engines.push((name.to_string(), Arc::clone(&engine)));
        tracing::debug!(engine = %name, family = E::FAMILY, "Engine created");
        Ok(engine)
    }

    pub fn get(&self, name: &str) -> Option<Arc<E>> {
        self.engines
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| Arc::clone(e))
    }

    /// All engines in creation order, or only the named ones that exist
    pub fn get_all(&self, names: Option<&[&str]>) -> Vec<Arc<E>> {
        let engines = self.engines.read();
        match names {
            None => engines.iter().map(|(_, e)| Arc::clone(e)).collect(),
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    engines
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, e)| Arc::clone(e))
                })
                .collect(),
        }
    }

    /// Forget the engine under `name`. Returns whether one was removed.
    pub fn destroy(&self, name: &str) -> bool {
        let mut engines = self.engines.write();
        let before = engines.len();
        engines.retain(|(n, _)| n != name);
        before != engines.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.engines.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }
}
