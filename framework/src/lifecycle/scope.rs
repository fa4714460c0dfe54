//! Request-scoped context storage
//!
//! A `RequestScope` is created per unit of work (request, job, CLI command)
//! and passed explicitly to `acquire`/`release` and to handlers. Resources
//! publish their entered contexts here keyed by the engine family tag.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::context::Context;
use crate::engine::{Engine, EngineError, SharedSession};

/// Contexts published under one family tag
pub enum Published<E: Engine> {
    /// Exactly one engine published
    Single(Arc<Context<E>>),
    /// Several engines, keyed by engine name
    Named(BTreeMap<String, Arc<Context<E>>>),
}

impl<E: Engine> Published<E> {
    /// Add `context`; hands `self` back untouched if its name is taken
    fn insert(self, context: Arc<Context<E>>) -> Result<Self, Self> {
        if self.get(Some(context.name())).is_some() {
            return Err(self);
        }
        Ok(match self {
            Self::Single(existing) => {
                let mut map = BTreeMap::new();
                map.insert(existing.name().to_string(), existing);
                map.insert(context.name().to_string(), context);
                Self::Named(map)
            }
            Self::Named(mut map) => {
                map.insert(context.name().to_string(), context);
                Self::Named(map)
            }
        })
    }

    /// Remove `name`; returns the taken context and what is left, if anything
    fn remove(self, name: &str) -> (Option<Arc<Context<E>>>, Option<Self>) {
        match self {
            Self::Single(ctx) if ctx.name() == name => (Some(ctx), None),
            Self::Single(ctx) => (None, Some(Self::Single(ctx))),
            Self::Named(mut map) => {
                let taken = map.remove(name);
                let rest = match map.len() {
                    0 => None,
                    1 => map.into_values().next().map(Self::Single),
                    _ => Some(Self::Named(map)),
                };
                (taken, rest)
            }
        }
    }

    fn get(&self, name: Option<&str>) -> Option<Arc<Context<E>>> {
        match (self, name) {
            (Self::Single(ctx), None) => Some(Arc::clone(ctx)),
            (Self::Single(ctx), Some(name)) if ctx.name() == name => Some(Arc::clone(ctx)),
            (Self::Single(_), Some(_)) => None,
            (Self::Named(_), None) => None,
            (Self::Named(map), Some(name)) => map.get(name).cloned(),
        }
    }

    fn all(&self) -> Vec<Arc<Context<E>>> {
        match self {
            Self::Single(ctx) => vec![Arc::clone(ctx)],
            Self::Named(map) => map.values().cloned().collect(),
        }
    }
}

type Slot = Box<dyn Any + Send + Sync>;

/// Explicit request-scoped storage handle
pub struct RequestScope {
    id: Uuid,
    entries: Mutex<HashMap<&'static str, Slot>>,
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("tags", &self.tags())
            .finish()
    }
}

impl RequestScope {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publish an entered context under `E::FAMILY`.
    ///
    /// The first publication stores it as a single value; a second engine
    /// under the same tag switches to the name-keyed map. An engine name
    /// already published under the tag is rejected, so an entered context is
    /// never displaced without being exited.
    pub fn publish<E: Engine>(&self, context: Arc<Context<E>>) -> Result<(), EngineError> {
        let mut entries = self.entries.lock();
        let name = context.name().to_string();

        let next = match entries.remove(E::FAMILY) {
            None => Published::Single(context),
            Some(slot) => match slot.downcast::<Published<E>>() {
                Ok(published) => match published.insert(context) {
                    Ok(next) => next,
                    Err(published) => {
                        let engine = name.to_string();
                        entries.insert(E::FAMILY, Box::new(published));
                        return Err(EngineError::NameConflict {
                            tag: E::FAMILY,
                            engine,
                        });
                    }
                },
                Err(slot) => {
                    entries.insert(E::FAMILY, slot);
                    return Err(EngineError::TagConflict { tag: E::FAMILY });
                }
            },
        };

        entries.insert(E::FAMILY, Box::new(next));
        Ok(())
    }

    /// Remove and return the context of engine `name`. The tag disappears once
    /// its last context is taken.
    pub fn take<E: Engine>(&self, name: &str) -> Option<Arc<Context<E>>> {
        let mut entries = self.entries.lock();
        let slot = entries.remove(E::FAMILY)?;

        let published = match slot.downcast::<Published<E>>() {
            Ok(published) => *published,
            Err(slot) => {
                entries.insert(E::FAMILY, slot);
                return None;
            }
        };

        let (taken, rest) = published.remove(name);
        if let Some(rest) = rest {
            entries.insert(E::FAMILY, Box::new(rest));
        }
        taken
    }

    /// Context of engine `name`, or the only context when `name` is `None`
    pub fn context<E: Engine>(&self, name: Option<&str>) -> Option<Arc<Context<E>>> {
        let entries = self.entries.lock();
        entries
            .get(E::FAMILY)?
            .downcast_ref::<Published<E>>()?
            .get(name)
    }

    /// Shared session of a published context
    pub async fn session<E: Engine>(
        &self,
        name: Option<&str>,
    ) -> Option<SharedSession<E::Session>> {
        let context = self.context::<E>(name)?;
        context.session().await
    }

    /// Every context published under `E::FAMILY`, map entries in name order
    pub fn published<E: Engine>(&self) -> Vec<Arc<Context<E>>> {
        let entries = self.entries.lock();
        entries
            .get(E::FAMILY)
            .and_then(|slot| slot.downcast_ref::<Published<E>>())
            .map(Published::all)
            .unwrap_or_default()
    }

    /// Whether `tag` currently holds a single context (not a map)
    pub fn is_single<E: Engine>(&self) -> bool {
        let entries = self.entries.lock();
        matches!(
            entries
                .get(E::FAMILY)
                .and_then(|slot| slot.downcast_ref::<Published<E>>()),
            Some(Published::Single(_))
        )
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.lock().contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.entries.lock().keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
