//! Engine abstraction
//!
//! An engine owns the pool (or client) of one external data system and
//! exposes an idempotent, reference-counted `start`/`stop` pair plus
//! `session()` to check out a unit of work. Concrete engines live in
//! `crate::engines`; they all embed a [`PoolSlot`] for the counter/pool state.

pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod slot;

pub use error::EngineError;
pub use slot::PoolSlot;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

/// Session handle shared by every consumer nested inside one context.
///
/// The owning context takes the session back out on its last exit, so a
/// handle kept past that point locks to [`EngineError::SessionReleased`].
#[derive(Debug)]
pub struct SharedSession<S> {
    inner: Arc<Mutex<Option<S>>>,
}

impl<S> Clone for SharedSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> SharedSession<S> {
    pub(crate) fn new(session: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// Exclusive access to the session while it is checked out
    pub async fn lock(&self) -> Result<MappedMutexGuard<'_, S>, EngineError> {
        MutexGuard::try_map(self.inner.lock().await, Option::as_mut)
            .map_err(|_| EngineError::SessionReleased)
    }

    /// Whether both handles point at the same session
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Wait for outstanding guards, then remove the session
    pub(crate) async fn take(&self) -> Option<S> {
        self.inner.lock().await.take()
    }
}

/// How a scope ended, passed to session release so engines can commit or
/// roll back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScopeOutcome {
    #[default]
    Success,
    Failure,
}

impl ScopeOutcome {
    /// Outcome matching a result
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Success
        } else {
            Self::Failure
        }
    }

    pub fn is_failure(self) -> bool {
        self == Self::Failure
    }

    /// Failure wins over success
    pub fn merge(self, other: Self) -> Self {
        if self.is_failure() || other.is_failure() {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

/// Engine wrapping one external data-system client
///
/// `start`/`stop` are reference counted: the pool is built on the first
/// `start` and closed on the matching last `stop`. `stop` never fails.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Engine configuration (DSN, pool bounds, family extras)
    type Config: Clone + Send + Sync + 'static;

    /// Unit of work checked out from the pool
    type Session: Send + 'static;

    /// Family tag under which contexts are published in a request scope
    const FAMILY: &'static str;

    /// Build a stopped engine. Validates the configuration but opens nothing.
    fn from_config(name: &str, config: &Self::Config) -> Result<Self, EngineError>
    where
        Self: Sized;

    fn name(&self) -> &str;

    /// Whether at least one `start()` is outstanding
    fn active(&self) -> bool;

    async fn start(&self) -> Result<(), EngineError>;

    async fn stop(&self);

    /// Check out a new session from the running pool
    async fn session(&self) -> Result<Self::Session, EngineError>;

    /// Give a session back to the pool
    async fn release_session(
        &self,
        session: Self::Session,
        _outcome: ScopeOutcome,
    ) -> Result<(), EngineError> {
        drop(session);
        Ok(())
    }

    /// Engine-specific cleanup once a context released its session
    async fn teardown_session(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_of_result() {
        let ok: Result<u8, ()> = Ok(1);
        let err: Result<u8, ()> = Err(());
        assert_eq!(ScopeOutcome::of(&ok), ScopeOutcome::Success);
        assert_eq!(ScopeOutcome::of(&err), ScopeOutcome::Failure);
    }

    #[test]
    fn test_outcome_merge() {
        use ScopeOutcome::*;
        assert_eq!(Success.merge(Success), Success);
        assert_eq!(Success.merge(Failure), Failure);
        assert_eq!(Failure.merge(Success), Failure);
        assert!(ScopeOutcome::default() == Success);
    }
}
