//! Reference-counted pool slot
//!
//! Every engine embeds a `PoolSlot` holding its pool (or client) together with
//! the number of outstanding `start()` calls. The pool exists iff the counter
//! is positive. All transitions run under one async mutex, so concurrent
//! starters never construct the pool twice and a stop never closes a pool that
//! another owner still counts on.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use super::error::EngineError;

struct SlotState<P> {
    counter: usize,
    pool: Option<P>,
}

/// Counter + optional pool behind an async lock
pub struct PoolSlot<P> {
    state: Mutex<SlotState<P>>,
    // Mirror of `state.counter` for lock-free `active()` checks
    counter: AtomicUsize,
}

impl<P> Default for PoolSlot<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PoolSlot<P> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                counter: 0,
                pool: None,
            }),
            counter: AtomicUsize::new(0),
        }
    }

    /// Number of `start()` calls without a matching `stop()`
    pub fn counter(&self) -> usize {
        self.counter.load(Ordering::Acquire)
    }

    /// Whether the pool is currently open
    pub fn is_active(&self) -> bool {
        self.counter() > 0
    }

    /// Increment the counter, opening the pool on the 0 -> 1 transition.
    ///
    /// Returns `true` when this call opened the pool. If `open` fails, the
    /// counter is left untouched and the error is returned.
    pub async fn start<F, Fut>(&self, open: F) -> Result<bool, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<P, EngineError>>,
    {
        let mut state = self.state.lock().await;
        let opened = if state.counter == 0 {
            debug_assert!(state.pool.is_none());
            state.pool = Some(open().await?);
            true
        } else {
            false
        };

        state.counter += 1;
        self.counter.store(state.counter, Ordering::Release);
        Ok(opened)
    }

    /// Decrement the counter (floored at zero), closing the pool on the
    /// 1 -> 0 transition.
    ///
    /// Close errors are logged and swallowed: `stop` always completes.
    /// Returns `true` when this call closed the pool.
    pub async fn stop<F, Fut>(&self, name: &str, close: F) -> bool
    where
        F: FnOnce(P) -> Fut,
        Fut: Future<Output = Result<(), EngineError>>,
    {
        let mut state = self.state.lock().await;
        let mut closed = false;

        if state.counter == 1
            && let Some(pool) = state.pool.take()
        {
            if let Err(e) = close(pool).await {
                tracing::warn!(engine = %name, error = %e, "Engine pool close failed");
            }
            closed = true;
        }

        state.counter = state.counter.saturating_sub(1);
        self.counter.store(state.counter, Ordering::Release);
        closed
    }
}

impl<P: Clone> PoolSlot<P> {
    /// Clone of the open pool, if any
    pub async fn pool(&self) -> Option<P> {
        self.state.lock().await.pool.clone()
    }

    /// Clone of the open pool, or `NotStarted`
    pub async fn require(&self, name: &str) -> Result<P, EngineError> {
        self.pool()
            .await
            .ok_or_else(|| EngineError::NotStarted(name.to_string()))
    }
}
