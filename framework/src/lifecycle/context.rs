//! Reference-counted session context
//!
//! A `Context` lets nested scopes share one session drawn from an engine.
//! The first `enter()` checks out the session, later entries reuse it, and
//! only the last matching `exit()` gives it back. Counter arithmetic runs
//! under an async mutex so two concurrent entrants never both acquire.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::engine::{Engine, EngineError, ScopeOutcome, SharedSession};

/// Optional hooks run around the shared session's lifetime
#[async_trait]
pub trait SessionHooks<S: Send + 'static>: Send + Sync {
    /// Runs right after the session is checked out (0 -> 1)
    async fn setup(&self, _session: &mut S) -> Result<(), EngineError> {
        Ok(())
    }

    /// Runs right before the session is released (1 -> 0)
    async fn teardown(&self, _session: &mut S, _outcome: ScopeOutcome) {}
}

/// Builds a context for an engine; resources call this once per acquire
pub type ContextFactory<E> = Arc<dyn Fn(Arc<E>) -> Context<E> + Send + Sync>;

/// Factory producing plain contexts without hooks
pub fn default_context_factory<E: Engine>() -> ContextFactory<E> {
    Arc::new(Context::new)
}

struct ContextState<S> {
    counter: usize,
    session: Option<SharedSession<S>>,
    outcome: ScopeOutcome,
}

/// Nested-entry session sharing over one engine
pub struct Context<E: Engine> {
    engine: Arc<E>,
    hooks: Option<Arc<dyn SessionHooks<E::Session>>>,
    state: Mutex<ContextState<E::Session>>,
}

impl<E: Engine> std::fmt::Debug for Context<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("family", &E::FAMILY)
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl<E: Engine> Context<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            hooks: None,
            state: Mutex::new(ContextState {
                counter: 0,
                session: None,
                outcome: ScopeOutcome::Success,
            }),
        }
    }

    pub fn with_hooks(engine: Arc<E>, hooks: Arc<dyn SessionHooks<E::Session>>) -> Self {
        let mut context = Self::new(engine);
        context.hooks = Some(hooks);
        context
    }

    /// Name of the wrapped engine
    pub fn name(&self) -> &str {
        self.engine.name()
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Current nesting depth
    pub async fn depth(&self) -> usize {
        self.state.lock().await.counter
    }

    /// Session shared by the current entries, if any
    pub async fn session(&self) -> Option<SharedSession<E::Session>> {
        self.state.lock().await.session.clone()
    }

    /// Enter the context, checking out a session on the outermost entry.
    ///
    /// On failure the depth is unchanged and any checked-out session has been
    /// handed back to the engine.
    pub async fn enter(&self) -> Result<SharedSession<E::Session>, EngineError> {
        let mut state = self.state.lock().await;

        if let Some(session) = &state.session {
            let session = session.clone();
            state.counter += 1;
            return Ok(session);
        }

        let mut session = self.engine.session().await?;

        if let Some(hooks) = &self.hooks
            && let Err(e) = hooks.setup(&mut session).await
        {
            if let Err(release_err) = self
                .engine
                .release_session(session, ScopeOutcome::Failure)
                .await
            {
                tracing::debug!(
                    engine = %self.engine.name(),
                    error = %release_err,
                    "Session release after failed setup failed"
                );
            }
            self.engine.teardown_session().await;
            return Err(e);
        }

        let shared = SharedSession::new(session);
        state.session = Some(shared.clone());
        state.counter = 1;
        state.outcome = ScopeOutcome::Success;

        tracing::trace!(engine = %self.engine.name(), family = E::FAMILY, "Context entered");
        Ok(shared)
    }

    /// Leave the context, releasing the session on the outermost exit.
    ///
    /// The final exit waits until no caller holds the session lock, so it
    /// must not be awaited while the same task holds a guard.
    ///
    /// A failure reported by any nested exit is remembered and passed to the
    /// final release. Release errors are logged, never returned. Exiting an
    /// idle context does nothing.
    pub async fn exit(&self, outcome: ScopeOutcome) {
        let mut state = self.state.lock().await;

        if state.counter == 0 {
            tracing::trace!(engine = %self.engine.name(), "Exit on idle context ignored");
            return;
        }

        state.counter -= 1;
        state.outcome = state.outcome.merge(outcome);
        if state.counter > 0 {
            return;
        }

        let outcome = std::mem::take(&mut state.outcome);
        let Some(shared) = state.session.take() else {
            return;
        };

        // Waits for any guard a caller still holds
        if let Some(mut session) = shared.take().await {
            if let Some(hooks) = &self.hooks {
                hooks.teardown(&mut session, outcome).await;
            }
            if let Err(e) = self.engine.release_session(session, outcome).await {
                tracing::warn!(
                    engine = %self.engine.name(),
                    error = %e,
                    "Session release failed"
                );
            }
        }

        self.engine.teardown_session().await;
        tracing::trace!(engine = %self.engine.name(), family = E::FAMILY, "Context exited");
    }

    /// Run `f` inside one entry of this context.
    ///
    /// The exit always happens once `f` returns, with a failure outcome when
    /// `f` returned an error.
    pub async fn with_session<F, Fut, T, Er>(&self, f: F) -> Result<T, Er>
    where
        F: FnOnce(SharedSession<E::Session>) -> Fut,
        Fut: Future<Output = Result<T, Er>>,
        Er: From<EngineError>,
    {
        let session = self.enter().await?;
        let result = f(session).await;
        self.exit(ScopeOutcome::of(&result)).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::engine::mock::{EventLog, MockConfig, MockEngine, MockSession};

    async fn started(name: &str) -> Arc<MockEngine> {
        let engine = Arc::new(MockEngine::new(name));
        engine.start().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_nested_entries_share_one_session() {
        let engine = started("main").await;
        let ctx = Context::new(Arc::clone(&engine));

        let first = ctx.enter().await.unwrap();
        let second = ctx.enter().await.unwrap();
        assert!(SharedSession::ptr_eq(&first, &second));
        assert_eq!(engine.sessions(), 1);
        assert_eq!(ctx.depth().await, 2);
        drop(first);
        drop(second);

        ctx.exit(ScopeOutcome::Success).await;
        assert_eq!(engine.releases(), 0);
        assert_eq!(engine.teardowns(), 0);
        // Shared session is still usable after the inner exit
        let session = ctx.session().await.unwrap();
        assert_eq!(session.lock().await.unwrap().id, 0);
        drop(session);

        ctx.exit(ScopeOutcome::Success).await;
        assert_eq!(engine.releases(), 1);
        assert_eq!(engine.teardowns(), 1);
        assert!(ctx.session().await.is_none());
        assert_eq!(ctx.depth().await, 0);
    }

    #[tokio::test]
    async fn test_reentry_after_release_acquires_new_session() {
        let engine = started("main").await;
        let ctx = Context::new(Arc::clone(&engine));

        for round in 0..3 {
            let session = ctx.enter().await.unwrap();
            assert_eq!(session.lock().await.unwrap().id, round);
            drop(session);
            ctx.exit(ScopeOutcome::Success).await;
        }

        assert_eq!(engine.sessions(), 3);
        assert_eq!(engine.releases(), 3);
    }

    #[tokio::test]
    async fn test_exit_without_enter_is_ignored() {
        let engine = started("main").await;
        let ctx = Context::new(Arc::clone(&engine));

        ctx.exit(ScopeOutcome::Success).await;
        ctx.exit(ScopeOutcome::Failure).await;

        assert_eq!(ctx.depth().await, 0);
        assert_eq!(engine.releases(), 0);
        assert_eq!(engine.teardowns(), 0);

        // Still usable afterwards
        let _ = ctx.enter().await.unwrap();
        ctx.exit(ScopeOutcome::Success).await;
        assert_eq!(engine.releases(), 1);
    }

    #[tokio::test]
    async fn test_nested_failure_reaches_final_release() {
        let engine = started("main").await;
        let ctx = Context::new(Arc::clone(&engine));

        let _ = ctx.enter().await.unwrap();
        let _ = ctx.enter().await.unwrap();
        ctx.exit(ScopeOutcome::Failure).await;
        ctx.exit(ScopeOutcome::Success).await;

        assert_eq!(engine.releases(), 1);
        assert_eq!(engine.failed_releases(), 1);

        // Outcome resets for the next round
        let _ = ctx.enter().await.unwrap();
        ctx.exit(ScopeOutcome::Success).await;
        assert_eq!(engine.failed_releases(), 1);
    }

    #[tokio::test]
    async fn test_enter_on_stopped_engine_fails_cleanly() {
        let engine = Arc::new(MockEngine::new("idle"));
        let ctx = Context::new(Arc::clone(&engine));

        let err = ctx.enter().await.unwrap_err();
        assert!(matches!(err, EngineError::NotStarted(_)));
        assert_eq!(ctx.depth().await, 0);
        assert_eq!(engine.teardowns(), 0);
    }

    #[tokio::test]
    async fn test_release_error_is_swallowed() {
        let config = MockConfig {
            fail_release: true,
            ..Default::default()
        };
        let engine = Arc::new(MockEngine::with_config("main", config));
        engine.start().await.unwrap();
        let ctx = Context::new(Arc::clone(&engine));

        let _ = ctx.enter().await.unwrap();
        ctx.exit(ScopeOutcome::Success).await;

        assert_eq!(engine.releases(), 1);
        assert_eq!(engine.teardowns(), 1);
        assert_eq!(ctx.depth().await, 0);
    }

    struct RecordingHooks {
        log: EventLog,
        fail_setup: bool,
        setups: AtomicUsize,
    }

    #[async_trait]
    impl SessionHooks<MockSession> for RecordingHooks {
        async fn setup(&self, session: &mut MockSession) -> Result<(), EngineError> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            self.log.push(format!("setup:{}", session.id));
            if self.fail_setup {
                return Err(EngineError::session("main", "setup failed"));
            }
            Ok(())
        }

        async fn teardown(&self, session: &mut MockSession, outcome: ScopeOutcome) {
            self.log.push(format!("hook-teardown:{}:{:?}", session.id, outcome));
        }
    }

    #[tokio::test]
    async fn test_hooks_run_around_session() {
        let log = EventLog::default();
        let config = MockConfig {
            log: log.clone(),
            ..Default::default()
        };
        let engine = Arc::new(MockEngine::with_config("main", config));
        engine.start().await.unwrap();

        let hooks = Arc::new(RecordingHooks {
            log: log.clone(),
            fail_setup: false,
            setups: AtomicUsize::new(0),
        });
        let ctx = Context::with_hooks(Arc::clone(&engine), hooks.clone());

        let _ = ctx.enter().await.unwrap();
        let _ = ctx.enter().await.unwrap();
        ctx.exit(ScopeOutcome::Success).await;
        ctx.exit(ScopeOutcome::Success).await;

        assert_eq!(hooks.setups.load(Ordering::SeqCst), 1);
        assert_eq!(
            log.events(),
            vec![
                "start:main",
                "session:main",
                "setup:0",
                "hook-teardown:0:Success",
                "release:main",
                "teardown:main",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_setup_releases_session() {
        let engine = started("main").await;
        let hooks = Arc::new(RecordingHooks {
            log: EventLog::default(),
            fail_setup: true,
            setups: AtomicUsize::new(0),
        });
        let ctx = Context::with_hooks(Arc::clone(&engine), hooks);

        assert!(ctx.enter().await.is_err());
        assert_eq!(ctx.depth().await, 0);
        assert_eq!(engine.sessions(), 1);
        assert_eq!(engine.releases(), 1);
        assert_eq!(engine.failed_releases(), 1);
    }

    #[tokio::test]
    async fn test_with_session_exits_on_error() {
        let engine = started("main").await;
        let ctx = Context::new(Arc::clone(&engine));

        let value: Result<usize, EngineError> = ctx
            .with_session(|session| async move {
                let id = session.lock().await?.id;
                Ok(id + 10)
            })
            .await;
        assert_eq!(value.unwrap(), 10);

        let failed: Result<(), EngineError> = ctx
            .with_session(|_| async { Err(EngineError::Config("handler".into())) })
            .await;
        assert!(failed.is_err());

        assert_eq!(ctx.depth().await, 0);
        assert_eq!(engine.releases(), 2);
        assert_eq!(engine.failed_releases(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_entries_acquire_once() {
        let engine = started("main").await;
        let ctx = Arc::new(Context::new(Arc::clone(&engine)));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let session = ctx.enter().await.unwrap();
                    tokio::task::yield_now().await;
                    drop(session);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(engine.sessions(), 1);
        assert_eq!(ctx.depth().await, 10);

        for _ in 0..10 {
            ctx.exit(ScopeOutcome::Success).await;
        }
        assert_eq!(engine.releases(), 1);
        assert_eq!(engine.teardowns(), 1);
    }

    #[tokio::test]
    async fn test_outstanding_handle_still_released() {
        let engine = started("main").await;
        let ctx = Context::new(Arc::clone(&engine));

        let kept = ctx.enter().await.unwrap();
        ctx.exit(ScopeOutcome::Success).await;

        assert_eq!(engine.releases(), 1);
        assert_eq!(engine.teardowns(), 1);
        assert!(ctx.session().await.is_none());
        assert!(matches!(kept.lock().await, Err(EngineError::SessionReleased)));
    }

    #[tokio::test]
    async fn test_final_exit_waits_for_held_guard() {
        let engine = started("main").await;
        let ctx = Context::new(Arc::clone(&engine));
        let handle = ctx.enter().await.unwrap();

        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let holder = tokio::spawn(async move {
            let guard = handle.lock().await.unwrap();
            locked_tx.send(()).unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            guard.id
        });
        locked_rx.await.unwrap();

        ctx.exit(ScopeOutcome::Success).await;
        assert_eq!(engine.releases(), 1);
        assert_eq!(holder.await.unwrap(), 0);
    }

    #[test]
    fn test_default_factory_builds_context() {
        let factory = default_context_factory::<MockEngine>();
        let ctx = factory(Arc::new(MockEngine::new("x")));
        assert_eq!(ctx.name(), "x");
        assert!(format!("{:?}", ctx).contains("mock"));
    }
}
