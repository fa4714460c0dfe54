//! Instrumented in-memory engine for lifecycle tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Engine, EngineError, PoolSlot, ScopeOutcome};

/// Ordered record of lifecycle events, shared between engines
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Events starting with `prefix`, in order
    pub fn filtered(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub log: EventLog,
    pub fail_start: bool,
    pub fail_session: bool,
    pub fail_release: bool,
    pub fail_close: bool,
}

#[derive(Debug)]
pub struct MockSession {
    pub id: usize,
}

#[derive(Default)]
pub struct Counters {
    pub pool_opens: AtomicUsize,
    pub pool_closes: AtomicUsize,
    pub sessions: AtomicUsize,
    pub releases: AtomicUsize,
    pub teardowns: AtomicUsize,
    pub failed_releases: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct MockEngine {
    name: String,
    config: MockConfig,
    slot: PoolSlot<usize>,
    pub counters: Counters,
}

impl MockEngine {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, MockConfig::default())
    }

    pub fn with_config(name: &str, config: MockConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            slot: PoolSlot::new(),
            counters: Counters::default(),
        }
    }

    pub fn pool_opens(&self) -> usize {
        Counters::get(&self.counters.pool_opens)
    }

    pub fn pool_closes(&self) -> usize {
        Counters::get(&self.counters.pool_closes)
    }

    pub fn sessions(&self) -> usize {
        Counters::get(&self.counters.sessions)
    }

    pub fn releases(&self) -> usize {
        Counters::get(&self.counters.releases)
    }

    pub fn teardowns(&self) -> usize {
        Counters::get(&self.counters.teardowns)
    }

    pub fn failed_releases(&self) -> usize {
        Counters::get(&self.counters.failed_releases)
    }

    pub async fn has_pool(&self) -> bool {
        self.slot.pool().await.is_some()
    }

    pub fn counter(&self) -> usize {
        self.slot.counter()
    }
}

#[async_trait]
impl Engine for MockEngine {
    type Config = MockConfig;
    type Session = MockSession;

    const FAMILY: &'static str = "mock";

    fn from_config(name: &str, config: &Self::Config) -> Result<Self, EngineError> {
        Ok(Self::with_config(name, config.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn active(&self) -> bool {
        self.slot.is_active()
    }

    async fn start(&self) -> Result<(), EngineError> {
        self.slot
            .start(move || async move {
                if self.config.fail_start {
                    return Err(EngineError::connection(Self::FAMILY, &self.name, "refused"));
                }
                let n = self.counters.pool_opens.fetch_add(1, Ordering::SeqCst);
                Ok(n)
            })
            .await?;
        self.config.log.push(format!("start:{}", self.name));
        Ok(())
    }

    async fn stop(&self) {
        self.slot
            .stop(&self.name, move |_| async move {
                self.counters.pool_closes.fetch_add(1, Ordering::SeqCst);
                if self.config.fail_close {
                    return Err(EngineError::Config("close failed".into()));
                }
                Ok(())
            })
            .await;
        self.config.log.push(format!("stop:{}", self.name));
    }

    async fn session(&self) -> Result<Self::Session, EngineError> {
        self.slot.require(&self.name).await?;
        if self.config.fail_session {
            return Err(EngineError::session(&self.name, "checkout failed"));
        }
        let id = self.counters.sessions.fetch_add(1, Ordering::SeqCst);
        self.config.log.push(format!("session:{}", self.name));
        Ok(MockSession { id })
    }

    async fn release_session(
        &self,
        _session: Self::Session,
        outcome: ScopeOutcome,
    ) -> Result<(), EngineError> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        if outcome.is_failure() {
            self.counters.failed_releases.fetch_add(1, Ordering::SeqCst);
        }
        self.config.log.push(format!("release:{}", self.name));
        if self.config.fail_release {
            return Err(EngineError::session(&self.name, "release failed"));
        }
        Ok(())
    }

    async fn teardown_session(&self) {
        self.counters.teardowns.fetch_add(1, Ordering::SeqCst);
        self.config.log.push(format!("teardown:{}", self.name));
    }
}
