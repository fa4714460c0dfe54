//! SQL engines (PostgreSQL, SQLite) over sqlx pools
//!
//! One generic engine serves every sqlx backend; the [`SqlDialect`] impl only
//! supplies the family tag. Sessions are either a plain pooled connection or
//! a `'static` transaction. When a transaction session is released, it is
//! committed on success and rolled back on failure (or always, with
//! `force_rollback`).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::LevelFilter;
use serde::Deserialize;
use sqlx::pool::{PoolConnection, PoolOptions};
use sqlx::{ConnectOptions, Database, Pool, Postgres, Sqlite, Transaction};

use super::dsn::{apply_password_file, sanitize_dsn};
use crate::core::constants::{
    FAMILY_POSTGRES, FAMILY_SQLITE, SQL_DEFAULT_ACQUIRE_TIMEOUT_SECS, SQL_DEFAULT_IDLE_TIMEOUT_SECS,
    SQL_DEFAULT_MAX_CONNECTIONS, SQL_DEFAULT_MIN_CONNECTIONS,
};
use crate::engine::{Engine, EngineError, PoolSlot, ScopeOutcome};

/// sqlx backend usable by [`SqlEngine`]
pub trait SqlDialect: Database {
    const FAMILY: &'static str;
    const LABEL: &'static str;
}

impl SqlDialect for Postgres {
    const FAMILY: &'static str = FAMILY_POSTGRES;
    const LABEL: &'static str = "PostgreSQL";
}

impl SqlDialect for Sqlite {
    const FAMILY: &'static str = FAMILY_SQLITE;
    const LABEL: &'static str = "SQLite";
}

pub type PostgresEngine = SqlEngine<Postgres>;
pub type SqliteEngine = SqlEngine<Sqlite>;

fn default_min_size() -> u32 {
    SQL_DEFAULT_MIN_CONNECTIONS
}

fn default_max_size() -> u32 {
    SQL_DEFAULT_MAX_CONNECTIONS
}

fn default_expire_secs() -> u64 {
    SQL_DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_timeout_secs() -> u64 {
    SQL_DEFAULT_ACQUIRE_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqlConfig {
    pub dsn: String,
    /// Log every statement at debug level instead of trace
    #[serde(default)]
    pub echo: bool,
    #[serde(default = "default_min_size")]
    pub pool_min_size: u32,
    #[serde(default = "default_max_size")]
    pub pool_max_size: u32,
    /// Seconds an idle connection is kept
    #[serde(default = "default_expire_secs")]
    pub pool_expire_seconds: u64,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_timeout_secs")]
    pub pool_timeout_seconds: u64,
    /// Open a transaction for every session
    #[serde(default = "default_true")]
    pub begin_tx: bool,
    /// Roll back every transaction, even on success (test fixtures)
    #[serde(default)]
    pub force_rollback: bool,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

impl SqlConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            echo: false,
            pool_min_size: SQL_DEFAULT_MIN_CONNECTIONS,
            pool_max_size: SQL_DEFAULT_MAX_CONNECTIONS,
            pool_expire_seconds: SQL_DEFAULT_IDLE_TIMEOUT_SECS,
            pool_timeout_seconds: SQL_DEFAULT_ACQUIRE_TIMEOUT_SECS,
            begin_tx: true,
            force_rollback: false,
            password_file: None,
        }
    }
}

/// Unit of work checked out of a SQL engine
pub enum SqlSession<DB: Database> {
    Connection(PoolConnection<DB>),
    Transaction(Transaction<'static, DB>),
}

impl<DB: Database> SqlSession<DB> {
    /// Connection to run queries on, inside the transaction if there is one
    pub fn executor(&mut self) -> &mut DB::Connection {
        match self {
            Self::Connection(conn) => &mut **conn,
            Self::Transaction(tx) => &mut **tx,
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

pub struct SqlEngine<DB: SqlDialect> {
    name: String,
    config: SqlConfig,
    slot: PoolSlot<Pool<DB>>,
}

impl<DB: SqlDialect> SqlEngine<DB> {
    /// Clone of the running pool
    pub async fn pool(&self) -> Option<Pool<DB>> {
        self.slot.pool().await
    }

    fn connect_options(&self) -> Result<<DB::Connection as sqlx::Connection>::Options, EngineError> {
        let dsn = apply_password_file(&self.config.dsn, self.config.password_file.as_deref())?;
        let options: <DB::Connection as sqlx::Connection>::Options = dsn.parse().map_err(|e| {
            EngineError::Config(format!(
                "Invalid {} DSN {}: {}",
                DB::LABEL,
                sanitize_dsn(&self.config.dsn),
                e
            ))
        })?;

        let level = if self.config.echo {
            LevelFilter::Debug
        } else {
            LevelFilter::Trace
        };
        Ok(options.log_statements(level))
    }

    async fn open_pool(&self) -> Result<Pool<DB>, EngineError> {
        let options = self.connect_options()?;
        let max_connections = self.config.pool_max_size.max(1);
        let min_connections = self.config.pool_min_size.min(max_connections);

        let pool = PoolOptions::<DB>::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(self.config.pool_timeout_seconds))
            .idle_timeout(Duration::from_secs(self.config.pool_expire_seconds))
            .connect_with(options)
            .await
            .map_err(|e| EngineError::connection(DB::FAMILY, &self.name, e))?;

        tracing::debug!(
            engine = %self.name,
            backend = DB::LABEL,
            url = %sanitize_dsn(&self.config.dsn),
            max_connections,
            min_connections,
            "SQL engine started"
        );
        Ok(pool)
    }
}

#[async_trait]
impl<DB: SqlDialect> Engine for SqlEngine<DB> {
    type Config = SqlConfig;
    type Session = SqlSession<DB>;

    const FAMILY: &'static str = DB::FAMILY;

    fn from_config(name: &str, config: &Self::Config) -> Result<Self, EngineError> {
        if config.dsn.trim().is_empty() {
            return Err(EngineError::Config(format!(
                "{} DSN is required for engine '{}'",
                DB::LABEL,
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            slot: PoolSlot::new(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn active(&self) -> bool {
        self.slot.is_active()
    }

    async fn start(&self) -> Result<(), EngineError> {
        self.slot.start(move || self.open_pool()).await?;
        Ok(())
    }

    async fn stop(&self) {
        let closed = self
            .slot
            .stop(&self.name, |pool| async move {
                pool.close().await;
                Ok(())
            })
            .await;
        if closed {
            tracing::debug!(engine = %self.name, backend = DB::LABEL, "SQL pool closed");
        }
    }

    async fn session(&self) -> Result<Self::Session, EngineError> {
        let pool = self.slot.require(&self.name).await?;
        if self.config.begin_tx {
            Ok(SqlSession::Transaction(pool.begin().await?))
        } else {
            Ok(SqlSession::Connection(pool.acquire().await?))
        }
    }

    async fn release_session(
        &self,
        session: Self::Session,
        outcome: ScopeOutcome,
    ) -> Result<(), EngineError> {
        match session {
            SqlSession::Connection(conn) => drop(conn),
            SqlSession::Transaction(tx) => {
                if outcome.is_failure() || self.config.force_rollback {
                    tx.rollback().await?;
                    tracing::trace!(engine = %self.name, "Transaction rolled back");
                } else {
                    tx.commit().await?;
                    tracing::trace!(engine = %self.name, "Transaction committed");
                }
            }
        }
        Ok(())
    }
}
