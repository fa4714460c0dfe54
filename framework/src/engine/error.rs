//! Engine error types
//!
//! One error type covers every engine family, the reference-counted contexts
//! and the request scope. Client crate errors convert via `From` so engine
//! implementations can use `?` directly.

use thiserror::Error;

/// Unified error type for engine, context and resource operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// The pool or client could not be constructed or validated on start
    #[error("Connection error on {family} engine '{engine}': {reason}")]
    Connection {
        family: &'static str,
        engine: String,
        reason: String,
    },

    /// Invalid engine configuration (bad DSN, unreadable password file, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A session was requested from an engine whose pool is not started
    #[error("Engine '{0}' is not started")]
    NotStarted(String),

    /// Session acquisition, setup or release failed
    #[error("Session error on engine '{engine}': {reason}")]
    Session { engine: String, reason: String },

    /// Another engine type is already published under the same family tag
    #[error("Scope tag '{tag}' is already used by another engine type")]
    TagConflict { tag: &'static str },

    /// A session handle was used after its context released the session
    #[error("Session was already released")]
    SessionReleased,

    /// An engine with the same name is already published under the tag
    #[error("Engine '{engine}' is already published under scope tag '{tag}'")]
    NameConflict { tag: &'static str, engine: String },

    /// Operation timed out
    #[error("Operation on engine '{engine}' timed out after {timeout_secs}s")]
    Timeout { engine: String, timeout_secs: u64 },

    /// ClickHouse client error
    #[error("ClickHouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),

    /// Redis command error
    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    /// Redis pool checkout error
    #[error("Redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    /// SQL driver error
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// HTTP client error (Elasticsearch)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// AMQP client error (RabbitMQ)
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a connection error for the given family and engine
    pub fn connection(
        family: &'static str,
        engine: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Connection {
            family,
            engine: engine.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a session error
    pub fn session(engine: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Session {
            engine: engine.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a timeout error
    pub fn timeout(engine: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            engine: engine.into(),
            timeout_secs,
        }
    }

    /// Check if this error is likely transient (worth retrying at a higher level)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } | Self::RedisPool(_) => true,
            Self::Sql(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Redis(e) => e.is_io_error() || e.is_timeout(),
            _ => false,
        }
    }
}
