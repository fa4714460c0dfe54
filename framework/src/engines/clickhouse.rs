//! ClickHouse engine
//!
//! The `clickhouse` crate's `Client` talks HTTP and pools connections via
//! keep-alive, so the "pool" is the client itself. Sessions are cheap clones
//! of it and closing is a no-op.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use clickhouse::Client;
use serde::Deserialize;

use super::dsn::{apply_password_file, parse_url, sanitize_dsn};
use crate::core::constants::{
    CLICKHOUSE_DEFAULT_DATABASE, CLICKHOUSE_DEFAULT_TIMEOUT_SECS, FAMILY_CLICKHOUSE,
};
use crate::engine::{Engine, EngineError, PoolSlot};

fn default_timeout_secs() -> u64 {
    CLICKHOUSE_DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickhouseConfig {
    /// `http(s)://user:password@host:8123/database`; `clickhouse://` is read
    /// as `http://`
    pub dsn: String,
    /// Enable LZ4 compression
    #[serde(default)]
    pub compression: bool,
    /// Seconds allowed for the startup health check
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
    /// Extra ClickHouse settings sent with every query
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

impl ClickhouseConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            compression: false,
            timeout_seconds: CLICKHOUSE_DEFAULT_TIMEOUT_SECS,
            options: BTreeMap::new(),
            password_file: None,
        }
    }
}

/// Connection parameters split out of a DSN
#[derive(Debug, PartialEq, Eq)]
struct Target {
    url: String,
    user: Option<String>,
    password: Option<String>,
    database: String,
}

impl Target {
    fn from_dsn(dsn: &str) -> Result<Self, EngineError> {
        let url = parse_url(dsn)?;

        let scheme = match url.scheme() {
            "http" | "clickhouse" => "http",
            "https" | "clickhouses" => "https",
            other => {
                return Err(EngineError::Config(format!(
                    "Unsupported ClickHouse scheme '{}' in {}",
                    other,
                    sanitize_dsn(dsn)
                )));
            }
        };
        let host = url.host_str().ok_or_else(|| {
            EngineError::Config(format!("ClickHouse DSN {} has no host", sanitize_dsn(dsn)))
        })?;

        let base = match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        };
        let database = url.path().trim_matches('/');

        Ok(Self {
            url: base,
            user: Some(url.username()).filter(|u| !u.is_empty()).map(str::to_string),
            password: url.password().map(str::to_string),
            database: if database.is_empty() {
                CLICKHOUSE_DEFAULT_DATABASE.to_string()
            } else {
                database.to_string()
            },
        })
    }
}

pub struct ClickhouseEngine {
    name: String,
    config: ClickhouseConfig,
    slot: PoolSlot<Client>,
}

impl ClickhouseEngine {
    fn build_client(&self) -> Result<Client, EngineError> {
        let dsn = apply_password_file(&self.config.dsn, self.config.password_file.as_deref())?;
        let target = Target::from_dsn(&dsn)?;

        let mut client = Client::default()
            .with_url(&target.url)
            .with_database(&target.database);
        if let Some(ref user) = target.user {
            client = client.with_user(user);
        }
        if let Some(ref password) = target.password {
            client = client.with_password(password);
        }
        if self.config.compression {
            client = client.with_compression(clickhouse::Compression::Lz4);
        }
        for (key, value) in &self.config.options {
            client = client.with_option(key, value);
        }
        Ok(client)
    }

    async fn health_check(&self, client: &Client) -> Result<(), EngineError> {
        let check = client.query("SELECT 1").execute();
        match tokio::time::timeout(Duration::from_secs(self.config.timeout_seconds), check).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EngineError::connection(Self::FAMILY, &self.name, e)),
            Err(_) => Err(EngineError::timeout(&self.name, self.config.timeout_seconds)),
        }
    }
}

#[async_trait]
impl Engine for ClickhouseEngine {
    type Config = ClickhouseConfig;
    type Session = Client;

    const FAMILY: &'static str = FAMILY_CLICKHOUSE;

    fn from_config(name: &str, config: &Self::Config) -> Result<Self, EngineError> {
        // Reject malformed DSNs at construction time
        Target::from_dsn(&config.dsn)?;
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
        let opened = self
            .slot
            .start(move || async move {
                let client = self.build_client()?;
                self.health_check(&client).await?;
                Ok(client)
            })
            .await?;

        if opened {
            tracing::debug!(
                engine = %self.name,
                url = %sanitize_dsn(&self.config.dsn),
                compression = self.config.compression,
                "ClickHouse engine started"
            );
        }
        Ok(())
    }

    async fn stop(&self) {
        let closed = self.slot.stop(&self.name, |_client| async { Ok(()) }).await;
        if closed {
            tracing::debug!(engine = %self.name, "ClickHouse engine stopped");
        }
    }

    async fn session(&self) -> Result<Self::Session, EngineError> {
        self.slot.require(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_dsn() {
        let target = Target::from_dsn("clickhouse://reader:pw@ch.local:8123/analytics").unwrap();
        assert_eq!(
            target,
            Target {
                url: "http://ch.local:8123".into(),
                user: Some("reader".into()),
                password: Some("pw".into()),
                database: "analytics".into(),
            }
        );
    }

    #[test]
    fn test_target_defaults() {
        let target = Target::from_dsn("https://ch.example.com/").unwrap();
        assert_eq!(target.url, "https://ch.example.com");
        assert_eq!(target.user, None);
        assert_eq!(target.password, None);
        assert_eq!(target.database, CLICKHOUSE_DEFAULT_DATABASE);
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let err = ClickhouseEngine::from_config("ch", &ClickhouseConfig::new("tcp://ch:9000"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unsupported ClickHouse scheme"));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: ClickhouseConfig =
            serde_json::from_str(r#"{"dsn": "http://localhost:8123"}"#).unwrap();
        assert_eq!(config.timeout_seconds, CLICKHOUSE_DEFAULT_TIMEOUT_SECS);
        assert!(!config.compression);
        assert!(config.options.is_empty());
        assert!(config.password_file.is_none());
    }

    #[tokio::test]
    async fn test_session_requires_start() {
        let engine =
            ClickhouseEngine::from_config("ch", &ClickhouseConfig::new("http://localhost:8123"))
                .unwrap();
        assert!(!engine.active());
        assert!(matches!(
            engine.session().await,
            Err(EngineError::NotStarted(_))
        ));
        // Stopping a stopped engine is harmless
        engine.stop().await;
        assert_eq!(engine.slot.counter(), 0);
    }

    #[tokio::test]
    async fn test_start_unreachable_keeps_stopped() {
        let mut config = ClickhouseConfig::new("http://127.0.0.1:1");
        config.timeout_seconds = 2;
        let engine = ClickhouseEngine::from_config("ch", &config).unwrap();

        assert!(engine.start().await.is_err());
        assert!(!engine.active());
    }
}
