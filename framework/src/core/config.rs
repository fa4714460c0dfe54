use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{CONFIG_FILE_NAME, DEFAULT_ENGINE_NAME, SHUTDOWN_TIMEOUT_SECS};
use crate::engines::{
    ClickhouseConfig, ElasticsearchConfig, RabbitmqConfig, RedisConfig, SqlConfig,
};
use crate::lifecycle::EngineSet;

fn default_engine_name() -> String {
    DEFAULT_ENGINE_NAME.to_string()
}

// =============================================================================
// Named Engine Entries
// =============================================================================

/// One engine of a family section; `name` defaults to `default`
#[derive(Debug, Clone, Deserialize)]
pub struct NamedEngine<C> {
    #[serde(default = "default_engine_name")]
    pub name: String,
    #[serde(flatten)]
    pub config: C,
}

impl<C> NamedEngine<C> {
    pub fn new(name: impl Into<String>, config: C) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Replace the DSN of the `default` engine, adding it when absent
fn override_default_dsn<C>(
    engines: &mut Vec<NamedEngine<C>>,
    dsn: Option<&String>,
    build: impl Fn(String) -> C,
    set_dsn: impl Fn(&mut C, String),
) {
    let Some(dsn) = dsn else {
        return;
    };
    match engines.iter_mut().find(|e| e.name == DEFAULT_ENGINE_NAME) {
        Some(entry) => set_dsn(&mut entry.config, dsn.clone()),
        None => engines.insert(0, NamedEngine::new(DEFAULT_ENGINE_NAME, build(dsn.clone()))),
    }
}

/// Turn a family section into the engine set a resource manages
///
/// A lone `default` entry becomes [`EngineSet::Single`]; anything else is
/// kept as named engines in declaration order.
pub fn engine_set<C: Clone>(engines: &[NamedEngine<C>]) -> Option<EngineSet<C>> {
    match engines {
        [] => None,
        [only] if only.name == DEFAULT_ENGINE_NAME => Some(EngineSet::Single(only.config.clone())),
        _ => Some(EngineSet::Named(
            engines
                .iter()
                .map(|e| (e.name.clone(), e.config.clone()))
                .collect(),
        )),
    }
}

// =============================================================================
// File Configuration
// =============================================================================

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub clickhouse: Option<Vec<NamedEngine<ClickhouseConfig>>>,
    pub redis: Option<Vec<NamedEngine<RedisConfig>>>,
    pub postgres: Option<Vec<NamedEngine<SqlConfig>>>,
    pub sqlite: Option<Vec<NamedEngine<SqlConfig>>>,
    pub elasticsearch: Option<Vec<NamedEngine<ElasticsearchConfig>>>,
    pub rabbitmq: Option<Vec<NamedEngine<RabbitmqConfig>>>,
    pub shutdown_timeout_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub clickhouse: Vec<NamedEngine<ClickhouseConfig>>,
    pub redis: Vec<NamedEngine<RedisConfig>>,
    pub postgres: Vec<NamedEngine<SqlConfig>>,
    pub sqlite: Vec<NamedEngine<SqlConfig>>,
    pub elasticsearch: Vec<NamedEngine<ElasticsearchConfig>>,
    pub rabbitmq: Vec<NamedEngine<RabbitmqConfig>>,
    pub shutdown_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            clickhouse: Vec::new(),
            redis: Vec::new(),
            postgres: Vec::new(),
            sqlite: Vec::new(),
            elasticsearch: Vec::new(),
            rabbitmq: Vec::new(),
            shutdown_timeout: Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Local directory config OR CLI-specified config path
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let path = match cli.config {
            Some(ref path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.clone())
            }
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                local.exists().then_some(local)
            }
        };

        let file_config = match path {
            Some(path) => {
                let file_config = FileConfig::load_from_file(&path)?;
                file_config.warn_unknown_fields();
                file_config
            }
            None => FileConfig::default(),
        };

        let config = Self::layer(file_config, cli);
        config.validate()?;

        tracing::debug!(
            clickhouse = config.clickhouse.len(),
            redis = config.redis.len(),
            postgres = config.postgres.len(),
            sqlite = config.sqlite.len(),
            elasticsearch = config.elasticsearch.len(),
            rabbitmq = config.rabbitmq.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Layer file values and CLI/env overrides over the defaults
    fn layer(file: FileConfig, cli: &CliConfig) -> Self {
        let mut config = Self {
            clickhouse: file.clickhouse.unwrap_or_default(),
            redis: file.redis.unwrap_or_default(),
            postgres: file.postgres.unwrap_or_default(),
            sqlite: file.sqlite.unwrap_or_default(),
            elasticsearch: file.elasticsearch.unwrap_or_default(),
            rabbitmq: file.rabbitmq.unwrap_or_default(),
            shutdown_timeout: Duration::from_secs(
                cli.shutdown_timeout
                    .or(file.shutdown_timeout_seconds)
                    .unwrap_or(SHUTDOWN_TIMEOUT_SECS),
            ),
        };

        override_default_dsn(
            &mut config.clickhouse,
            cli.clickhouse_url.as_ref(),
            ClickhouseConfig::new,
            |c, dsn| c.dsn = dsn,
        );
        override_default_dsn(
            &mut config.redis,
            cli.redis_url.as_ref(),
            RedisConfig::new,
            |c, dsn| c.dsn = dsn,
        );
        override_default_dsn(
            &mut config.postgres,
            cli.postgres_url.as_ref(),
            SqlConfig::new,
            |c, dsn| c.dsn = dsn,
        );
        override_default_dsn(
            &mut config.sqlite,
            cli.sqlite_url.as_ref(),
            SqlConfig::new,
            |c, dsn| c.dsn = dsn,
        );
        override_default_dsn(
            &mut config.elasticsearch,
            cli.elasticsearch_url.as_ref(),
            ElasticsearchConfig::new,
            |c, dsn| c.dsn = dsn,
        );
        override_default_dsn(
            &mut config.rabbitmq,
            cli.rabbitmq_url.as_ref(),
            RabbitmqConfig::new,
            |c, dsn| c.dsn = dsn,
        );

        config
    }

    /// Engine names must be unique within a family
    fn validate(&self) -> Result<()> {
        check_unique("clickhouse", &self.clickhouse)?;
        check_unique("redis", &self.redis)?;
        check_unique("postgres", &self.postgres)?;
        check_unique("sqlite", &self.sqlite)?;
        check_unique("elasticsearch", &self.elasticsearch)?;
        check_unique("rabbitmq", &self.rabbitmq)?;
        if self.shutdown_timeout.is_zero() {
            anyhow::bail!("shutdown_timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// True when no engine of any family is configured
    pub fn is_empty(&self) -> bool {
        self.clickhouse.is_empty()
            && self.redis.is_empty()
            && self.postgres.is_empty()
            && self.sqlite.is_empty()
            && self.elasticsearch.is_empty()
            && self.rabbitmq.is_empty()
    }
}

fn check_unique<C>(section: &str, engines: &[NamedEngine<C>]) -> Result<()> {
    for (i, engine) in engines.iter().enumerate() {
        if engine.name.is_empty() {
            anyhow::bail!("{}: engine name must not be empty", section);
        }
        if engines[..i].iter().any(|e| e.name == engine.name) {
            anyhow::bail!("{}: duplicate engine name '{}'", section, engine.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_file_config_parse_sections() {
        let json = r#"{
            "redis": [{ "dsn": "redis://localhost:6379/0" }],
            "postgres": [
                { "name": "primary", "dsn": "postgres://db/app", "pool_max_size": 4 },
                { "name": "replica", "dsn": "postgres://replica/app" }
            ],
            "shutdown_timeout_seconds": 10
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let redis = config.redis.as_ref().unwrap();
        assert_eq!(redis[0].name, DEFAULT_ENGINE_NAME);
        assert_eq!(redis[0].config.dsn, "redis://localhost:6379/0");

        let postgres = config.postgres.as_ref().unwrap();
        assert_eq!(postgres[0].name, "primary");
        assert_eq!(postgres[0].config.pool_max_size, 4);
        assert_eq!(postgres[1].name, "replica");
        assert!(config.clickhouse.is_none());
        assert_eq!(config.shutdown_timeout_seconds, Some(10));
    }

    #[test]
    fn test_unknown_fields_collected() {
        let json = r#"{ "redis": [], "mysql": [{ "dsn": "x" }] }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let serde_json::Value::Object(map) = &config.extra else {
            panic!("extra should be an object");
        };
        assert!(map.contains_key("mysql"));
        assert!(!map.contains_key("redis"));
    }

    #[test]
    fn test_cli_overrides_default_dsn() {
        let json = r#"{
            "redis": [
                { "name": "sessions", "dsn": "redis://a:6379/1" },
                { "dsn": "redis://file:6379/0", "pool_max_connections": 16 }
            ]
        }"#;
        let file: FileConfig = serde_json::from_str(json).unwrap();
        let cli = CliConfig {
            redis_url: Some("redis://cli:6379/0".into()),
            ..Default::default()
        };

        let config = AppConfig::layer(file, &cli);
        assert_eq!(config.redis.len(), 2);
        assert_eq!(config.redis[0].config.dsn, "redis://a:6379/1");
        assert_eq!(config.redis[1].config.dsn, "redis://cli:6379/0");
        assert_eq!(config.redis[1].config.pool_max_connections, 16);
    }

    #[test]
    fn test_cli_adds_missing_default_engine() {
        let cli = CliConfig {
            sqlite_url: Some("sqlite::memory:".into()),
            shutdown_timeout: Some(3),
            ..Default::default()
        };

        let config = AppConfig::layer(FileConfig::default(), &cli);
        assert_eq!(config.sqlite.len(), 1);
        assert_eq!(config.sqlite[0].name, DEFAULT_ENGINE_NAME);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert!(config.postgres.is_empty());
        assert!(!config.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = AppConfig::default();
        config.redis = vec![
            NamedEngine::new("cache", RedisConfig::new("redis://a")),
            NamedEngine::new("cache", RedisConfig::new("redis://b")),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate engine name 'cache'"));
    }

    #[test]
    fn test_engine_set_shape() {
        let single = [NamedEngine::new(DEFAULT_ENGINE_NAME, 1)];
        assert!(matches!(engine_set(&single), Some(EngineSet::Single(1))));

        let named = [NamedEngine::new("a", 1), NamedEngine::new("b", 2)];
        let Some(EngineSet::Named(list)) = engine_set(&named) else {
            panic!("expected named engines");
        };
        assert_eq!(list, vec![("a".to_string(), 1), ("b".to_string(), 2)]);

        let empty: [NamedEngine<i32>; 0] = [];
        assert!(engine_set(&empty).is_none());
    }

    #[test]
    fn test_load_from_cli_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "elasticsearch": [{{ "dsn": "http://es:9200" }}], "shutdown_timeout_seconds": 7 }}"#
        )
        .unwrap();

        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.elasticsearch[0].config.dsn, "http://es:9200");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_load_missing_cli_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliConfig {
            config: Some(dir.path().join("absent.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
