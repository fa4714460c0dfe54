//! Elasticsearch engine over a pooled reqwest client

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;

use super::dsn::{apply_password_file, parse_url, sanitize_dsn};
use crate::core::constants::{ES_DEFAULT_MAX_IDLE_PER_HOST, ES_DEFAULT_TIMEOUT_SECS, FAMILY_ELASTICSEARCH};
use crate::engine::{Engine, EngineError, PoolSlot};

fn default_timeout_secs() -> u64 {
    ES_DEFAULT_TIMEOUT_SECS
}

fn default_max_idle() -> usize {
    ES_DEFAULT_MAX_IDLE_PER_HOST
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    /// `http(s)://user:password@host:9200/`
    pub dsn: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_idle")]
    pub pool_max_idle_per_host: usize,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

impl ElasticsearchConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            timeout_seconds: ES_DEFAULT_TIMEOUT_SECS,
            pool_max_idle_per_host: ES_DEFAULT_MAX_IDLE_PER_HOST,
            password_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    user: String,
    password: Option<String>,
}

/// Client handle bound to one cluster
#[derive(Debug, Clone)]
pub struct EsSession {
    client: Client,
    base: Url,
    credentials: Option<Credentials>,
}

impl EsSession {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Request against `path`, relative to the cluster URL, with credentials
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, EngineError> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| EngineError::Config(format!("Invalid Elasticsearch path '{path}': {e}")))?;

        let builder = self.client.request(method, url);
        Ok(match &self.credentials {
            Some(c) => builder.basic_auth(&c.user, c.password.as_ref()),
            None => builder,
        })
    }
}

/// Split credentials out of the DSN; the base URL always ends with '/'
fn split_dsn(dsn: &str) -> Result<(Url, Option<Credentials>), EngineError> {
    let mut url = parse_url(dsn)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(EngineError::Config(format!(
            "Elasticsearch DSN must be http(s): {}",
            sanitize_dsn(dsn)
        )));
    }

    let credentials = (!url.username().is_empty()).then(|| Credentials {
        user: url.username().to_string(),
        password: url.password().map(str::to_string),
    });

    // http(s) URLs always accept credential changes
    let _ = url.set_username("");
    let _ = url.set_password(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);

    Ok((url, credentials))
}

pub struct ElasticsearchEngine {
    name: String,
    config: ElasticsearchConfig,
    slot: PoolSlot<EsSession>,
}

impl ElasticsearchEngine {
    async fn open_client(&self) -> Result<EsSession, EngineError> {
        let dsn = apply_password_file(&self.config.dsn, self.config.password_file.as_deref())?;
        let (base, credentials) = split_dsn(&dsn)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .build()?;
        let session = EsSession {
            client,
            base,
            credentials,
        };

        let response = session
            .request(Method::GET, "/")?
            .send()
            .await
            .map_err(|e| EngineError::connection(Self::FAMILY, &self.name, e))?;
        if !response.status().is_success() {
            return Err(EngineError::connection(
                Self::FAMILY,
                &self.name,
                format!("cluster answered {}", response.status()),
            ));
        }

        tracing::debug!(engine = %self.name, url = %session.base, "Elasticsearch engine started");
        Ok(session)
    }
}

#[async_trait]
impl Engine for ElasticsearchEngine {
    type Config = ElasticsearchConfig;
    type Session = EsSession;

    const FAMILY: &'static str = FAMILY_ELASTICSEARCH;

    fn from_config(name: &str, config: &Self::Config) -> Result<Self, EngineError> {
        split_dsn(&config.dsn)?;
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
        self.slot.start(move || self.open_client()).await?;
        Ok(())
    }

    async fn stop(&self) {
        // Dropping the last client clone closes its idle connections
        let closed = self.slot.stop(&self.name, |_session| async { Ok(()) }).await;
        if closed {
            tracing::debug!(engine = %self.name, "Elasticsearch engine stopped");
        }
    }

    async fn session(&self) -> Result<Self::Session, EngineError> {
        self.slot.require(&self.name).await
    }
}
