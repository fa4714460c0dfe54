//! Host application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::container::{Container, Lifetime, ResolveScope};
use crate::core::cli::{self, Commands};
use crate::core::config::{AppConfig, NamedEngine, engine_set};
use crate::core::constants::{APP_NAME, APP_NAME_LOWER, ENV_LOG, ROOT_MODULE_NAME};
use crate::core::shutdown::ShutdownService;
use crate::engine::Engine;
use crate::engines::{
    ClickhouseEngine, ElasticsearchEngine, PostgresEngine, RabbitmqEngine, RedisEngine,
    SqliteEngine,
};
use crate::lifecycle::{EngineFactory, Lifecycle, Module, Resource};

pub struct CoreApp {
    pub config: AppConfig,
    pub container: Arc<Container>,
    pub root: Arc<Module>,
    pub shutdown: ShutdownService,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let config = AppConfig::load(&cli_config)?;
        let app = Self::init(config)?;

        match command {
            Commands::Run => app.serve().await,
            Commands::Check => app.check().await,
        }
    }

    /// Register one engine factory per family and assemble the root module
    pub fn init(config: AppConfig) -> Result<Self> {
        let container = Arc::new(Container::new());
        register_factory::<ClickhouseEngine>(&container);
        register_factory::<RedisEngine>(&container);
        register_factory::<PostgresEngine>(&container);
        register_factory::<SqliteEngine>(&container);
        register_factory::<ElasticsearchEngine>(&container);
        register_factory::<RabbitmqEngine>(&container);

        let mut root = Module::new(ROOT_MODULE_NAME);
        add_family::<ClickhouseEngine>(&mut root, &container, &config.clickhouse)?;
        add_family::<RedisEngine>(&mut root, &container, &config.redis)?;
        add_family::<PostgresEngine>(&mut root, &container, &config.postgres)?;
        add_family::<SqliteEngine>(&mut root, &container, &config.sqlite)?;
        add_family::<ElasticsearchEngine>(&mut root, &container, &config.elasticsearch)?;
        add_family::<RabbitmqEngine>(&mut root, &container, &config.rabbitmq)?;

        let root = Arc::new(root);
        container.register_shared(Arc::clone(&root));
        let shutdown = ShutdownService::new(config.shutdown_timeout);

        Ok(Self {
            config,
            container,
            root,
            shutdown,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start(&self) -> Result<()> {
        if self.root.is_empty() {
            tracing::warn!("No engines configured");
        }
        self.root
            .create()
            .await
            .context("Failed to start engines")?;
        tracing::info!(
            components = ?self.root.component_names(),
            "{} started",
            APP_NAME
        );
        Ok(())
    }

    /// Start everything, then block until Ctrl+C/SIGTERM
    async fn serve(self) -> Result<()> {
        // Install signal handlers FIRST so a signal during startup is not lost
        self.shutdown.install_signal_handlers();
        self.start().await?;

        self.shutdown.wait().await;
        if !self.shutdown.shutdown(&*self.root).await {
            anyhow::bail!(
                "Engines did not stop within {}s",
                self.config.shutdown_timeout.as_secs()
            );
        }
        Ok(())
    }

    /// Start and immediately stop every configured engine
    pub async fn check(&self) -> Result<()> {
        self.start().await?;
        if !self.shutdown.shutdown(&*self.root).await {
            anyhow::bail!(
                "Engines did not stop within {}s",
                self.config.shutdown_timeout.as_secs()
            );
        }
        tracing::info!("All engines reachable");
        Ok(())
    }
}

fn register_factory<E: Engine>(container: &Container) {
    container.register::<EngineFactory<E>, _>(Lifetime::Process, |_| Ok(EngineFactory::new()));
}

/// Add a resource for `E` to `root` when its family section is non-empty
fn add_family<E: Engine>(
    root: &mut Module,
    container: &Container,
    engines: &[NamedEngine<E::Config>],
) -> Result<()> {
    let Some(set) = engine_set(engines) else {
        return Ok(());
    };
    let factory = container
        .resolve::<EngineFactory<E>>(&ResolveScope::process())
        .with_context(|| format!("No engine factory for family '{}'", E::FAMILY))?;
    root.push(Arc::new(Resource::new(factory, set)));
    Ok(())
}
