use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    APP_NAME_LOWER, ENV_CLICKHOUSE_URL, ENV_CONFIG, ENV_ELASTICSEARCH_URL, ENV_POSTGRES_URL,
    ENV_RABBITMQ_URL, ENV_REDIS_URL, ENV_SHUTDOWN_TIMEOUT, ENV_SQLITE_URL,
};

#[derive(Parser)]
#[command(name = APP_NAME_LOWER)]
#[command(version, about = "Lifecycle host for pooled data-system engines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// DSN of the default ClickHouse engine
    #[arg(long, global = true, env = ENV_CLICKHOUSE_URL)]
    pub clickhouse_url: Option<String>,

    /// DSN of the default Redis engine
    #[arg(long, global = true, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,

    /// DSN of the default PostgreSQL engine
    #[arg(long, global = true, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    /// DSN of the default SQLite engine
    #[arg(long, global = true, env = ENV_SQLITE_URL)]
    pub sqlite_url: Option<String>,

    /// DSN of the default Elasticsearch engine
    #[arg(long, global = true, env = ENV_ELASTICSEARCH_URL)]
    pub elasticsearch_url: Option<String>,

    /// DSN of the default RabbitMQ engine
    #[arg(long, global = true, env = ENV_RABBITMQ_URL)]
    pub rabbitmq_url: Option<String>,

    /// Seconds allowed for teardown on shutdown
    #[arg(long, global = true, env = ENV_SHUTDOWN_TIMEOUT, value_parser = parse_timeout)]
    pub shutdown_timeout: Option<u64>,
}

fn parse_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    if secs == 0 {
        return Err("shutdown timeout must be at least 1 second".to_string());
    }
    Ok(secs)
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start every configured engine and wait for a shutdown signal (default command)
    Run,
    /// Start and immediately stop every configured engine
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub clickhouse_url: Option<String>,
    pub redis_url: Option<String>,
    pub postgres_url: Option<String>,
    pub sqlite_url: Option<String>,
    pub elasticsearch_url: Option<String>,
    pub rabbitmq_url: Option<String>,
    pub shutdown_timeout: Option<u64>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            clickhouse_url: cli.clickhouse_url,
            redis_url: cli.redis_url,
            postgres_url: cli.postgres_url,
            sqlite_url: cli.sqlite_url,
            elasticsearch_url: cli.elasticsearch_url,
            rabbitmq_url: cli.rabbitmq_url,
            shutdown_timeout: cli.shutdown_timeout,
        }
    }
}

/// Parse CLI arguments, returning config and command separately
pub fn parse() -> (CliConfig, Commands) {
    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Run);
    (cli.into(), command)
}
