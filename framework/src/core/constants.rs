// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Poolwarden";

/// Application name in lowercase (for paths, identifiers and log filters)
pub const APP_NAME_LOWER: &str = "poolwarden";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "poolwarden.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "POOLWARDEN_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "POOLWARDEN_LOG";

// =============================================================================
// Environment Variables - Engine DSNs
// =============================================================================

/// DSN of the default ClickHouse engine
pub const ENV_CLICKHOUSE_URL: &str = "POOLWARDEN_CLICKHOUSE_URL";

/// DSN of the default Redis engine
pub const ENV_REDIS_URL: &str = "POOLWARDEN_REDIS_URL";

/// DSN of the default PostgreSQL engine
pub const ENV_POSTGRES_URL: &str = "POOLWARDEN_POSTGRES_URL";

/// DSN of the default SQLite engine
pub const ENV_SQLITE_URL: &str = "POOLWARDEN_SQLITE_URL";

/// Base URL of the default Elasticsearch engine
pub const ENV_ELASTICSEARCH_URL: &str = "POOLWARDEN_ELASTICSEARCH_URL";

/// DSN of the default RabbitMQ engine
pub const ENV_RABBITMQ_URL: &str = "POOLWARDEN_RABBITMQ_URL";

/// Environment variable for the shutdown timeout in seconds
pub const ENV_SHUTDOWN_TIMEOUT: &str = "POOLWARDEN_SHUTDOWN_TIMEOUT";

// =============================================================================
// Lifecycle
// =============================================================================

/// Name of the engine a single-engine resource registers
pub const DEFAULT_ENGINE_NAME: &str = "default";

/// Name of the root module built by the host binary
pub const ROOT_MODULE_NAME: &str = "root";

/// Seconds allowed for destroying every engine on shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Family Tags
// =============================================================================

pub const FAMILY_CLICKHOUSE: &str = "ch";
pub const FAMILY_REDIS: &str = "redis";
pub const FAMILY_POSTGRES: &str = "sql";
pub const FAMILY_SQLITE: &str = "sqlite";
pub const FAMILY_ELASTICSEARCH: &str = "es";
pub const FAMILY_RABBITMQ: &str = "rmq";

// =============================================================================
// ClickHouse Defaults
// =============================================================================

/// Default database used when the DSN names none
pub const CLICKHOUSE_DEFAULT_DATABASE: &str = "default";

/// Seconds allowed for the startup health check
pub const CLICKHOUSE_DEFAULT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Redis Defaults
// =============================================================================

pub const REDIS_DEFAULT_MAX_CONNECTIONS: usize = 4;

/// Seconds to wait for a pooled connection
pub const REDIS_DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Seconds to establish a new connection
pub const REDIS_DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// SQL Defaults
// =============================================================================

pub const SQL_DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const SQL_DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Seconds an idle connection is kept before being closed
pub const SQL_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Seconds to wait for a pooled connection
pub const SQL_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// Elasticsearch Defaults
// =============================================================================

pub const ES_DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Idle keep-alive connections per host
pub const ES_DEFAULT_MAX_IDLE_PER_HOST: usize = 8;

// =============================================================================
// RabbitMQ Defaults
// =============================================================================

pub const RMQ_DEFAULT_VIRTUAL_HOST: &str = "/";
pub const RMQ_DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const RMQ_DEFAULT_MAX_CONNECTIONS: usize = 4;
pub const RMQ_DEFAULT_MAX_CHANNELS_PER_CONNECTION: usize = 100;

/// AMQP reply code for a normal close
pub const RMQ_REPLY_SUCCESS: u16 = 200;
