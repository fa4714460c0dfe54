//! Concrete engine families
//!
//! | family        | tag      | client          |
//! |---------------|----------|-----------------|
//! | ClickHouse    | `ch`     | clickhouse      |
//! | Redis         | `redis`  | deadpool-redis  |
//! | PostgreSQL    | `sql`    | sqlx            |
//! | SQLite        | `sqlite` | sqlx            |
//! | Elasticsearch | `es`     | reqwest         |
//! | RabbitMQ      | `rmq`    | lapin           |

pub mod clickhouse;
pub mod dsn;
pub mod elasticsearch;
pub mod rabbitmq;
pub mod redis;
pub mod sql;

pub use self::clickhouse::{ClickhouseConfig, ClickhouseEngine};
pub use self::elasticsearch::{ElasticsearchConfig, ElasticsearchEngine, EsSession};
pub use self::rabbitmq::{RabbitmqConfig, RabbitmqEngine, RmqSession};
pub use self::redis::{RedisConfig, RedisEngine};
pub use self::sql::{PostgresEngine, SqlConfig, SqlDialect, SqlEngine, SqlSession, SqliteEngine};
