//! Host infrastructure: CLI, configuration, constants, shutdown

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands};
pub use config::{AppConfig, FileConfig, NamedEngine};
pub use shutdown::ShutdownService;
