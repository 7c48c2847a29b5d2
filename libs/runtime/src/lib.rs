//! Process-level runtime helpers: layered configuration, logging setup and
//! home directory resolution shared by the server binary and its modules.

pub mod config;
pub mod logging;
pub mod paths;
pub mod provider;

pub use config::{AppConfig, DatabaseConfig, LogSection, LoggingConfig, Overrides, ServerConfig};
pub use provider::{AppConfigProvider, ConfigError, ConfigProvider, ConfigProviderExt};
