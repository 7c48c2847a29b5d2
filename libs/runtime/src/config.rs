//! Service configuration, layered as built-in defaults, then the YAML file,
//! then `APP__`-prefixed environment variables (`APP__SERVER__PORT=9000`).

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::paths::home_dir::resolve_home_dir;

const ENV_PREFIX: &str = "APP__";
const HOME_SUBDIR: &str = ".membership";
const DEFAULT_DSN: &str = "sqlite://database/membership.db";

/// DSN swapped in by `--mock`.
pub const MEMORY_DSN: &str = "sqlite::memory:";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// The server refuses to start without it; `--mock` supplies one.
    pub database: Option<DatabaseConfig>,
    pub logging: Option<LoggingConfig>,
    /// Raw per-module sections, typed by each module on init.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Absolute after loading; empty means `$HOME/.membership`.
    pub home_dir: String,
    pub host: String,
    pub port: u16,
    /// Per-request handler timeout; 0 keeps the ingress default.
    #[serde(default)]
    pub timeout_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            home_dir: String::new(),
            host: "127.0.0.1".to_string(),
            port: 8090,
            timeout_sec: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Relative SQLite paths resolve under `server.home_dir`.
    pub url: String,
    pub max_conns: Option<u32>,
    pub busy_timeout_ms: Option<u32>,
}

impl DatabaseConfig {
    fn sqlite(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_conns: None,
            busy_timeout_ms: None,
        }
    }
}

/// Subsystem name to its log section; `default` catches everything else.
pub type LoggingConfig = HashMap<String, LogSection>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogSection {
    /// "trace" through "error", or "off".
    pub console_level: String,
    /// Relative to `server.home_dir`.
    pub file: String,
    #[serde(default)]
    pub file_level: String,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

fn default_logging() -> LoggingConfig {
    HashMap::from([(
        "default".to_string(),
        LogSection {
            console_level: "info".to_string(),
            file: "logs/membership.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    )])
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: Some(DatabaseConfig {
                max_conns: Some(10),
                busy_timeout_ms: Some(5000),
                ..DatabaseConfig::sqlite(DEFAULT_DSN)
            }),
            logging: Some(default_logging()),
            modules: HashMap::new(),
        }
    }
}

/// Command line switches that rewrite the loaded configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    /// 1 raises console logging to debug, 2 or more to trace.
    pub verbose: u8,
    pub mock: bool,
}

impl AppConfig {
    /// Load from `path`, or use the built-in defaults without a file.
    /// Either way `server.home_dir` ends up absolute and created.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path, ENV_PREFIX)?,
            None => Self::default(),
        };
        config.normalize_home_dir()?;
        Ok(config)
    }

    fn from_file(path: &Path, env_prefix: &str) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }

        // only `server` has defaults under a file; other sections come from YAML or env
        let base = AppConfig {
            server: ServerConfig::default(),
            database: None,
            logging: None,
            modules: HashMap::new(),
        };

        Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()
            .with_context(|| format!("Failed to parse yaml config '{}'", path.display()))
    }

    fn normalize_home_dir(&mut self) -> Result<()> {
        let configured = Some(self.server.home_dir.trim())
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);
        let resolved = resolve_home_dir(configured, HOME_SUBDIR, true)
            .context("Failed to resolve server.home_dir")?;
        self.server.home_dir = resolved.to_string_lossy().to_string();
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }

        if overrides.mock {
            self.database
                .get_or_insert_with(|| DatabaseConfig::sqlite(MEMORY_DSN))
                .url = MEMORY_DSN.to_string();
        }

        let level = match overrides.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        };
        let logging = self.logging.get_or_insert_with(default_logging);
        if let (Some(level), Some(section)) = (level, logging.get_mut("default")) {
            section.console_level = level.to_string();
        }
    }

    /// Address the ingress binds to unless its module section overrides it.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }
}
