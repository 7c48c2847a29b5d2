use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::AppConfig;

/// Provider of module-specific configuration (raw JSON sections only).
pub trait ConfigProvider: Send + Sync {
    /// Returns raw JSON section for the module, if any.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config for module '{module}': {source}")]
    InvalidModuleConfig {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Typed access on top of the raw JSON bag.
pub trait ConfigProviderExt: ConfigProvider {
    /// Deserialize the module section into `T`.
    ///
    /// A missing section yields `T::default()`; a present but malformed
    /// section is an error so that typos never silently fall back to defaults.
    fn module_config<T: DeserializeOwned + Default>(&self, module_name: &str) -> Result<T, ConfigError> {
        match self.get_module_config(module_name) {
            None => Ok(T::default()),
            Some(raw) => serde_json::from_value::<T>(raw.clone()).map_err(|source| {
                ConfigError::InvalidModuleConfig {
                    module: module_name.to_string(),
                    source,
                }
            }),
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}

/// `ConfigProvider` backed by the loaded `AppConfig`.
#[derive(Debug, Clone)]
pub struct AppConfigProvider {
    config: AppConfig,
}

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.config.modules.get(module_name)
    }
}
