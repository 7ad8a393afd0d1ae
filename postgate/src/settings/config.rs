use config::{Config, ConfigError, Environment, File};
use postgate_core::settings::api_server::{ApiServer, TenantSettings};
use serde::Deserialize;
use std::{collections::BTreeMap, env};

use super::content::ContentSettings;

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
pub struct Settings {
    pub debug: bool,
    pub telemetry: Option<String>,
    pub api: ApiServer,
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantSettings>,
    #[serde(default)]
    pub content: ContentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            telemetry: None,
            api: ApiServer::default(),
            tenants: BTreeMap::new(),
            content: ContentSettings::default(),
        }
    }
}

impl Settings {
    pub fn get_environment() -> Environment {
        Environment::default()
            .prefix("POSTGATE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("debug", false)?
            .set_default("api.bind_address", "0.0.0.0:21380")?
            .set_default("api.default_tenant", "default")?
            .set_default("api.rate_limit", 2000)
    }

    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("POSTGATE_RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Self::get_environment());

        Self::finish(builder.build()?)
    }

    /// Settings from a single file plus the environment.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name(path))
            .add_source(Self::get_environment());
        Self::finish(builder.build()?)
    }

    /// Deserializes and validates an assembled configuration.
    pub fn finish(config: Config) -> Result<Self, ConfigError> {
        let mut settings: Settings = config.try_deserialize()?;
        settings.telemetry = settings.check_if_optional(&settings.telemetry);
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.api.has_master_key() {
            return Err(ConfigError::Message(
                "api.master_key must be set, use POSTGATE__API__MASTER_KEY".into(),
            ));
        }
        self.api
            .flood_protection
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        if !self.tenants.contains_key(&self.api.default_tenant) {
            tracing::warn!(
                tenant = %self.api.default_tenant,
                "default tenant has no settings, unmatched hosts will be answered as disabled"
            );
        }
        Ok(())
    }

    fn check_if_optional(&self, s: &Option<String>) -> Option<String> {
        match s {
            None => None,
            Some(s) => match s.to_lowercase().as_str() {
                "no" | "false" | "0" | "" => None,
                _ => Some(s.to_string()),
            },
        }
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry
            .as_ref()
            .map(|settings| settings.to_lowercase().split(',').any(|s| s == "traces"))
            .unwrap_or(false)
    }
}
