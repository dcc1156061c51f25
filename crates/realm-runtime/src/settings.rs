//! Application configuration: optional YAML file, then `REALM_*` environment
//! overrides layered on top with the `config` crate.
//!
//! Top-level keys map directly (`REALM_DATABASE_URL`, `REALM_ADMIN_EMAIL`);
//! nested keys use a double underscore (`REALM_PROJECTION__RNG_SEED`).

use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "REALM";
/// Environment variable overriding [`AppConfig::database_url`].
pub const ENV_DATABASE_URL: &str = "REALM_DATABASE_URL";
/// Environment variable overriding [`ProjectionConfig::rng_seed`].
pub const ENV_RNG_SEED: &str = "REALM_PROJECTION__RNG_SEED";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Projection parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Months projected when the caller does not say.
    pub default_months: i32,
    /// Upper bound on requested months.
    pub max_months: i32,
    /// Seed for reproducible projections; entropy when absent.
    pub rng_seed: Option<u64>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            default_months: 12,
            max_months: 120,
            rng_seed: None,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    /// Account promoted to admin when the database is initialised.
    pub admin_email: Option<String>,
    pub projection: ProjectionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: persistence::default_sqlite_url().to_string(),
            admin_email: None,
            projection: ProjectionConfig::default(),
        }
    }
}

fn environment(vars: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .ignore_empty(true)
        .source(vars)
}

impl AppConfig {
    /// Parse YAML text alone, without environment overrides.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(text, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an optional file and apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`AppConfig::load`], reading overrides from `vars` instead of the
    /// process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        vars: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(p) = path {
            debug!(path = %p.display(), "loading config file");
            builder = builder.add_source(File::from(p).format(FileFormat::Yaml).required(true));
        }
        let cfg: AppConfig = builder
            .add_source(environment(vars))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.projection;
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "database_url",
                value: self.database_url.clone(),
            });
        }
        if p.max_months < 1 {
            return Err(ConfigError::InvalidValue {
                key: "projection.max_months",
                value: p.max_months.to_string(),
            });
        }
        if p.default_months < 1 || p.default_months > p.max_months {
            return Err(ConfigError::InvalidValue {
                key: "projection.default_months",
                value: p.default_months.to_string(),
            });
        }
        Ok(())
    }
}
