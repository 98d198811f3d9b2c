//! # evsim Configuration
//!
//! Layered configuration for the simulation engine and its tooling.
//!
//! ## Features
//! - **Layering**: defaults, YAML files and `EVSIM_*` environment variables
//! - **Validation**: every loaded configuration is checked before use

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod simulator;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use simulator::SimulatorConfig;
pub use telemetry::TelemetryConfig;
pub use validation::LOG_LEVELS;

const BASE_FILE: &str = "config/evsim.yaml";
const ENV_PREFIX: &str = "EVSIM_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct EvsimConfig {
    /// Engine construction and run parameters.
    #[serde(default)]
    #[validate(nested)]
    pub simulator: SimulatorConfig,

    /// Logging and metrics.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl EvsimConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/evsim.yaml`, if present
    /// 3. `config/<EVSIM_ENV>.yaml`, if present
    /// 4. `EVSIM_*` environment variables, `__` separating nested keys
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(EvsimConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("EVSIM_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::extract(figment.merge(Self::env_provider()))
    }

    /// Load configuration from a specific file, still honouring `EVSIM_*` overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        Self::extract(
            Figment::from(Serialized::defaults(EvsimConfig::default()))
                .merge(Yaml::file(path))
                .merge(Self::env_provider()),
        )
    }

    fn env_provider() -> Env {
        // EVSIM_ENV selects a file; it is not a config key.
        Env::prefixed(ENV_PREFIX)
            .ignore(&["ENV"])
            .split("__")
    }

    /// Re-run validation, e.g. after command-line overrides were applied.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(ConfigError::from)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.check()?;
                Ok(config)
            })
    }
}
