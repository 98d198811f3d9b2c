use evsim_config::ConfigError;
use evsim_core::SimError;
use evsim_telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("simulation error: {0}")]
    Engine(#[from] SimError),

    #[error("trace digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("scenario `{scenario}` violated an invariant: {detail}")]
    Invariant {
        scenario: &'static str,
        detail: String,
    },
}
