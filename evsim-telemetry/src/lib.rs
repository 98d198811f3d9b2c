//! # evsim Telemetry
//!
//! Logging subscriber setup and Prometheus counters for simulation runs.

pub mod logging;
pub mod metrics;

use thiserror::Error;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),

    #[error("metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
