//! ## evsim-telemetry::logging
//! **`tracing` subscriber setup and run summaries**
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies. Per-event
//! execution is logged by the engine at `trace`, lifecycle at `debug`.

use evsim_core::{SimulatorStats, VirtualTime};
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::TelemetryError;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Panics if one is already installed.
    pub fn init(level: &str) {
        Self::builder(level).init()
    }

    /// Like [`EventLogger::init`], but reports an already-installed subscriber.
    pub fn try_init(level: &str) -> Result<(), TelemetryError> {
        Self::builder(level)
            .try_init()
            .map_err(|e| TelemetryError::Subscriber(e.to_string()))
    }

    fn builder(
        level: &str,
    ) -> fmt::SubscriberBuilder<fmt::format::DefaultFields, fmt::format::Format, EnvFilter> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .with_target(false)
            .with_span_events(FmtSpan::CLOSE)
    }

    /// One `info` line summarising a finished run.
    pub fn log_run_summary(scenario: &str, now: VirtualTime, stats: &SimulatorStats) {
        info!(
            scenario,
            %now,
            scheduled = stats.scheduled,
            executed = stats.executed,
            cancelled = stats.cancelled,
            removed = stats.removed,
            "simulation run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn run_summary_is_logged() {
        let stats = SimulatorStats {
            scheduled: 4,
            executed: 3,
            cancelled: 1,
            removed: 0,
        };
        EventLogger::log_run_summary("unit", VirtualTime::from_integer(10), &stats);
        assert!(logs_contain("simulation run finished"));
        assert!(logs_contain("executed=3"));
    }
}
