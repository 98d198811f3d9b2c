//! ## evsim-telemetry::metrics
//! **Prometheus counters for simulation runs**
//!
//! A recorder is fed the engine's [`SimulatorStats`] after each run and renders
//! them in the Prometheus text format.

use evsim_core::SimulatorStats;
use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

use crate::TelemetryError;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub events_scheduled: IntCounter,
    pub events_executed: IntCounter,
    pub events_cancelled: IntCounter,
    pub events_removed: IntCounter,
    pub events_pending: IntGauge,
    pub virtual_time_seconds: Gauge,
    pub run_wall_seconds: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let events_scheduled =
            IntCounter::new("evsim_events_scheduled_total", "Events inserted into the queue")?;
        let events_executed =
            IntCounter::new("evsim_events_executed_total", "Event callbacks invoked")?;
        let events_cancelled =
            IntCounter::new("evsim_events_cancelled_total", "Events cancelled before firing")?;
        let events_removed =
            IntCounter::new("evsim_events_removed_total", "Events removed before firing")?;
        let events_pending =
            IntGauge::new("evsim_events_pending", "Events left in the queue after the run")?;
        let virtual_time_seconds =
            Gauge::new("evsim_virtual_time_seconds", "Simulated clock at the end of the run")?;
        let run_wall_seconds = Histogram::with_opts(
            HistogramOpts::new("evsim_run_wall_seconds", "Wall-clock duration of a run")
                .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0]),
        )?;

        registry.register(Box::new(events_scheduled.clone()))?;
        registry.register(Box::new(events_executed.clone()))?;
        registry.register(Box::new(events_cancelled.clone()))?;
        registry.register(Box::new(events_removed.clone()))?;
        registry.register(Box::new(events_pending.clone()))?;
        registry.register(Box::new(virtual_time_seconds.clone()))?;
        registry.register(Box::new(run_wall_seconds.clone()))?;

        Ok(Self {
            registry,
            events_scheduled,
            events_executed,
            events_cancelled,
            events_removed,
            events_pending,
            virtual_time_seconds,
            run_wall_seconds,
        })
    }

    /// Adds one finished run to the counters.
    pub fn record_run(
        &self,
        stats: &SimulatorStats,
        pending: usize,
        virtual_seconds: f64,
        wall_seconds: f64,
    ) {
        self.events_scheduled.inc_by(stats.scheduled);
        self.events_executed.inc_by(stats.executed);
        self.events_cancelled.inc_by(stats.cancelled);
        self.events_removed.inc_by(stats.removed);
        self.events_pending.set(pending as i64);
        self.virtual_time_seconds.set(virtual_seconds);
        self.run_wall_seconds.observe(wall_seconds);
    }

    pub fn gather_metrics(&self) -> Result<String, TelemetryError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_counters_are_exported() {
        let recorder = MetricsRecorder::new().unwrap();
        let stats = SimulatorStats {
            scheduled: 10,
            executed: 7,
            cancelled: 2,
            removed: 1,
        };
        recorder.record_run(&stats, 0, 1.5, 0.002);
        recorder.record_run(&stats, 3, 2.0, 0.004);

        assert_eq!(recorder.events_executed.get(), 14);
        assert_eq!(recorder.events_pending.get(), 3);

        let text = recorder.gather_metrics().unwrap();
        assert!(text.contains("evsim_events_scheduled_total 20"));
        assert!(text.contains("evsim_virtual_time_seconds 2"));
        assert!(text.contains("evsim_run_wall_seconds_count 2"));
    }
}
