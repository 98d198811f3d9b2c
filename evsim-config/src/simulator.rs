//! Simulator configuration.
//!
//! Construction-time knobs of the engine plus the run parameters shared by every
//! scenario: scheduler backend, tick resolution, optional stop time and RNG seed.

use evsim_core::{EngineOptions, Resolution, SchedulerKind, TimeError, TimeUnit, VirtualTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_stop_range))]
pub struct SimulatorConfig {
    /// Event queue backend.
    #[serde(default)]
    pub scheduler: SchedulerKind,

    /// Length of one integer tick.
    #[serde(default)]
    pub resolution: TimeUnit,

    /// Stop the run at this many simulated seconds.
    #[serde(default)]
    #[validate(custom(function = validation::validate_stop_at))]
    pub stop_at: Option<f64>,

    /// Seed for deterministic scenarios.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            resolution: TimeUnit::default(),
            stop_at: None,
            seed: default_seed(),
        }
    }
}

impl SimulatorConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            scheduler: self.scheduler,
            resolution: self.resolution,
        }
    }

    /// `stop_at` converted to ticks of `resolution`.
    pub fn stop_time(&self, resolution: &Resolution) -> Result<Option<VirtualTime>, TimeError> {
        self.stop_at
            .map(|seconds| resolution.try_from_seconds(seconds))
            .transpose()
    }
}
