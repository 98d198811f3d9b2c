//! Custom validation functions for configuration.

use evsim_core::Resolution;
use validator::ValidationError;

use crate::SimulatorConfig;

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a `tracing` level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate a stop time in seconds: finite and not negative.
pub fn validate_stop_at(seconds: f64) -> Result<(), ValidationError> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_stop_at"))
    }
}

/// The stop time must fit in ticks of the configured resolution.
pub fn validate_stop_range(config: &SimulatorConfig) -> Result<(), ValidationError> {
    let Some(seconds) = config.stop_at else {
        return Ok(());
    };
    match Resolution::new(config.resolution).try_from_seconds(seconds) {
        Ok(_) => Ok(()),
        Err(_) => {
            let mut err = ValidationError::new("stop_at_out_of_range");
            err.message = Some(
                format!("stop_at {seconds}s does not fit in {} ticks", config.resolution).into(),
            );
            Err(err)
        }
    }
}
