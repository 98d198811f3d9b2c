use thiserror::Error;
use tracing::error;

use crate::time::{TimeError, VirtualTime};

/// Conditions that mean the simulation's clock or control flow can no longer be trusted.
///
/// The `try_*` entry points hand these back to the caller. Everything else routes them
/// through [`fatal`], which logs and panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("cannot schedule an event at {deadline} before the current time {now}")]
    ScheduleInPast {
        deadline: VirtualTime,
        now: VirtualTime,
    },

    #[error("Simulator::run called from inside a running event")]
    ReentrantRun,

    #[error("Simulator::destroy called from inside a running event")]
    DestroyWhileRunning,

    #[error("timer scheduled while its previous event is still pending")]
    TimerAlreadyRunning,

    #[error("timer {0} while it is not in a state that allows it")]
    TimerState(&'static str),

    #[error("timer dropped with a pending event")]
    TimerDroppedWhileRunning,

    #[error(transparent)]
    Time(#[from] TimeError),
}

/// Logs `err` and aborts the current simulation by panicking.
#[track_caller]
pub fn fatal(err: impl Into<SimError>) -> ! {
    let err = err.into();
    error!(%err, "fatal simulation error");
    panic!("{err}")
}
