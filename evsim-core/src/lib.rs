//! # evsim-core
//!
//! Deterministic discrete-event simulation engine.
//!
//! Simulated activity is expressed as callbacks scheduled against a virtual clock.
//! Events run one at a time in `(deadline, insertion order)` order, so a run is fully
//! reproducible from its inputs.
//!
//! ## Key Components:
//! - **VirtualTime:** exact Q64.64 time with overflow-checked arithmetic.
//! - **Scheduler:** tombstoned event queues (heap, ordered map, sorted list).
//! - **EventHandle:** cancellable, clonable references to scheduled events.
//! - **Context:** the entity id a callback runs on behalf of.
//! - **Simulator:** the run/stop/destroy façade tying it all together.
//! - **Timer:** restartable timers on top of the façade.
//!
//! ```
//! use evsim_core::{Simulator, VirtualTime};
//!
//! let sim = Simulator::default();
//! sim.schedule(VirtualTime::from_integer(5), |sim| {
//!     assert_eq!(sim.now(), VirtualTime::from_integer(5));
//! });
//! sim.run();
//! ```

pub mod context;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod simulator;
pub mod time;
pub mod timer;

pub use context::ContextId;
pub use error::{fatal, SimError};
pub use event::{EngineId, Event, EventFn, EventHandle, EventKey, EventKind, EventState};
pub use scheduler::{HeapScheduler, ListScheduler, MapScheduler, Scheduler, SchedulerKind};
pub use simulator::{EngineOptions, Simulator, SimulatorState, SimulatorStats};
pub use time::{Resolution, TimeError, TimeUnit, VirtualTime};
pub use timer::{DestroyPolicy, Timer, TimerState};
