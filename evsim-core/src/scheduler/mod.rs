//! ## evsim-core::scheduler
//! **Ordered containers of pending events**
//!
//! Every backend orders events by `(deadline, sequence)` and hands out sequence
//! numbers strictly at insertion, so equal deadlines pop in insertion order no matter
//! what else was cancelled in between.
//!
//! Each scheduler belongs to one engine ([`EngineId`]) and ignores handles to events
//! it did not queue, so its pending count only moves for its own events.
//!
//! Cancellation is a tombstone: the event is flipped to `Cancelled` in place and
//! skipped when it reaches the front. [`Scheduler::remove`] additionally erases the
//! entry on backends that can do so cheaply.
//!
//! ### Backends
//! - [`HeapScheduler`]: binary heap, the reference backend.
//! - [`MapScheduler`]: ordered map keyed by `(deadline, sequence)`.
//! - [`ListScheduler`]: sorted list with binary-search insertion; fine for small queues.

mod heap;
mod list;
mod map;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ContextId;
use crate::event::{EngineId, Event, EventFn, EventHandle, EventKey, EventKind, EventRecord};
use crate::time::VirtualTime;

pub use heap::HeapScheduler;
pub use list::ListScheduler;
pub use map::MapScheduler;

/// Storage strategy behind the simulator's event queue.
pub trait Scheduler {
    fn name(&self) -> &'static str;

    /// Engine whose events this scheduler holds.
    fn engine(&self) -> EngineId;

    /// Hands out the next insertion sequence number.
    fn next_sequence(&mut self) -> u64;

    /// Stores an event whose sequence came from [`Scheduler::next_sequence`].
    fn push(&mut self, event: Event);

    /// Number of pending (non-tombstoned) events.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum-keyed pending event. Tombstones found at the front are discarded.
    fn peek_next(&mut self) -> Option<&Event>;

    /// Removes and returns the minimum-keyed pending event.
    fn pop_next(&mut self) -> Option<Event>;

    /// Tombstones the event behind `handle` and returns its callable for the caller
    /// to drop. `None` if the handle is null, expired, not a queued event or queued by
    /// another engine.
    fn cancel(&mut self, handle: &EventHandle) -> Option<EventFn>;

    /// Like [`Scheduler::cancel`], but erases the entry where the backend allows.
    fn remove(&mut self, handle: &EventHandle) -> Option<EventFn> {
        self.cancel(handle)
    }

    /// Empties the container, tombstones included.
    fn drain(&mut self) -> Vec<Event>;

    fn insert(
        &mut self,
        deadline: VirtualTime,
        context: ContextId,
        callable: EventFn,
    ) -> EventHandle {
        let seq = self.next_sequence();
        let event = Event::new(EventRecord::new(
            self.engine(),
            seq,
            deadline,
            context,
            EventKind::Timed,
            callable,
        ));
        let handle = event.handle();
        self.push(event);
        handle
    }
}

/// Tombstones a queued event of `engine` and returns its key, for backends that also
/// erase it.
fn tombstone(engine: EngineId, handle: &EventHandle) -> Option<(EventKey, EventFn)> {
    let record = handle.record()?;
    if record.kind() != EventKind::Timed || record.engine() != engine {
        return None;
    }
    let callable = record.mark_cancelled()?;
    let key = EventKey {
        deadline: record.deadline(),
        seq: record.seq(),
    };
    Some((key, callable))
}

/// Selects a [`Scheduler`] backend by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Heap,
    Map,
    List,
}

impl SchedulerKind {
    pub const ALL: [SchedulerKind; 3] = [
        SchedulerKind::Heap,
        SchedulerKind::Map,
        SchedulerKind::List,
    ];

    /// A standalone scheduler with its own engine id.
    pub fn build(self) -> Box<dyn Scheduler> {
        self.build_for(EngineId::next())
    }

    pub fn build_for(self, engine: EngineId) -> Box<dyn Scheduler> {
        match self {
            SchedulerKind::Heap => Box::new(HeapScheduler::with_engine(engine)),
            SchedulerKind::Map => Box::new(MapScheduler::with_engine(engine)),
            SchedulerKind::List => Box::new(ListScheduler::with_engine(engine)),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SchedulerKind::Heap => "heap",
            SchedulerKind::Map => "map",
            SchedulerKind::List => "list",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scheduler `{0}` (expected heap, map or list)")]
pub struct ParseSchedulerKindError(String);

impl FromStr for SchedulerKind {
    type Err = ParseSchedulerKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchedulerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseSchedulerKindError(s.to_string()))
    }
}
