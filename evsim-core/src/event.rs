//! ## evsim-core::event
//! **Events and the handles that observe them**
//!
//! An [`EventRecord`] is shared between the queue entry ([`Event`]) and any number of
//! [`EventHandle`]s. The record owns the callable only while the event is pending:
//! cancelling or executing takes the callable out, so closures that capture their own
//! handle never form a lasting reference cycle.
//!
//! ### Expectations
//! - Handles observe one shared state: cancel through any alias is seen by all.
//! - Callables are handed back to the caller to drop, never dropped while the
//!   scheduler is borrowed, so their destructors may call into the simulator.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::Serialize;

use crate::context::ContextId;
use crate::simulator::Simulator;
use crate::time::VirtualTime;

/// Type-erased one-shot callback. Arguments are bound into the closure at schedule time.
pub type EventFn = Box<dyn FnOnce(&Simulator)>;

/// Lifecycle of an event. Leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventState {
    Pending,
    Cancelled,
    Executed,
}

/// Where an event lives: the time-ordered queue or the destroy list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Timed,
    Destroy,
}

/// Identity of the engine that queued an event.
///
/// Handles carry it so an engine can tell its own events from another engine's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    /// A process-wide unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        EngineId(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Shared lifecycle state of one event.
pub(crate) struct EventRecord {
    engine: EngineId,
    seq: u64,
    deadline: VirtualTime,
    context: ContextId,
    kind: EventKind,
    state: Cell<EventState>,
    callable: RefCell<Option<EventFn>>,
}

impl EventRecord {
    pub(crate) fn new(
        engine: EngineId,
        seq: u64,
        deadline: VirtualTime,
        context: ContextId,
        kind: EventKind,
        callable: EventFn,
    ) -> Rc<Self> {
        Rc::new(EventRecord {
            engine,
            seq,
            deadline,
            context,
            kind,
            state: Cell::new(EventState::Pending),
            callable: RefCell::new(Some(callable)),
        })
    }

    pub(crate) fn engine(&self) -> EngineId {
        self.engine
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn deadline(&self) -> VirtualTime {
        self.deadline
    }

    pub(crate) fn context(&self) -> ContextId {
        self.context
    }

    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    pub(crate) fn state(&self) -> EventState {
        self.state.get()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state.get() == EventState::Pending
    }

    /// Flips a pending event to `Cancelled` and hands back its callable.
    /// `None` if the event already left `Pending`.
    #[must_use = "the callable must be dropped by the caller"]
    pub(crate) fn mark_cancelled(&self) -> Option<EventFn> {
        if !self.is_pending() {
            return None;
        }
        self.state.set(EventState::Cancelled);
        self.callable.borrow_mut().take()
    }

    /// Flips a pending event to `Executed` and hands back its callable for invocation.
    pub(crate) fn take_for_execution(&self) -> Option<EventFn> {
        if !self.is_pending() {
            return None;
        }
        self.state.set(EventState::Executed);
        self.callable.borrow_mut().take()
    }
}

impl fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecord")
            .field("engine", &self.engine)
            .field("seq", &self.seq)
            .field("deadline", &self.deadline)
            .field("context", &self.context)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Queue ordering key, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub deadline: VirtualTime,
    pub seq: u64,
}

/// A queue entry. Owned by a [`Scheduler`](crate::scheduler::Scheduler) while pending.
#[derive(Debug, Clone)]
pub struct Event {
    key: EventKey,
    record: Rc<EventRecord>,
}

impl Event {
    pub(crate) fn new(record: Rc<EventRecord>) -> Self {
        Event {
            key: EventKey {
                deadline: record.deadline(),
                seq: record.seq(),
            },
            record,
        }
    }

    pub fn key(&self) -> EventKey {
        self.key
    }

    pub fn deadline(&self) -> VirtualTime {
        self.key.deadline
    }

    pub fn sequence(&self) -> u64 {
        self.key.seq
    }

    pub fn context(&self) -> ContextId {
        self.record.context()
    }

    pub fn state(&self) -> EventState {
        self.record.state()
    }

    pub fn is_pending(&self) -> bool {
        self.record.is_pending()
    }

    pub fn handle(&self) -> EventHandle {
        EventHandle(Some(Rc::clone(&self.record)))
    }

    pub(crate) fn record(&self) -> &EventRecord {
        &self.record
    }

    pub(crate) fn refers_to(&self, handle: &EventHandle) -> bool {
        handle
            .0
            .as_ref()
            .is_some_and(|r| Rc::ptr_eq(r, &self.record))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Cheap, clonable reference to one event's lifecycle state.
///
/// Does not keep the callable alive. The default handle is null and always expired.
/// Equality and hashing follow the identity of the underlying event.
#[derive(Clone, Default)]
pub struct EventHandle(Option<Rc<EventRecord>>);

impl EventHandle {
    pub const fn null() -> Self {
        EventHandle(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Null, cancelled or executed.
    pub fn is_expired(&self) -> bool {
        self.0.as_ref().map_or(true, |r| !r.is_pending())
    }

    pub fn deadline(&self) -> Option<VirtualTime> {
        self.0.as_ref().map(|r| r.deadline())
    }

    pub fn context(&self) -> Option<ContextId> {
        self.0.as_ref().map(|r| r.context())
    }

    pub fn sequence(&self) -> Option<u64> {
        self.0.as_ref().map(|r| r.seq())
    }

    /// Engine that queued the event.
    pub fn engine(&self) -> Option<EngineId> {
        self.0.as_ref().map(|r| r.engine())
    }

    pub fn kind(&self) -> Option<EventKind> {
        self.0.as_ref().map(|r| r.kind())
    }

    pub fn state(&self) -> Option<EventState> {
        self.0.as_ref().map(|r| r.state())
    }

    pub(crate) fn record(&self) -> Option<&Rc<EventRecord>> {
        self.0.as_ref()
    }
}

impl PartialEq for EventHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for EventHandle {}

impl Hash for EventHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_ref().map(Rc::as_ptr).hash(state);
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("EventHandle(null)"),
            Some(r) => write!(
                f,
                "EventHandle(seq={}, at={}, ctx={}, {:?})",
                r.seq(),
                r.deadline(),
                r.context(),
                r.state()
            ),
        }
    }
}
