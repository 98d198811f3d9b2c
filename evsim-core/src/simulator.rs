//! ## evsim-core::simulator
//! **The simulation façade**
//!
//! [`Simulator`] ties the clock, the event queue, the destroy list and the context
//! register together. It is a cheap handle (`Clone` shares the same engine) and is
//! handed to every callback, so model code never needs a global.
//!
//! ### Lifecycle
//! `Uninitialized -> Running -> Stopped -> Destroyed`, and `Destroyed -> Uninitialized`
//! as soon as new work is scheduled. `destroy` runs teardown callbacks in insertion
//! order, discards every pending event without running it, and resets the clock so
//! the same engine can host an independent simulation.
//!
//! ### Expectations
//! - Single-threaded and cooperative. `Simulator` is deliberately `!Send`.
//! - `now()` never decreases within a run.
//! - Callables are dropped only while no internal borrow is held.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::context::{ContextId, ContextRegister};
use crate::error::{fatal, SimError};
use crate::event::{EngineId, Event, EventFn, EventHandle, EventKind, EventRecord};
use crate::scheduler::{Scheduler, SchedulerKind};
use crate::time::{Resolution, TimeUnit, VirtualTime};

/// Construction-time knobs. None of them change the scheduling contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineOptions {
    pub scheduler: SchedulerKind,
    pub resolution: TimeUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SimulatorState {
    Uninitialized,
    Running,
    Stopped,
    Destroyed,
}

/// Counters since construction or the last `destroy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulatorStats {
    pub scheduled: u64,
    pub executed: u64,
    pub cancelled: u64,
    pub removed: u64,
}

struct SimulatorInner {
    engine: EngineId,
    options: EngineOptions,
    resolution: Resolution,
    scheduler: RefCell<Box<dyn Scheduler>>,
    destroy_events: RefCell<VecDeque<Event>>,
    destroy_seq: Cell<u64>,
    now: Cell<VirtualTime>,
    context: ContextRegister,
    in_run: Cell<bool>,
    stop_requested: Cell<bool>,
    stop_sentinels: RefCell<Vec<EventHandle>>,
    state: Cell<SimulatorState>,
    stats: Cell<SimulatorStats>,
}

impl SimulatorInner {
    fn bump(&self, update: impl FnOnce(&mut SimulatorStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

impl Drop for SimulatorInner {
    fn drop(&mut self) {
        // Callables may hold handles to their own events; take them out so the
        // records are freed along with the queue.
        let queued = self.scheduler.get_mut().drain();
        let destroy = std::mem::take(self.destroy_events.get_mut());
        for event in queued.iter().chain(destroy.iter()) {
            drop(event.record().mark_cancelled());
        }
    }
}

/// Handle to a discrete-event simulation engine.
#[derive(Clone)]
pub struct Simulator {
    inner: Rc<SimulatorInner>,
}

impl Default for Simulator {
    fn default() -> Self {
        Simulator::new(EngineOptions::default())
    }
}

impl Simulator {
    pub fn new(options: EngineOptions) -> Self {
        debug!(
            scheduler = %options.scheduler,
            resolution = %options.resolution,
            "creating simulator"
        );
        let engine = EngineId::next();
        Simulator {
            inner: Rc::new(SimulatorInner {
                engine,
                options,
                resolution: Resolution::new(options.resolution),
                scheduler: RefCell::new(options.scheduler.build_for(engine)),
                destroy_events: RefCell::new(VecDeque::new()),
                destroy_seq: Cell::new(0),
                now: Cell::new(VirtualTime::ZERO),
                context: ContextRegister::default(),
                in_run: Cell::new(false),
                stop_requested: Cell::new(false),
                stop_sentinels: RefCell::new(Vec::new()),
                state: Cell::new(SimulatorState::Uninitialized),
                stats: Cell::new(SimulatorStats::default()),
            }),
        }
    }

    pub fn with_scheduler(kind: SchedulerKind) -> Self {
        Simulator::new(EngineOptions {
            scheduler: kind,
            ..EngineOptions::default()
        })
    }

    pub fn options(&self) -> EngineOptions {
        self.inner.options
    }

    pub fn resolution(&self) -> &Resolution {
        &self.inner.resolution
    }

    /// `value` in `unit`, converted to ticks of this simulator's resolution.
    pub fn time(&self, value: i64, unit: TimeUnit) -> VirtualTime {
        self.inner.resolution.from_unit(value, unit)
    }

    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.inner.now.get()
    }

    pub fn current_context(&self) -> ContextId {
        self.inner.context.current()
    }

    pub fn state(&self) -> SimulatorState {
        self.inner.state.get()
    }

    pub fn stats(&self) -> SimulatorStats {
        self.inner.stats.get()
    }

    /// Pending events in the time-ordered queue.
    pub fn pending(&self) -> usize {
        self.inner.scheduler.borrow().len()
    }

    /// Earliest stop requested through [`Simulator::stop_at`] that is still pending.
    /// `None` once every stop has fired or been cancelled.
    pub fn stop_time(&self) -> Option<VirtualTime> {
        self.inner
            .stop_sentinels
            .borrow()
            .iter()
            .filter(|h| !h.is_expired())
            .filter_map(EventHandle::deadline)
            .min()
    }

    pub fn engine(&self) -> EngineId {
        self.inner.engine
    }

    /// The event behind `handle` was queued by this engine.
    pub fn owns(&self, handle: &EventHandle) -> bool {
        handle.engine() == Some(self.inner.engine)
    }

    /// Largest deadline an event can have.
    pub fn maximum_simulation_time(&self) -> VirtualTime {
        VirtualTime::MAX
    }

    /// Nothing left to run, or a stop was requested.
    pub fn is_finished(&self) -> bool {
        self.inner.stop_requested.get() || self.inner.scheduler.borrow().is_empty()
    }

    /// Schedules `f` to run `delay` after now, in the current context.
    pub fn schedule<F>(&self, delay: VirtualTime, f: F) -> EventHandle
    where
        F: FnOnce(&Simulator) + 'static,
    {
        self.try_schedule(delay, f).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_schedule<F>(&self, delay: VirtualTime, f: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&Simulator) + 'static,
    {
        self.insert(delay, self.current_context(), Box::new(f))
    }

    pub fn schedule_now<F>(&self, f: F) -> EventHandle
    where
        F: FnOnce(&Simulator) + 'static,
    {
        self.schedule(VirtualTime::ZERO, f)
    }

    /// Schedules `f` to run on behalf of `context` rather than the current one.
    pub fn schedule_with_context<F>(&self, context: ContextId, delay: VirtualTime, f: F)
    where
        F: FnOnce(&Simulator) + 'static,
    {
        self.try_schedule_with_context(context, delay, f)
            .unwrap_or_else(|e| fatal(e))
    }

    pub fn try_schedule_with_context<F>(
        &self,
        context: ContextId,
        delay: VirtualTime,
        f: F,
    ) -> Result<(), SimError>
    where
        F: FnOnce(&Simulator) + 'static,
    {
        self.insert(delay, context, Box::new(f)).map(drop)
    }

    /// Queues a teardown callback for [`Simulator::destroy`]. The handle can cancel it.
    pub fn schedule_destroy<F>(&self, f: F) -> EventHandle
    where
        F: FnOnce(&Simulator) + 'static,
    {
        let seq = self.inner.destroy_seq.get();
        self.inner.destroy_seq.set(seq + 1);
        let event = Event::new(EventRecord::new(
            self.inner.engine,
            seq,
            self.maximum_simulation_time(),
            self.current_context(),
            EventKind::Destroy,
            Box::new(f),
        ));
        let handle = event.handle();
        self.inner.destroy_events.borrow_mut().push_back(event);
        trace!(seq, "destroy event queued");
        handle
    }

    fn insert(
        &self,
        delay: VirtualTime,
        context: ContextId,
        callable: EventFn,
    ) -> Result<EventHandle, SimError> {
        let now = self.now();
        let deadline = now.checked_add(delay)?;
        if deadline < now {
            return Err(SimError::ScheduleInPast { deadline, now });
        }
        if self.state() == SimulatorState::Destroyed {
            self.inner.state.set(SimulatorState::Uninitialized);
        }

        let handle = self
            .inner
            .scheduler
            .borrow_mut()
            .insert(deadline, context, callable);
        self.inner.bump(|s| s.scheduled += 1);
        trace!(
            at = %deadline,
            %context,
            seq = handle.sequence().unwrap_or_default(),
            "event scheduled"
        );
        Ok(handle)
    }

    /// Cancels a pending event. Expired and null handles are ignored, as are handles
    /// to events of another engine.
    pub fn cancel(&self, handle: &EventHandle) {
        if !self.accepts(handle) {
            return;
        }
        let callable = match handle.kind() {
            Some(EventKind::Destroy) => handle.record().and_then(|r| r.mark_cancelled()),
            Some(EventKind::Timed) => self.inner.scheduler.borrow_mut().cancel(handle),
            None => None,
        };
        if callable.is_some() {
            self.inner.bump(|s| s.cancelled += 1);
        }
        drop(callable);
    }

    /// Cancels a pending event and erases it from its container where possible.
    pub fn remove(&self, handle: &EventHandle) {
        if !self.accepts(handle) {
            return;
        }
        let callable = match handle.kind() {
            Some(EventKind::Destroy) => {
                let callable = handle.record().and_then(|r| r.mark_cancelled());
                if callable.is_some() {
                    self.inner
                        .destroy_events
                        .borrow_mut()
                        .retain(|event| !event.refers_to(handle));
                }
                callable
            }
            Some(EventKind::Timed) => self.inner.scheduler.borrow_mut().remove(handle),
            None => None,
        };
        if callable.is_some() {
            self.inner.bump(|s| s.removed += 1);
        }
        drop(callable);
    }

    fn accepts(&self, handle: &EventHandle) -> bool {
        match handle.engine() {
            Some(engine) if engine != self.inner.engine => {
                warn!(
                    %engine,
                    own = %self.inner.engine,
                    "ignoring handle queued by another engine"
                );
                false
            }
            _ => true,
        }
    }

    pub fn is_expired(&self, handle: &EventHandle) -> bool {
        handle.is_expired()
    }

    /// A pending timed event whose deadline has not passed. Destroy events never run.
    pub fn is_running(&self, handle: &EventHandle) -> bool {
        handle.kind() == Some(EventKind::Timed)
            && !handle.is_expired()
            && handle.deadline().is_some_and(|at| at >= self.now())
    }

    /// Time until the event fires, zero once it has expired.
    pub fn get_delay_left(&self, handle: &EventHandle) -> VirtualTime {
        match handle.deadline() {
            Some(at) if !handle.is_expired() => at - self.now(),
            _ => VirtualTime::ZERO,
        }
    }

    /// Runs until the queue is empty or a stop is requested.
    pub fn run(&self) {
        self.try_run().unwrap_or_else(|e| fatal(e))
    }

    #[instrument(level = "debug", skip(self), fields(scheduler = %self.inner.options.scheduler))]
    pub fn try_run(&self) -> Result<(), SimError> {
        if self.inner.in_run.get() {
            return Err(SimError::ReentrantRun);
        }
        let _run = RunGuard::enter(&self.inner);
        self.inner.stop_requested.set(false);
        debug!(now = %self.now(), pending = self.pending(), "simulation started");

        while !self.inner.stop_requested.get() {
            let next = self.inner.scheduler.borrow_mut().pop_next();
            let Some(event) = next else {
                break;
            };
            self.execute(event);
        }

        debug!(now = %self.now(), pending = self.pending(), "simulation stopped");
        Ok(())
    }

    fn execute(&self, event: Event) {
        let now = self.now();
        let deadline = event.deadline();
        if deadline < now {
            fatal(SimError::ScheduleInPast { deadline, now });
        }
        self.inner.now.set(deadline);

        let Some(callable) = event.record().take_for_execution() else {
            return;
        };
        self.inner.bump(|s| s.executed += 1);
        trace!(
            now = %deadline,
            context = %event.context(),
            seq = event.sequence(),
            "executing event"
        );
        let _ctx = self.inner.context.enter(event.context());
        callable(self);
    }

    /// Ends the current run after the executing event returns.
    pub fn stop(&self) {
        if !self.inner.stop_requested.replace(true) {
            debug!(now = %self.now(), "stop requested");
        }
    }

    /// Stops the run once the clock reaches `at`.
    pub fn stop_at(&self, at: VirtualTime) -> EventHandle {
        self.try_stop_at(at).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_stop_at(&self, at: VirtualTime) -> Result<EventHandle, SimError> {
        let now = self.now();
        if at < now {
            return Err(SimError::ScheduleInPast { deadline: at, now });
        }
        let delay = at.checked_sub(now)?;
        let sentinel: EventFn = Box::new(|sim: &Simulator| sim.stop());
        let handle = self.insert(delay, ContextId::NONE, sentinel)?;
        let mut sentinels = self.inner.stop_sentinels.borrow_mut();
        sentinels.retain(|h| !h.is_expired());
        sentinels.push(handle.clone());
        debug!(%at, "stop scheduled");
        Ok(handle)
    }

    /// Relative form of [`Simulator::stop_at`].
    pub fn stop_after(&self, delay: VirtualTime) -> EventHandle {
        self.stop_at(self.now() + delay)
    }

    /// Runs teardown callbacks, discards pending events and resets the clock.
    pub fn destroy(&self) {
        self.try_destroy().unwrap_or_else(|e| fatal(e))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn try_destroy(&self) -> Result<(), SimError> {
        if self.inner.in_run.get() {
            return Err(SimError::DestroyWhileRunning);
        }

        let mut teardown = 0usize;
        loop {
            let next = self.inner.destroy_events.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let Some(callable) = event.record().take_for_execution() else {
                continue;
            };
            teardown += 1;
            let _ctx = self.inner.context.enter(event.context());
            callable(self);
        }

        let mut old = self
            .inner
            .scheduler
            .replace(self.inner.options.scheduler.build_for(self.inner.engine));
        let leftovers = old.drain();
        drop(old);
        let mut discarded = 0usize;
        for event in &leftovers {
            if let Some(callable) = event.record().mark_cancelled() {
                discarded += 1;
                drop(callable);
            }
        }
        drop(leftovers);

        self.inner.now.set(VirtualTime::ZERO);
        self.inner.stop_requested.set(false);
        self.inner.stop_sentinels.borrow_mut().clear();
        self.inner.destroy_seq.set(0);
        self.inner.context.reset();
        self.inner.stats.set(SimulatorStats::default());
        self.inner.state.set(SimulatorState::Destroyed);
        debug!(teardown, discarded, "simulator destroyed");
        Ok(())
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("now", &self.now())
            .field("state", &self.state())
            .field("scheduler", &self.inner.options.scheduler)
            .field("in_run", &self.inner.in_run.get())
            .finish()
    }
}

/// Marks the engine as running for the lifetime of a `run` call, unwinds included.
struct RunGuard<'a> {
    inner: &'a SimulatorInner,
}

impl<'a> RunGuard<'a> {
    fn enter(inner: &'a SimulatorInner) -> Self {
        inner.in_run.set(true);
        inner.state.set(SimulatorState::Running);
        RunGuard { inner }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_run.set(false);
        self.inner.state.set(SimulatorState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn t(v: i64) -> VirtualTime {
        VirtualTime::from_integer(v)
    }

    fn recorder() -> (Rc<RefCell<Vec<i64>>>, impl Fn(i64) -> Box<dyn FnOnce(&Simulator)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |tag: i64| -> Box<dyn FnOnce(&Simulator)> {
            let sink = Rc::clone(&sink);
            Box::new(move |_| sink.borrow_mut().push(tag))
        };
        (log, make)
    }

    #[test]
    fn runs_in_deadline_order_and_advances_clock() {
        let sim = Simulator::default();
        let (log, make) = recorder();
        for d in [5, 1, 3] {
            sim.schedule(t(d), make(d));
        }
        assert_eq!(sim.pending(), 3);
        sim.run();
        assert_eq!(*log.borrow(), vec![1, 3, 5]);
        assert_eq!(sim.now(), t(5));
        assert_eq!(sim.state(), SimulatorState::Stopped);
        assert_eq!(sim.stats().executed, 3);
        assert!(sim.is_finished());
    }

    #[test]
    fn nested_scheduling_is_relative_to_now() {
        let sim = Simulator::default();
        let seen = Rc::new(Cell::new(VirtualTime::ZERO));
        let sink = Rc::clone(&seen);
        sim.schedule(t(10), move |sim| {
            sim.schedule(t(5), move |sim| sink.set(sim.now()));
        });
        sim.run();
        assert_eq!(seen.get(), t(15));
    }

    #[test]
    fn scheduling_in_the_past_is_rejected() {
        let sim = Simulator::default();
        let err = sim.try_schedule(-t(1), |_| {}).unwrap_err();
        assert_eq!(
            err,
            SimError::ScheduleInPast {
                deadline: -t(1),
                now: VirtualTime::ZERO
            }
        );
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    #[should_panic(expected = "before the current time")]
    fn schedule_in_past_is_fatal() {
        Simulator::default().schedule(-t(1), |_| {});
    }

    #[test]
    fn cancel_prevents_execution_and_is_idempotent() {
        let sim = Simulator::default();
        let (log, make) = recorder();
        let h = sim.schedule(t(1), make(1));
        sim.schedule(t(2), make(2));
        sim.cancel(&h);
        sim.cancel(&h);
        assert!(sim.is_expired(&h));
        assert_eq!(sim.stats().cancelled, 1);
        sim.run();
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn cancel_from_inside_own_callback_is_a_noop() {
        let sim = Simulator::default();
        let slot = Rc::new(RefCell::new(EventHandle::null()));
        let inner = Rc::clone(&slot);
        let h = sim.schedule(t(1), move |sim| {
            let me = inner.borrow().clone();
            assert!(sim.is_expired(&me));
            sim.cancel(&me);
        });
        *slot.borrow_mut() = h;
        sim.run();
        assert_eq!(sim.stats().cancelled, 0);
        assert_eq!(sim.stats().executed, 1);
    }

    #[test]
    fn stop_ends_the_loop_and_run_resumes() {
        let sim = Simulator::default();
        let (log, make) = recorder();
        sim.schedule(t(1), |sim| sim.stop());
        sim.schedule(t(2), make(2));
        sim.run();
        assert!(log.borrow().is_empty());
        assert_eq!(sim.now(), t(1));
        sim.run();
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn stop_at_fires_at_absolute_time() {
        let sim = Simulator::default();
        let (log, make) = recorder();
        for d in [1, 5, 9] {
            sim.schedule(t(d), make(d));
        }
        sim.stop_at(t(5));
        assert_eq!(sim.stop_time(), Some(t(5)));
        sim.run();
        // The sentinel was scheduled after the t=5 event, so that event still runs.
        assert_eq!(*log.borrow(), vec![1, 5]);
        assert_eq!(sim.now(), t(5));
        assert_eq!(sim.pending(), 1);
        assert_eq!(sim.stop_time(), None);
    }

    #[test]
    fn stop_time_tracks_only_pending_stops() {
        let sim = Simulator::default();
        sim.schedule(t(9), |_| {});
        let early = sim.stop_at(t(5));
        sim.stop_at(t(7));
        assert_eq!(sim.stop_time(), Some(t(5)));
        sim.cancel(&early);
        assert_eq!(sim.stop_time(), Some(t(7)));
        sim.run();
        assert_eq!(sim.now(), t(7));
        assert_eq!(sim.stop_time(), None);
        sim.run();
        assert_eq!(sim.now(), t(9));
        assert_eq!(sim.stop_time(), None);
    }

    #[test]
    fn stop_at_in_the_past_is_rejected() {
        let sim = Simulator::default();
        sim.schedule(t(4), |_| {});
        sim.run();
        assert!(sim.try_stop_at(t(2)).is_err());
    }

    #[test]
    fn stop_before_run_is_ignored() {
        let sim = Simulator::default();
        let (log, make) = recorder();
        sim.schedule(t(1), make(1));
        sim.stop();
        sim.run();
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn reentrant_run_is_reported() {
        let sim = Simulator::default();
        let result = Rc::new(RefCell::new(None));
        let out = Rc::clone(&result);
        sim.schedule(t(1), move |sim| {
            *out.borrow_mut() = Some(sim.try_run());
        });
        sim.run();
        assert_eq!(*result.borrow(), Some(Err(SimError::ReentrantRun)));
    }

    #[test]
    fn delay_left_and_running_state() {
        let sim = Simulator::default();
        let h = sim.schedule(t(10), |_| {});
        sim.schedule(t(4), |sim| sim.stop());
        sim.run();
        assert!(sim.is_running(&h));
        assert_eq!(sim.get_delay_left(&h), t(6));
        sim.run();
        assert!(!sim.is_running(&h));
        assert_eq!(sim.get_delay_left(&h), VirtualTime::ZERO);
    }

    #[test]
    fn remove_erases_queued_and_destroy_events() {
        let sim = Simulator::with_scheduler(SchedulerKind::Map);
        let (log, make) = recorder();
        let h = sim.schedule(t(1), make(1));
        let d = sim.schedule_destroy(make(100));
        assert!(!sim.is_expired(&d));
        sim.remove(&h);
        sim.remove(&d);
        assert!(sim.is_expired(&d));
        assert_eq!(sim.stats().removed, 2);
        sim.run();
        sim.destroy();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn destroy_rearms_on_new_work() {
        let sim = Simulator::default();
        sim.schedule(t(3), |_| {});
        sim.run();
        sim.destroy();
        assert_eq!(sim.state(), SimulatorState::Destroyed);
        assert_eq!(sim.now(), VirtualTime::ZERO);
        assert_eq!(sim.stats(), SimulatorStats::default());

        let h = sim.schedule(t(2), |_| {});
        assert_eq!(sim.state(), SimulatorState::Uninitialized);
        assert_eq!(h.sequence(), Some(0));
        sim.run();
        assert_eq!(sim.now(), t(2));
    }

    #[test]
    fn dropping_the_engine_frees_self_referencing_callbacks() {
        let alive = Rc::new(());
        let weak = Rc::downgrade(&alive);
        {
            let sim = Simulator::default();
            let slot = Rc::new(RefCell::new(EventHandle::null()));
            let inner = Rc::clone(&slot);
            let h = sim.schedule(t(1), move |_| {
                let _own = inner.borrow();
                let _alive = &alive;
            });
            *slot.borrow_mut() = h;
        }
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn time_helper_uses_resolution() {
        let sim = Simulator::new(EngineOptions {
            scheduler: SchedulerKind::List,
            resolution: TimeUnit::Us,
        });
        assert_eq!(sim.time(3, TimeUnit::Ms), t(3_000));
        assert_eq!(sim.resolution().unit(), TimeUnit::Us);
    }

    #[test]
    #[traced_test]
    fn lifecycle_is_logged() {
        let sim = Simulator::default();
        sim.schedule(t(1), |_| {});
        sim.run();
        sim.destroy();
        assert!(logs_contain("simulation started"));
        assert!(logs_contain("simulator destroyed"));
    }
}
