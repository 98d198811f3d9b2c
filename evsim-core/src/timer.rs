//! ## evsim-core::timer
//! **Restartable timers**
//!
//! A [`Timer`] owns a delay and a repeatable callback and keeps the handle of the one
//! event it currently has in flight. It is the building block for retransmission and
//! keep-alive timers: arm it, cancel it on success, re-arm it from its own callback.
//!
//! The callback should not own the timer (hold a `Weak` instead), otherwise the timer
//! and its callback keep each other alive.

use std::rc::Rc;

use serde::Serialize;

use crate::error::{fatal, SimError};
use crate::event::EventHandle;
use crate::simulator::Simulator;
use crate::time::VirtualTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimerState {
    Running,
    Expired,
    Suspended,
}

/// What dropping a timer does to its pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum DestroyPolicy {
    #[default]
    CancelOnDrop,
    RemoveOnDrop,
    /// Dropping a running timer is a programming error.
    CheckOnDrop,
}

pub struct Timer {
    sim: Simulator,
    delay: VirtualTime,
    callback: Rc<dyn Fn(&Simulator)>,
    policy: DestroyPolicy,
    event: EventHandle,
    suspended_left: Option<VirtualTime>,
}

impl Timer {
    pub fn new<F>(sim: &Simulator, policy: DestroyPolicy, callback: F) -> Self
    where
        F: Fn(&Simulator) + 'static,
    {
        Timer {
            sim: sim.clone(),
            delay: VirtualTime::ZERO,
            callback: Rc::new(callback),
            policy,
            event: EventHandle::null(),
            suspended_left: None,
        }
    }

    /// Delay used by the next [`Timer::schedule`]. Does not touch a running event.
    pub fn set_delay(&mut self, delay: VirtualTime) {
        self.delay = delay;
    }

    pub fn delay(&self) -> VirtualTime {
        self.delay
    }

    pub fn policy(&self) -> DestroyPolicy {
        self.policy
    }

    pub fn schedule(&mut self) {
        self.schedule_with(self.delay);
    }

    /// Arms the timer to fire `delay` from now. Fatal if it is already running.
    pub fn schedule_with(&mut self, delay: VirtualTime) {
        if !self.event.is_expired() {
            fatal(SimError::TimerAlreadyRunning);
        }
        let callback = Rc::clone(&self.callback);
        self.event = self.sim.schedule(delay, move |sim| callback(sim));
    }

    pub fn cancel(&mut self) {
        self.sim.cancel(&self.event);
        self.suspended_left = None;
    }

    pub fn remove(&mut self) {
        self.sim.remove(&self.event);
        self.suspended_left = None;
    }

    pub fn is_expired(&self) -> bool {
        !self.is_suspended() && self.event.is_expired()
    }

    pub fn is_running(&self) -> bool {
        !self.is_suspended() && !self.event.is_expired()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_left.is_some()
    }

    pub fn state(&self) -> TimerState {
        if self.is_suspended() {
            TimerState::Suspended
        } else if self.event.is_expired() {
            TimerState::Expired
        } else {
            TimerState::Running
        }
    }

    /// Time until the timer fires. While suspended, the time that was left at
    /// suspension.
    pub fn get_delay_left(&self) -> VirtualTime {
        match self.state() {
            TimerState::Running => self.sim.get_delay_left(&self.event),
            TimerState::Expired => VirtualTime::ZERO,
            TimerState::Suspended => self.suspended_left.unwrap_or(VirtualTime::ZERO),
        }
    }

    /// Pauses a running timer, remembering how much of its delay is left.
    pub fn suspend(&mut self) {
        if !self.is_running() {
            fatal(SimError::TimerState("suspended"));
        }
        let left = self.sim.get_delay_left(&self.event);
        match self.policy {
            DestroyPolicy::RemoveOnDrop => self.sim.remove(&self.event),
            _ => self.sim.cancel(&self.event),
        }
        self.suspended_left = Some(left);
    }

    /// Re-arms a suspended timer with the delay that was left.
    pub fn resume(&mut self) {
        let Some(left) = self.suspended_left.take() else {
            fatal(SimError::TimerState("resumed"));
        };
        self.schedule_with(left);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        match self.policy {
            DestroyPolicy::CancelOnDrop => self.sim.cancel(&self.event),
            DestroyPolicy::RemoveOnDrop => self.sim.remove(&self.event),
            DestroyPolicy::CheckOnDrop => {
                if !self.event.is_expired() && !std::thread::panicking() {
                    fatal(SimError::TimerDroppedWhileRunning);
                }
            }
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("delay", &self.delay)
            .field("state", &self.state())
            .field("policy", &self.policy)
            .field("event", &self.event)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn t(v: i64) -> VirtualTime {
        VirtualTime::from_integer(v)
    }

    fn counting_timer(sim: &Simulator, policy: DestroyPolicy) -> (Timer, Rc<Cell<u32>>) {
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let timer = Timer::new(sim, policy, move |_| counter.set(counter.get() + 1));
        (timer, fired)
    }

    #[test]
    fn fires_once_per_schedule() {
        let sim = Simulator::default();
        let (mut timer, fired) = counting_timer(&sim, DestroyPolicy::CancelOnDrop);
        timer.set_delay(t(5));
        timer.schedule();
        assert_eq!(timer.state(), TimerState::Running);
        sim.run();
        assert_eq!(fired.get(), 1);
        assert!(timer.is_expired());

        timer.schedule();
        sim.run();
        assert_eq!(fired.get(), 2);
        assert_eq!(sim.now(), t(10));
    }

    #[test]
    #[should_panic(expected = "still pending")]
    fn double_schedule_is_fatal() {
        let sim = Simulator::default();
        let (mut timer, _) = counting_timer(&sim, DestroyPolicy::CancelOnDrop);
        timer.set_delay(t(1));
        timer.schedule();
        timer.schedule();
    }

    #[test]
    fn suspend_and_resume_keep_remaining_delay() {
        let sim = Simulator::default();
        let (mut timer, fired) = counting_timer(&sim, DestroyPolicy::CancelOnDrop);
        timer.schedule_with(t(10));
        sim.schedule(t(4), |sim| sim.stop());
        sim.run();

        timer.suspend();
        assert!(timer.is_suspended());
        assert!(!timer.is_running() && !timer.is_expired());
        assert_eq!(timer.get_delay_left(), t(6));

        sim.schedule(t(3), |_| {});
        sim.run();
        assert_eq!(sim.now(), t(7));
        timer.resume();
        assert_eq!(timer.state(), TimerState::Running);
        sim.run();
        assert_eq!(fired.get(), 1);
        assert_eq!(sim.now(), t(13));
    }

    #[test]
    fn drop_cancels_pending_event() {
        let sim = Simulator::default();
        let (mut timer, fired) = counting_timer(&sim, DestroyPolicy::CancelOnDrop);
        timer.schedule_with(t(2));
        drop(timer);
        sim.run();
        assert_eq!(fired.get(), 0);
        assert_eq!(sim.stats().cancelled, 1);
    }

    #[test]
    fn drop_removes_pending_event() {
        let sim = Simulator::default();
        let (mut timer, _) = counting_timer(&sim, DestroyPolicy::RemoveOnDrop);
        timer.schedule_with(t(2));
        drop(timer);
        assert_eq!(sim.pending(), 0);
        assert_eq!(sim.stats().removed, 1);
    }

    #[test]
    #[should_panic(expected = "timer dropped with a pending event")]
    fn check_on_drop_flags_running_timer() {
        let sim = Simulator::default();
        let (mut timer, _) = counting_timer(&sim, DestroyPolicy::CheckOnDrop);
        timer.schedule_with(t(2));
        drop(timer);
    }

    #[test]
    fn callback_can_rearm_through_weak_reference() {
        let sim = Simulator::default();
        let slot: Rc<RefCell<Option<Timer>>> = Rc::new(RefCell::new(None));
        let weak = Rc::downgrade(&slot);
        let fired = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&fired);

        let mut timer = Timer::new(&sim, DestroyPolicy::CancelOnDrop, move |_| {
            counter.set(counter.get() + 1);
            if counter.get() < 3 {
                if let Some(slot) = weak.upgrade() {
                    if let Some(timer) = slot.borrow_mut().as_mut() {
                        timer.schedule();
                    }
                }
            }
        });
        timer.set_delay(t(4));
        timer.schedule();
        *slot.borrow_mut() = Some(timer);

        sim.run();
        assert_eq!(fired.get(), 3);
        assert_eq!(sim.now(), t(12));
    }
}
