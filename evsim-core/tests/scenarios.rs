//! End-to-end scenarios against the public simulator API.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use evsim_core::{ContextId, EventHandle, SchedulerKind, Simulator, SimulatorState, VirtualTime};

fn t(v: i64) -> VirtualTime {
    VirtualTime::from_integer(v)
}

type Trace = Rc<RefCell<Vec<(i64, ContextId, &'static str)>>>;

fn record(trace: &Trace, label: &'static str) -> impl FnOnce(&Simulator) + 'static {
    let trace = Rc::clone(trace);
    move |sim| {
        trace
            .borrow_mut()
            .push((sim.now().get_integer_part(), sim.current_context(), label))
    }
}

#[test]
fn destroy_discards_pending_and_runs_teardown_in_order() {
    for kind in SchedulerKind::ALL {
        let sim = Simulator::with_scheduler(kind);
        let trace: Trace = Rc::default();
        for (d, label) in [(1, "one"), (2, "two"), (3, "three")] {
            sim.schedule(t(d), record(&trace, label));
        }
        sim.schedule_destroy(record(&trace, "teardown-a"));
        sim.schedule_destroy(record(&trace, "teardown-b"));

        sim.destroy();

        let labels: Vec<_> = trace.borrow().iter().map(|(_, _, l)| *l).collect();
        assert_eq!(labels, vec!["teardown-a", "teardown-b"], "{kind}");
        assert_eq!(sim.pending(), 0);
        assert_eq!(sim.state(), SimulatorState::Destroyed);

        // A second destroy has nothing left to run.
        sim.destroy();
        assert_eq!(trace.borrow().len(), 2);
    }
}

#[test]
fn cancelled_destroy_event_never_runs() {
    let sim = Simulator::default();
    let trace: Trace = Rc::default();
    let h = sim.schedule_destroy(record(&trace, "skipped"));
    sim.schedule_destroy(record(&trace, "kept"));
    sim.cancel(&h);
    assert!(sim.is_expired(&h));
    sim.destroy();
    let labels: Vec<_> = trace.borrow().iter().map(|(_, _, l)| *l).collect();
    assert_eq!(labels, vec!["kept"]);
}

#[test]
fn context_follows_schedule_with_context() {
    let sim = Simulator::default();
    let c1 = ContextId::new(1);
    let c2 = ContextId::new(2);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&seen);
    sim.schedule_with_context(c1, t(0), move |sim| {
        let inner = Rc::clone(&log);
        sim.schedule_with_context(c2, t(5), move |sim| {
            inner.borrow_mut().push(("callee", sim.current_context()));
        });
        log.borrow_mut().push(("caller", sim.current_context()));

        // Plain schedule inherits the caller's context.
        let inherited = Rc::clone(&log);
        sim.schedule(t(1), move |sim| {
            inherited.borrow_mut().push(("inherited", sim.current_context()));
        });
    });

    sim.run();
    assert_eq!(
        *seen.borrow(),
        vec![("caller", c1), ("inherited", c1), ("callee", c2)]
    );
    assert!(sim.current_context().is_none());
}

#[test]
fn end_to_end_order_with_ties() {
    let a = ContextId::new(10);
    let b = ContextId::new(11);
    for kind in SchedulerKind::ALL {
        let sim = Simulator::with_scheduler(kind);
        let trace: Trace = Rc::default();
        sim.schedule_with_context(a, t(5), record(&trace, "first-5"));
        sim.schedule_with_context(b, t(5), record(&trace, "second-5"));
        sim.schedule_with_context(a, t(3), record(&trace, "three"));
        sim.schedule_with_context(a, t(10), record(&trace, "ten"));
        sim.run();

        assert_eq!(
            *trace.borrow(),
            vec![
                (3, a, "three"),
                (5, a, "first-5"),
                (5, b, "second-5"),
                (10, a, "ten"),
            ],
            "{kind}"
        );
    }
}

#[test]
fn cancel_is_idempotent_and_stops_execution() {
    let sim = Simulator::default();
    let fired = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fired);
    let h = sim.schedule(t(7), move |_| flag.set(true));
    let alias = h.clone();

    sim.cancel(&h);
    let after_one = (sim.is_expired(&h), sim.stats());
    sim.cancel(&alias);
    assert_eq!((sim.is_expired(&h), sim.stats()), after_one);
    assert!(sim.is_expired(&alias));

    sim.run();
    assert!(!fired.get());
    assert!(sim.is_expired(&EventHandle::null()));
}

#[test]
fn cancel_from_an_earlier_event() {
    let sim = Simulator::default();
    let fired = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fired);
    let victim = sim.schedule(t(20), move |_| flag.set(true));
    sim.schedule(t(10), move |sim| sim.cancel(&victim));
    sim.run();
    assert!(!fired.get());
    assert_eq!(sim.now(), t(10));
}

#[test]
fn handles_of_another_engine_are_ignored() {
    for kind in SchedulerKind::ALL {
        let a = Simulator::with_scheduler(kind);
        let b = Simulator::with_scheduler(kind);
        let trace: Trace = Rc::default();
        let timed = a.schedule(t(1), record(&trace, "a-timed"));
        let teardown = a.schedule_destroy(record(&trace, "a-destroy"));
        b.schedule(t(2), record(&trace, "b-timed"));

        assert!(a.owns(&timed) && !b.owns(&timed));
        b.cancel(&timed);
        b.remove(&teardown);
        assert!(!timed.is_expired() && !teardown.is_expired(), "{kind}");
        assert_eq!((a.pending(), b.pending()), (1, 1), "{kind}");
        assert_eq!(b.stats().cancelled + b.stats().removed, 0);

        a.run();
        assert_eq!(a.pending(), 0);
        assert!(a.is_finished());
        b.run();
        assert_eq!(b.pending(), 0);
        a.destroy();

        let labels: Vec<_> = trace.borrow().iter().map(|(_, _, l)| *l).collect();
        assert_eq!(labels, vec!["a-timed", "b-timed", "a-destroy"], "{kind}");
    }
}

#[test]
#[should_panic(expected = "virtual time overflow in add")]
fn deadline_overflow_is_fatal() {
    let sim = Simulator::default();
    sim.schedule(t(1), |sim| {
        sim.schedule(VirtualTime::MAX, |_| {});
    });
    sim.run();
}

#[test]
#[should_panic(expected = "Simulator::run called from inside a running event")]
fn reentrant_run_is_fatal() {
    let sim = Simulator::default();
    sim.schedule(t(1), |sim| sim.run());
    sim.run();
}

#[test]
fn panicking_callback_restores_context_and_engine() {
    let sim = Simulator::default();
    sim.schedule_with_context(ContextId::new(4), t(1), |_| panic!("model failure"));
    let after = Rc::new(Cell::new(false));
    let flag = Rc::clone(&after);
    sim.schedule(t(2), move |_| flag.set(true));

    let outcome = catch_unwind(AssertUnwindSafe(|| sim.run()));
    assert!(outcome.is_err());
    assert!(sim.current_context().is_none());
    assert_eq!(sim.state(), SimulatorState::Stopped);

    // The engine is usable again and the remaining event still runs.
    sim.run();
    assert!(after.get());
}

#[test]
fn schedule_after_destroy_queues_for_next_run() {
    let sim = Simulator::default();
    sim.schedule(t(100), |_| {});
    sim.destroy();

    let trace: Trace = Rc::default();
    sim.schedule(t(3), record(&trace, "fresh"));
    assert_eq!(sim.state(), SimulatorState::Uninitialized);
    sim.run();
    assert_eq!(*trace.borrow(), vec![(3, ContextId::NONE, "fresh")]);
}

#[test]
fn self_referencing_callback_is_released_on_cancel() {
    let sim = Simulator::default();
    let payload = Rc::new(());
    let weak = Rc::downgrade(&payload);

    let slot = Rc::new(RefCell::new(EventHandle::null()));
    let own = Rc::clone(&slot);
    let h = sim.schedule(t(5), move |sim| {
        let _payload = &payload;
        sim.cancel(&own.borrow());
    });
    *slot.borrow_mut() = h.clone();
    drop(slot);

    sim.cancel(&h);
    assert!(weak.upgrade().is_none());
}
