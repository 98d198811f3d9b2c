//! Reference scenarios run by the `evsim` binary.
//!
//! Each scenario populates a fresh simulator and returns a check that runs after the
//! main loop, before teardown.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use evsim_core::{ContextId, EventHandle, EventState, Simulator, TimeUnit, VirtualTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CliError;
use crate::trace::TraceRecorder;

/// Post-run verification of a scenario.
pub type Verify = Box<dyn FnOnce(&Simulator) -> Result<(), CliError>>;

/// Exponentially distributed delay with the given mean.
fn exponential(rng: &mut StdRng, mean: VirtualTime) -> VirtualTime {
    let u: f64 = rng.random();
    VirtualTime::from_f64(mean.to_f64() * -(1.0 - u).ln())
}

/// A model starts at t=10s and deals after a random delay, a free function fires at a
/// random time, one event is cancelled before it can run, and a destroy callback
/// reports teardown.
pub fn sample(sim: &Simulator, trace: &TraceRecorder, seed: u64) -> Result<Verify, CliError> {
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(seed)));
    let mean = sim.time(2, TimeUnit::S);

    let start_trace = trace.clone();
    let start_rng = Rc::clone(&rng);
    sim.schedule(sim.time(10, TimeUnit::S), move |sim| {
        start_trace.record(sim, "model-start");
        let delay = exponential(&mut start_rng.borrow_mut(), mean);
        let deal_trace = start_trace.clone();
        sim.schedule(delay, move |sim| deal_trace.record(sim, "model-deal"));
    });

    let delay = exponential(&mut rng.borrow_mut(), mean);
    let random_trace = trace.clone();
    sim.schedule(delay, move |sim| random_trace.record(sim, "random-function"));

    let doomed_trace = trace.clone();
    let doomed = sim.schedule(sim.time(10, TimeUnit::S), move |sim| {
        doomed_trace.record(sim, "cancelled-event")
    });
    sim.cancel(&doomed);

    let destroy_trace = trace.clone();
    sim.schedule_destroy(move |sim| destroy_trace.record(sim, "destroy"));

    Ok(Box::new(move |_: &Simulator| {
        if doomed.state() == Some(EventState::Cancelled) {
            Ok(())
        } else {
            Err(CliError::Invariant {
                scenario: "sample",
                detail: format!("cancelled event ended up {:?}", doomed.state()),
            })
        }
    }))
}

#[derive(Debug, Clone, Copy)]
pub struct PingPongParams {
    pub nodes: u32,
    pub rounds: u32,
    pub delay_us: i64,
}

struct Token {
    trace: TraceRecorder,
    nodes: u32,
    delay: VirtualTime,
    hops: Cell<u64>,
    misattributed: Cell<u64>,
}

fn pass_token(sim: &Simulator, token: Rc<Token>, to: u32, remaining: u64) {
    let delay = token.delay;
    sim.schedule_with_context(ContextId::new(to), delay, move |sim| {
        if sim.current_context() != ContextId::new(to) {
            token.misattributed.set(token.misattributed.get() + 1);
        }
        token.hops.set(token.hops.get() + 1);
        token.trace.record(sim, "token");
        if remaining > 1 {
            let next = (to + 1) % token.nodes;
            pass_token(sim, token, next, remaining - 1);
        }
    });
}

/// Node 0 serves a token that travels round-robin through every node `rounds` times.
/// Every hop is scheduled on behalf of the receiving node.
pub fn ping_pong(
    sim: &Simulator,
    trace: &TraceRecorder,
    params: PingPongParams,
) -> Result<Verify, CliError> {
    if params.nodes < 2 || params.delay_us < 0 {
        return Err(CliError::Invariant {
            scenario: "ping-pong",
            detail: "needs at least two nodes and a non-negative delay".into(),
        });
    }
    let total = u64::from(params.nodes) * u64::from(params.rounds);
    let token = Rc::new(Token {
        trace: trace.clone(),
        nodes: params.nodes,
        delay: sim.time(params.delay_us, TimeUnit::Us),
        hops: Cell::new(0),
        misattributed: Cell::new(0),
    });

    let serve = Rc::clone(&token);
    sim.schedule_with_context(ContextId::new(0), VirtualTime::ZERO, move |sim| {
        serve.trace.record(sim, "serve");
        if total > 0 {
            pass_token(sim, serve, 1, total);
        }
    });

    Ok(Box::new(move |sim: &Simulator| {
        let stopped_early = sim.pending() > 0;
        if token.misattributed.get() > 0 {
            return Err(CliError::Invariant {
                scenario: "ping-pong",
                detail: format!("{} hops ran in the wrong context", token.misattributed.get()),
            });
        }
        if !stopped_early && token.hops.get() != total {
            return Err(CliError::Invariant {
                scenario: "ping-pong",
                detail: format!("expected {total} hops, saw {}", token.hops.get()),
            });
        }
        Ok(())
    }))
}

#[derive(Debug, Clone, Copy)]
pub struct StressParams {
    pub events: usize,
    pub cancel_ratio: f64,
    pub seed: u64,
}

/// Random deadlines within one simulated second; a share of the handles is cancelled
/// before the run. Checks that time never moves backwards and that exactly the
/// surviving events fired.
pub fn stress(
    sim: &Simulator,
    trace: &TraceRecorder,
    params: StressParams,
) -> Result<Verify, CliError> {
    if !(0.0..=1.0).contains(&params.cancel_ratio) {
        return Err(CliError::Invariant {
            scenario: "stress",
            detail: format!("cancel ratio {} is outside [0, 1]", params.cancel_ratio),
        });
    }
    let mut rng = StdRng::seed_from_u64(params.seed);
    let last = Rc::new(Cell::new(VirtualTime::ZERO));
    let regressions = Rc::new(Cell::new(0u64));
    let fired = Rc::new(Cell::new(0u64));

    let handles: Vec<EventHandle> = (0..params.events)
        .map(|_| {
            let delay = sim.time(rng.random_range(0..1_000_000), TimeUnit::Us);
            let trace = trace.clone();
            let last = Rc::clone(&last);
            let regressions = Rc::clone(&regressions);
            let fired = Rc::clone(&fired);
            sim.schedule(delay, move |sim| {
                if sim.now() < last.get() {
                    regressions.set(regressions.get() + 1);
                }
                last.set(sim.now());
                fired.set(fired.get() + 1);
                trace.record(sim, "stress");
            })
        })
        .collect();

    let mut cancelled = 0u64;
    for handle in &handles {
        if rng.random_bool(params.cancel_ratio) {
            sim.cancel(handle);
            cancelled += 1;
        }
    }

    Ok(Box::new(move |_: &Simulator| {
        if regressions.get() > 0 {
            return Err(CliError::Invariant {
                scenario: "stress",
                detail: format!("clock moved backwards {} times", regressions.get()),
            });
        }
        let waiting = handles.iter().filter(|h| !h.is_expired()).count() as u64;
        let expected = params.events as u64 - cancelled;
        if fired.get() + waiting != expected {
            return Err(CliError::Invariant {
                scenario: "stress",
                detail: format!(
                    "{} fired and {waiting} waiting, expected {expected} survivors",
                    fired.get()
                ),
            });
        }
        Ok(())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{execute, RunReport};
    use evsim_config::EvsimConfig;
    use evsim_core::SchedulerKind;

    fn config(kind: SchedulerKind) -> EvsimConfig {
        let mut config = EvsimConfig::default();
        config.simulator.scheduler = kind;
        config
    }

    fn run_stress(kind: SchedulerKind, seed: u64) -> RunReport {
        let params = StressParams {
            events: 2_000,
            cancel_ratio: 0.3,
            seed,
        };
        execute("stress", &config(kind), None, |sim, trace| {
            stress(sim, trace, params)
        })
        .unwrap()
    }

    #[test]
    fn sample_runs_every_live_event_once() {
        let report = execute("sample", &config(SchedulerKind::Heap), None, |sim, trace| {
            sample(sim, trace, 1)
        })
        .unwrap();
        // model-start, model-deal, random-function, destroy
        assert_eq!(report.trace_entries, 4);
        assert_eq!(report.stats.cancelled, 1);
        assert_eq!(report.stats.executed, 3);
    }

    #[test]
    fn ping_pong_counts_every_hop() {
        let params = PingPongParams {
            nodes: 3,
            rounds: 4,
            delay_us: 10,
        };
        let report = execute("ping-pong", &config(SchedulerKind::List), None, |sim, trace| {
            ping_pong(sim, trace, params)
        })
        .unwrap();
        assert_eq!(report.trace_entries, 1 + 12);
        assert_eq!(report.final_time, VirtualTime::from_integer(12 * 10_000));
    }

    #[test]
    fn ping_pong_rejects_a_single_node() {
        let params = PingPongParams {
            nodes: 1,
            rounds: 1,
            delay_us: 10,
        };
        let err = execute("ping-pong", &config(SchedulerKind::Heap), None, |sim, trace| {
            ping_pong(sim, trace, params)
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Invariant { .. }));
    }

    #[test]
    fn digests_agree_across_backends() {
        let reference = run_stress(SchedulerKind::Heap, 17);
        for kind in [SchedulerKind::Map, SchedulerKind::List] {
            let other = run_stress(kind, 17);
            assert_eq!(other.digest, reference.digest, "{kind}");
            assert_eq!(other.stats, reference.stats, "{kind}");
        }
    }

    #[test]
    fn digest_depends_on_seed() {
        assert_eq!(
            run_stress(SchedulerKind::Heap, 3).digest,
            run_stress(SchedulerKind::Heap, 3).digest
        );
        assert_ne!(
            run_stress(SchedulerKind::Heap, 3).digest,
            run_stress(SchedulerKind::Heap, 4).digest
        );
    }
}
