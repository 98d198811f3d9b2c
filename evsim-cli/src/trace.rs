//! Execution trace of a run, folded into a BLAKE3 digest.
//!
//! Two runs with the same inputs must produce the same digest, whatever the
//! scheduler backend.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use blake3::Hasher;
use evsim_core::Simulator;

#[derive(Clone, Default)]
pub struct TraceRecorder {
    inner: Rc<TraceInner>,
}

#[derive(Default)]
struct TraceInner {
    hasher: RefCell<Hasher>,
    entries: Cell<u64>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `(now, context, label)` for the event currently executing.
    pub fn record(&self, sim: &Simulator, label: &str) {
        let now = sim.now();
        let mut hasher = self.inner.hasher.borrow_mut();
        hasher.update(&now.get_integer_part().to_le_bytes());
        hasher.update(&now.get_fraction().to_le_bytes());
        hasher.update(&sim.current_context().raw().to_le_bytes());
        hasher.update(&(label.len() as u32).to_le_bytes());
        hasher.update(label.as_bytes());
        self.inner.entries.set(self.inner.entries.get() + 1);
    }

    pub fn entries(&self) -> u64 {
        self.inner.entries.get()
    }

    pub fn digest(&self) -> String {
        hex::encode(self.inner.hasher.borrow().finalize().as_bytes())
    }
}
