use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::trace;

use super::{tombstone, Scheduler};
use crate::event::{EngineId, Event, EventFn, EventHandle};

/// Tombstones are swept out of the heap once they outnumber live entries by this
/// ratio (plus a fixed slack so small queues never bother).
const COMPACT_RATIO: usize = 2;
const COMPACT_SLACK: usize = 64;

/// Binary min-heap with lazy (tombstoned) cancellation.
#[derive(Debug)]
pub struct HeapScheduler {
    heap: BinaryHeap<Reverse<Event>>,
    engine: EngineId,
    live: usize,
    next_seq: u64,
}

impl HeapScheduler {
    pub fn new() -> Self {
        Self::with_engine(EngineId::next())
    }

    pub fn with_engine(engine: EngineId) -> Self {
        Self {
            heap: BinaryHeap::new(),
            engine,
            live: 0,
            next_seq: 0,
        }
    }

    /// Entries physically held, tombstones included.
    pub fn capacity_used(&self) -> usize {
        self.heap.len()
    }

    fn discard_front_tombstones(&mut self) {
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(event)| !event.is_pending())
        {
            self.heap.pop();
        }
    }

    fn maybe_compact(&mut self) {
        let dead = self.heap.len() - self.live;
        if dead > COMPACT_RATIO * self.live + COMPACT_SLACK {
            trace!(dead, live = self.live, "compacting heap scheduler");
            self.heap.retain(|Reverse(event)| event.is_pending());
        }
    }
}

impl Default for HeapScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for HeapScheduler {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn engine(&self) -> EngineId {
        self.engine
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn push(&mut self, event: Event) {
        self.heap.push(Reverse(event));
        self.live += 1;
    }

    fn len(&self) -> usize {
        self.live
    }

    fn peek_next(&mut self) -> Option<&Event> {
        self.discard_front_tombstones();
        self.heap.peek().map(|Reverse(event)| event)
    }

    fn pop_next(&mut self) -> Option<Event> {
        self.discard_front_tombstones();
        let Reverse(event) = self.heap.pop()?;
        self.live -= 1;
        Some(event)
    }

    fn cancel(&mut self, handle: &EventHandle) -> Option<EventFn> {
        let (_, callable) = tombstone(self.engine, handle)?;
        self.live = self.live.saturating_sub(1);
        self.maybe_compact();
        Some(callable)
    }

    fn drain(&mut self) -> Vec<Event> {
        self.live = 0;
        self.heap.drain().map(|Reverse(event)| event).collect()
    }
}
