use std::collections::VecDeque;

use super::{tombstone, Scheduler};
use crate::event::{EngineId, Event, EventFn, EventHandle};

/// Sorted list. Insertion is a binary search plus a shift; pops come off the front.
#[derive(Debug)]
pub struct ListScheduler {
    events: VecDeque<Event>,
    engine: EngineId,
    live: usize,
    next_seq: u64,
}

impl ListScheduler {
    pub fn new() -> Self {
        Self::with_engine(EngineId::next())
    }

    pub fn with_engine(engine: EngineId) -> Self {
        Self {
            events: VecDeque::new(),
            engine,
            live: 0,
            next_seq: 0,
        }
    }

    fn discard_front_tombstones(&mut self) {
        while self.events.front().is_some_and(|event| !event.is_pending()) {
            self.events.pop_front();
        }
    }
}

impl Default for ListScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ListScheduler {
    fn name(&self) -> &'static str {
        "list"
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
        let key = event.key();
        let at = self.events.partition_point(|queued| queued.key() < key);
        self.events.insert(at, event);
        self.live += 1;
    }

    fn len(&self) -> usize {
        self.live
    }

    fn peek_next(&mut self) -> Option<&Event> {
        self.discard_front_tombstones();
        self.events.front()
    }

    fn pop_next(&mut self) -> Option<Event> {
        self.discard_front_tombstones();
        let event = self.events.pop_front()?;
        self.live -= 1;
        Some(event)
    }

    fn cancel(&mut self, handle: &EventHandle) -> Option<EventFn> {
        let (_, callable) = tombstone(self.engine, handle)?;
        self.live = self.live.saturating_sub(1);
        Some(callable)
    }

    fn remove(&mut self, handle: &EventHandle) -> Option<EventFn> {
        let (key, callable) = tombstone(self.engine, handle)?;
        self.live = self.live.saturating_sub(1);
        if let Ok(at) = self.events.binary_search_by_key(&key, Event::key) {
            self.events.remove(at);
        }
        Some(callable)
    }

    fn drain(&mut self) -> Vec<Event> {
        self.live = 0;
        self.events.drain(..).collect()
    }
}
