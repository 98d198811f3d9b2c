use std::collections::BTreeMap;

use super::{tombstone, Scheduler};
use crate::event::{EngineId, Event, EventFn, EventHandle, EventKey};

/// Ordered map keyed by `(deadline, sequence)`. Removal erases the entry.
#[derive(Debug)]
pub struct MapScheduler {
    events: BTreeMap<EventKey, Event>,
    engine: EngineId,
    live: usize,
    next_seq: u64,
}

impl MapScheduler {
    pub fn new() -> Self {
        Self::with_engine(EngineId::next())
    }

    pub fn with_engine(engine: EngineId) -> Self {
        Self {
            events: BTreeMap::new(),
            engine,
            live: 0,
            next_seq: 0,
        }
    }

    fn discard_front_tombstones(&mut self) {
        while self
            .events
            .first_key_value()
            .is_some_and(|(_, event)| !event.is_pending())
        {
            self.events.pop_first();
        }
    }
}

impl Default for MapScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for MapScheduler {
    fn name(&self) -> &'static str {
        "map"
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
        self.events.insert(event.key(), event);
        self.live += 1;
    }

    fn len(&self) -> usize {
        self.live
    }

    fn peek_next(&mut self) -> Option<&Event> {
        self.discard_front_tombstones();
        self.events.first_key_value().map(|(_, event)| event)
    }

    fn pop_next(&mut self) -> Option<Event> {
        self.discard_front_tombstones();
        let (_, event) = self.events.pop_first()?;
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
        self.events.remove(&key);
        Some(callable)
    }

    fn drain(&mut self) -> Vec<Event> {
        self.live = 0;
        std::mem::take(&mut self.events).into_values().collect()
    }
}
