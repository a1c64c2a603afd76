//! One-shot timers for the coordination context
//!
//! Timers never call anything themselves. The owner polls for due events and
//! dispatches them, so timer fires are serialized with every other event.

use std::collections::{BTreeMap, HashMap};

use crate::session::RequestHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerKey(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    RequestTimeout(RequestHandle),
    IdleDisconnect,
}

#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    /// (deadline, sequence) -> event; sequence keeps equal deadlines FIFO
    entries: BTreeMap<(u64, u64), TimerEvent>,
    deadlines: HashMap<u64, u64>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline_ms: u64, event: TimerEvent) -> TimerKey {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline_ms, seq), event);
        self.deadlines.insert(seq, deadline_ms);
        TimerKey(seq)
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.deadlines.remove(&key.0) {
            Some(deadline) => self.entries.remove(&(deadline, key.0)).is_some(),
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest event due at `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerKey, TimerEvent)> {
        let (&(deadline, seq), _) = self.entries.iter().next()?;
        if deadline > now_ms {
            return None;
        }
        self.deadlines.remove(&seq);
        self.entries
            .remove(&(deadline, seq))
            .map(|event| (TimerKey(seq), event))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.deadlines.clear();
    }
}
