//! Single-threaded virtual-time event queue.
//!
//! Entries are ordered by (time, sequence). The sequence number is assigned at
//! insertion, so entries scheduled for the same instant pop in the order they
//! were enqueued and a run is reproducible for a fixed seed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::ds_interface::SimTime;

/// Unique sequence number for deterministic ordering of same-time entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

/// A queued entry
#[derive(Debug, Clone)]
pub struct ScheduledEvent<E> {
    pub time: SimTime,
    pub seq: SequenceNumber,
    pub event: E,
}

impl<E> PartialEq for ScheduledEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time.total_cmp(&other.time) == Ordering::Equal && self.seq == other.seq
    }
}

impl<E> Eq for ScheduledEvent<E> {}

impl<E> PartialOrd for ScheduledEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for ScheduledEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Scheduler<E> {
    now: SimTime,
    horizon: SimTime,
    next_seq: u64,
    queue: BinaryHeap<ScheduledEvent<E>>,
}

impl<E> Scheduler<E> {
    pub fn new(horizon: SimTime) -> Self {
        Self {
            now: 0.0,
            horizon,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    /// Suspend until `time`. Times in the past run at the current instant.
    pub fn wait_until(&mut self, time: SimTime, event: E) -> SequenceNumber {
        let seq = SequenceNumber(self.next_seq);
        self.next_seq += 1;
        let time = if time < self.now { self.now } else { time };
        self.queue.push(ScheduledEvent { time, seq, event });
        seq
    }

    /// Suspend for `delay` from now
    pub fn wait_for(&mut self, delay: SimTime, event: E) -> SequenceNumber {
        let delay = if delay > 0.0 { delay } else { 0.0 };
        self.wait_until(self.now + delay, event)
    }

    /// Pop the earliest entry and advance the clock to it.
    ///
    /// Returns `None` once the queue is empty or the next entry lies beyond
    /// the horizon; such entries stay queued and can be inspected with
    /// [`Scheduler::pending`].
    pub fn pop_next(&mut self) -> Option<(SimTime, E)> {
        match self.queue.peek() {
            Some(next) if next.time <= self.horizon => {}
            _ => return None,
        }
        let entry = self.queue.pop()?;
        if entry.time > self.now {
            self.now = entry.time;
        }
        Some((entry.time, entry.event))
    }

    /// Move the clock to the horizon once the run is over
    pub fn close(&mut self) {
        if self.horizon > self.now {
            self.now = self.horizon;
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &E> {
        self.queue.iter().map(|entry| &entry.event)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
