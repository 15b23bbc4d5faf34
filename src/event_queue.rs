//! Bounded sorted event queues for scheduled gate transitions and CV
//! changes. Each track engine owns one of each; the tick loop drains all
//! entries whose tick has been reached.

use heapless::Vec;
use log::warn;

/// A schedulable event. `matches` identifies entries with the same semantic
/// key for `push_replace`.
pub trait Event: Copy {
    fn tick(&self) -> u32;
    fn matches(&self, other: &Self) -> bool;
}

/// A gate transition. The key is the gate level, so a rescheduled gate-on
/// replaces the pending gate-on rather than stacking next to it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateEvent {
    pub tick: u32,
    pub gate: bool,
}

impl Event for GateEvent {
    fn tick(&self) -> u32 {
        self.tick
    }

    fn matches(&self, other: &Self) -> bool {
        self.gate == other.gate
    }
}

/// A CV target change with its slide flag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CvEvent {
    pub tick: u32,
    pub cv: f32,
    pub slide: bool,
}

impl Event for CvEvent {
    fn tick(&self) -> u32 {
        self.tick
    }

    fn matches(&self, _other: &Self) -> bool {
        true
    }
}

/// Bounded queue kept sorted by tick; the front entry always has the
/// smallest tick. Pushing onto a full queue drops the new event.
#[derive(Debug, Default)]
pub struct SortedQueue<E: Event, const N: usize> {
    entries: Vec<E, N>,
}

impl<E: Event, const N: usize> SortedQueue<E, N> {
    pub fn new() -> SortedQueue<E, N> {
        SortedQueue {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, event: E) {
        if self.entries.is_full() {
            warn!("event queue full, dropping event at tick {}", event.tick());
            return;
        }
        let index = self
            .entries
            .iter()
            .position(|e| e.tick() > event.tick())
            .unwrap_or(self.entries.len());
        // capacity checked above
        let _ = self.entries.insert(index, event);
    }

    /// Replace an entry with the same key when the new event is due no later
    /// than it; otherwise insert alongside it.
    pub fn push_replace(&mut self, event: E) {
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.matches(&event) && event.tick() <= e.tick())
        {
            self.entries.remove(index);
        }
        self.push(event);
    }

    pub fn front(&self) -> Option<&E> {
        self.entries.first()
    }

    pub fn pop(&mut self) -> Option<E> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type GateQueue = SortedQueue<GateEvent, 16>;

    #[test]
    fn front_has_smallest_tick() {
        let mut queue = GateQueue::new();
        queue.push(GateEvent {
            tick: 30,
            gate: false,
        });
        queue.push(GateEvent {
            tick: 10,
            gate: true,
        });
        queue.push(GateEvent {
            tick: 20,
            gate: false,
        });
        assert_eq!(10, queue.front().unwrap().tick);
        assert_eq!(10, queue.pop().unwrap().tick);
        assert_eq!(20, queue.pop().unwrap().tick);
        assert_eq!(30, queue.pop().unwrap().tick);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn push_replace_overwrites_matching_later_entry() {
        let mut queue = GateQueue::new();
        queue.push(GateEvent {
            tick: 20,
            gate: true,
        });
        queue.push_replace(GateEvent {
            tick: 12,
            gate: true,
        });
        assert_eq!(1, queue.len());
        assert_eq!(12, queue.front().unwrap().tick);
    }

    #[test]
    fn push_replace_keeps_earlier_entry_and_inserts() {
        let mut queue = GateQueue::new();
        queue.push(GateEvent {
            tick: 10,
            gate: true,
        });
        queue.push_replace(GateEvent {
            tick: 20,
            gate: true,
        });
        assert_eq!(2, queue.len());
    }

    #[test]
    fn push_replace_ignores_different_key() {
        let mut queue = GateQueue::new();
        queue.push(GateEvent {
            tick: 20,
            gate: false,
        });
        queue.push_replace(GateEvent {
            tick: 10,
            gate: true,
        });
        assert_eq!(2, queue.len());
    }

    #[test]
    fn full_queue_drops_latest() {
        let mut queue: SortedQueue<GateEvent, 4> = SortedQueue::new();
        for tick in 0..4 {
            queue.push(GateEvent { tick, gate: true });
        }
        queue.push(GateEvent {
            tick: 100,
            gate: false,
        });
        assert_eq!(4, queue.len());
        assert!(!queue.is_empty());
        assert_eq!(0, queue.front().unwrap().tick);
    }

    #[test]
    fn equal_ticks_preserve_insertion_order() {
        let mut queue = GateQueue::new();
        queue.push(GateEvent {
            tick: 5,
            gate: true,
        });
        queue.push(GateEvent {
            tick: 5,
            gate: false,
        });
        assert!(queue.pop().unwrap().gate);
        assert!(!queue.pop().unwrap().gate);
    }
}
