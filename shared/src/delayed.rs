//! Calls scheduled for a future game tick.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Handle returned by [`DelayedCalls::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelayedCallId(u64);

/// Min-heap of callbacks keyed by the monotonic tick they fall due on.
/// Calls due on the same tick run in scheduling order.
#[derive(Debug)]
pub struct DelayedCalls<F> {
    heap: BinaryHeap<Reverse<(u64, u64)>>,
    pending: HashMap<u64, F>,
    next_seq: u64,
}

impl<F> DelayedCalls<F> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, due_tick: u64, call: F) -> DelayedCallId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((due_tick, seq)));
        self.pending.insert(seq, call);
        DelayedCallId(seq)
    }

    /// Cancelling a call that already ran or was already cancelled does nothing.
    pub fn cancel(&mut self, id: DelayedCallId) -> bool {
        self.pending.remove(&id.0).is_some()
    }

    pub fn is_pending(&self, id: DelayedCallId) -> bool {
        self.pending.contains_key(&id.0)
    }

    /// Removes and returns every live call due at or before `now`.
    pub fn take_due(&mut self, now: u64) -> Vec<F> {
        let mut due = Vec::new();
        while let Some(Reverse((tick, seq))) = self.heap.peek().copied() {
            if tick > now {
                break;
            }
            self.heap.pop();
            if let Some(call) = self.pending.remove(&seq) {
                due.push(call);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<F> Default for DelayedCalls<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_come_out_in_due_order() {
        let mut calls = DelayedCalls::new();
        calls.schedule(5, "late");
        calls.schedule(2, "early");
        calls.schedule(2, "early-second");

        assert!(calls.take_due(1).is_empty());
        assert_eq!(calls.take_due(2), vec!["early", "early-second"]);
        assert_eq!(calls.take_due(10), vec!["late"]);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut calls = DelayedCalls::new();
        let id = calls.schedule(3, ());
        assert!(calls.cancel(id));
        assert!(!calls.cancel(id));
        assert!(calls.take_due(3).is_empty());
    }

    #[test]
    fn test_cancel_after_firing_is_noop() {
        let mut calls = DelayedCalls::new();
        let id = calls.schedule(1, 42);
        assert_eq!(calls.take_due(1), vec![42]);
        assert!(!calls.cancel(id));
        assert!(!calls.is_pending(id));
    }
}
