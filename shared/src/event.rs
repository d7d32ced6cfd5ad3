//! Multi-listener notification primitive.
//!
//! An [`Event`] owns its listener list. Adding a listener returns a
//! [`ListenerId`] token used for removal, and firing always walks a
//! snapshot of the list so listeners added or removed while an event is
//! being delivered only take effect from the next firing.

use std::fmt;
use std::sync::Arc;

type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub struct Event<A> {
    listeners: Vec<(ListenerId, Listener<A>)>,
    next_id: u64,
}

impl<A> Event<A> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the token was unknown or already removed.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn fire(&self, args: &A) {
        let snapshot: Vec<Listener<A>> = self
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(args);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<A> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fire_reaches_every_listener_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut event: Event<u32> = Event::new();

        let first = Arc::clone(&seen);
        event.add_listener(move |value| first.lock().unwrap().push(("first", *value)));
        let second = Arc::clone(&seen);
        event.add_listener(move |value| second.lock().unwrap().push(("second", *value)));

        event.fire(&7);

        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_remove_listener_is_idempotent() {
        let mut event: Event<()> = Event::new();
        let id = event.add_listener(|_| {});

        assert!(event.remove_listener(id));
        assert!(!event.remove_listener(id));
        assert!(event.is_empty());
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let count = Arc::new(Mutex::new(0));
        let mut event: Event<()> = Event::new();
        let counter = Arc::clone(&count);
        let id = event.add_listener(move |_| *counter.lock().unwrap() += 1);

        event.fire(&());
        event.remove_listener(id);
        event.fire(&());

        assert_eq!(*count.lock().unwrap(), 1);
    }
}
