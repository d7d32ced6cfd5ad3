//! Allocation of the small integer ids that identify players, shots and
//! collectable coins on the wire.

use log::warn;
use std::collections::BTreeSet;

/// Hands out ids from a bounded range, reusing released ones.
///
/// Player ids come back lowest-first so that a server with few players keeps
/// using small ids.
#[derive(Debug, Clone)]
pub struct IdPool {
    min: u8,
    max: u8,
    in_use: BTreeSet<u8>,
}

impl IdPool {
    pub fn new(min: u8, max: u8) -> Self {
        Self {
            min,
            max,
            in_use: BTreeSet::new(),
        }
    }

    pub fn allocate(&mut self) -> Option<u8> {
        let id = (self.min..=self.max).find(|id| !self.in_use.contains(id));
        match id {
            Some(id) => {
                self.in_use.insert(id);
                Some(id)
            }
            None => {
                warn!("Id pool {}..={} exhausted", self.min, self.max);
                None
            }
        }
    }

    pub fn release(&mut self, id: u8) -> bool {
        self.in_use.remove(&id)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}

/// A wrapping 16-bit counter that skips ids the caller says are taken.
#[derive(Debug, Clone, Default)]
pub struct WrappingIds {
    last: u16,
}

impl WrappingIds {
    pub fn next_free(&mut self, taken: impl Fn(u16) -> bool) -> Option<u16> {
        for _ in 0..u16::MAX {
            self.last = self.last.wrapping_add(1);
            if self.last != 0 && !taken(self.last) {
                return Some(self.last);
            }
        }
        None
    }
}
