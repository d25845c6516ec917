// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded ready/valid queue
//!
//! Every boundary of the device (weight staging, activation staging, result
//! egress) is one of these. There is no blocking variant: producers check
//! [`Queue::ready`], consumers check [`Queue::valid`], and a refused push
//! hands the item back so the producer can hold it.

/// Circular buffer of fixed depth.
///
/// Invariants: `count <= depth`; `count > 0` exactly when an item is visible
/// at the head; `count < depth` exactly when the producer side is ready.
#[derive(Debug, Clone)]
pub struct Queue<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T> Queue<T> {
    /// Create an empty queue holding at most `depth` items.
    pub fn new(depth: usize) -> Self {
        let mut slots = Vec::with_capacity(depth);
        slots.resize_with(depth, || None);
        Self {
            slots,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn advance(&self, index: usize) -> usize {
        if index + 1 == self.slots.len() {
            0
        } else {
            index + 1
        }
    }

    /// Append `item` at the tail.
    ///
    /// # Errors
    ///
    /// Returns the item back, untouched, when the queue is full.
    pub fn try_push(&mut self, item: T) -> std::result::Result<(), T> {
        if !self.ready() {
            return Err(item);
        }
        self.slots[self.tail] = Some(item);
        self.tail = self.advance(self.tail);
        self.count += 1;
        Ok(())
    }

    /// Remove the item at the head, or `None` when empty.
    pub fn try_pop(&mut self) -> Option<T> {
        if !self.valid() {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = self.advance(self.head);
        self.count -= 1;
        item
    }

    /// Item at the head without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.valid() {
            self.slots[self.head].as_ref()
        } else {
            None
        }
    }

    /// Producer-side ready: a push would be accepted.
    pub fn ready(&self) -> bool {
        self.count < self.slots.len()
    }

    /// Consumer-side valid: an item is visible at the head.
    pub fn valid(&self) -> bool {
        self.count > 0
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.count
    }

    /// `true` when no item is queued.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `true` when a push would be refused.
    pub fn is_full(&self) -> bool {
        !self.ready()
    }

    /// Maximum number of items.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every queued item.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}
