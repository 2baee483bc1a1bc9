//! Growable double-ended ring for pending task claims.
//!
//! The ring models the logical queue as the half-open index range
//! `[begin, end)` over an infinite line; slots are the indices taken modulo
//! the power-of-two capacity (a bit mask, which is why signed indices work:
//! two's complement makes `(i as usize) & mask` correct for negative `i`).
//! `push_back` grows the range to the right, `push_front` to the left. Which
//! end a claim comes from is the scheduler's policy, not the ring's; both ends
//! support peek and pop.
//!
//! # Invariants
//! - `capacity` is a nonzero power of two.
//! - `0 <= end - begin <= capacity`.
//! - Slots for indices in `[begin, end)` are occupied; all others are empty.
//!
//! # Growth
//! When full, capacity doubles in place: every live entry is moved from its
//! slot under the old mask to its slot under the new mask, preserving logical
//! order. The ring only grows, never shrinks; bursty submission trades memory
//! for the absence of reallocation churn. Allocation failure aborts the
//! process, which is the intended fatal handling.

/// Growable power-of-two ring with front/back insertion and back removal.
pub(crate) struct RingDeque<T> {
    slots: Vec<Option<T>>,
    begin: isize,
    end: isize,
    grows: u64,
}

impl<T> RingDeque<T> {
    /// Creates an empty ring.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "RingDeque capacity must be a nonzero power of two"
        );
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            begin: 0,
            end: 0,
            grows: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        (self.end - self.begin) as usize
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of times the ring has doubled.
    pub(crate) fn grows(&self) -> u64 {
        self.grows
    }

    #[inline]
    fn slot(&self, index: isize) -> usize {
        (index as usize) & (self.slots.len() - 1)
    }

    /// Appends at the back end (ordinary submission order).
    pub(crate) fn push_back(&mut self, value: T) {
        self.grow_if_full();
        let i = self.slot(self.end);
        debug_assert!(self.slots[i].is_none(), "back slot occupied");
        self.slots[i] = Some(value);
        self.end += 1;
    }

    /// Inserts at the front end, ahead of everything already queued.
    pub(crate) fn push_front(&mut self, value: T) {
        self.grow_if_full();
        self.begin -= 1;
        let i = self.slot(self.begin);
        debug_assert!(self.slots[i].is_none(), "front slot occupied");
        self.slots[i] = Some(value);
    }

    /// Peeks the back entry, the default claim target.
    pub(crate) fn back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.slot(self.end - 1)].as_ref()
    }

    /// Peeks the front entry, the claim target while front-inserted work is
    /// outstanding.
    pub(crate) fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.slot(self.begin)].as_ref()
    }

    /// Removes and returns the back entry.
    pub(crate) fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        self.end -= 1;
        let i = self.slot(self.end);
        let value = self.slots[i].take();
        debug_assert!(value.is_some(), "live slot empty");
        value
    }

    /// Removes and returns the front entry.
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let i = self.slot(self.begin);
        self.begin += 1;
        let value = self.slots[i].take();
        debug_assert!(value.is_some(), "live slot empty");
        value
    }

    /// Doubles capacity, rebasing every live index into the new mask.
    fn grow_if_full(&mut self) {
        let old_cap = self.slots.len();
        if self.len() < old_cap {
            return;
        }
        let new_cap = old_cap * 2;
        let mut slots: Vec<Option<T>> = (0..new_cap).map(|_| None).collect();
        for i in self.begin..self.end {
            let value = self.slots[(i as usize) & (old_cap - 1)].take();
            slots[(i as usize) & (new_cap - 1)] = value;
        }
        self.slots = slots;
        self.grows += 1;
    }
}
