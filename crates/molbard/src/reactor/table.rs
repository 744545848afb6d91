//! Bounded table of live stream sessions.
//!
//! Removal compacts the table by moving the last entry into the freed
//! slot. [`LiveTable::dispatch`] visits a readiness snapshot from the
//! highest index down, so an entry moved by a removal always comes from
//! an index that was already visited in the same pass: nothing ready is
//! skipped and nothing is serviced twice.

/// What a dispatched entry wants done with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Remove,
}

/// Fixed-capacity, insertion-ordered table with swap-remove compaction.
#[derive(Debug)]
pub struct LiveTable<T> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T> LiveTable<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an entry, handing it back when the table is full.
    pub fn insert(&mut self, entry: T) -> Result<usize, T> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Services every index in `ready` exactly once.
    ///
    /// Indices past the end of the table are ignored. Entries whose
    /// handler returns [`Disposition::Remove`] are dropped in place.
    /// Returns the number of removed entries.
    pub fn dispatch<F>(&mut self, mut ready: Vec<usize>, mut service: F) -> usize
    where
        F: FnMut(&mut T) -> Disposition,
    {
        ready.sort_unstable();
        ready.dedup();

        let mut removed = 0;
        for index in ready.into_iter().rev() {
            let disposition = match self.entries.get_mut(index) {
                Some(entry) => service(entry),
                None => continue,
            };
            if disposition == Disposition::Remove {
                drop(self.entries.swap_remove(index));
                removed += 1;
            }
        }
        removed
    }

    /// Drops every entry in insertion order.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            drop(entry);
        }
        count
    }
}
