//! Process-local inventory.

use molbar_core::{Atom, AtomCounts, DomainError};

use super::{Inventory, StoreError};

/// Transient counters living only in this process.
///
/// Access is serialized by the single-threaded reactor, so no locking is
/// needed.
#[derive(Debug, Clone, Default)]
pub struct MemoryInventory {
    counts: AtomCounts,
}

impl MemoryInventory {
    pub fn new(initial: AtomCounts) -> Self {
        Self { counts: initial }
    }
}

impl Inventory for MemoryInventory {
    fn credit(&mut self, atom: Atom, quantity: u64) -> Result<AtomCounts, StoreError> {
        if quantity == 0 {
            return Err(DomainError::NonPositiveQuantity.into());
        }
        self.counts = self
            .counts
            .checked_credit(atom, quantity)
            .ok_or(DomainError::Overflow { atom, quantity })?;
        Ok(self.counts)
    }

    fn try_debit(&mut self, requirement: &AtomCounts) -> Result<AtomCounts, StoreError> {
        self.counts = self
            .counts
            .checked_debit(requirement)
            .ok_or(DomainError::Insufficient {
                required: *requirement,
                available: self.counts,
            })?;
        Ok(self.counts)
    }

    fn snapshot(&self) -> AtomCounts {
        self.counts
    }

    fn kind(&self) -> &'static str {
        "in-memory"
    }
}
