//! Atom kinds and the three-counter inventory value.

use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

// ============================================================================
// Atom
// ============================================================================

/// One of the three fungible atom kinds tracked by the bar.
///
/// Wire names are upper case and case-sensitive (`CARBON`, `HYDROGEN`,
/// `OXYGEN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Atom {
    Carbon,
    Hydrogen,
    Oxygen,
}

impl Atom {
    /// All atom kinds, in record order.
    pub const ALL: [Atom; 3] = [Atom::Carbon, Atom::Hydrogen, Atom::Oxygen];

    /// Returns the protocol name of this atom.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Carbon => "CARBON",
            Self::Hydrogen => "HYDROGEN",
            Self::Oxygen => "OXYGEN",
        }
    }

    /// Looks up an atom by its exact protocol name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|atom| atom.name() == name)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Atom {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| DomainError::UnknownAtom {
            name: s.to_string(),
        })
    }
}

// ============================================================================
// AtomCounts
// ============================================================================

/// A triple of atom quantities.
///
/// Used both for the inventory itself and for the requirement of a
/// withdrawal. Counters are `u64`; every arithmetic helper here is checked
/// so a counter can never wrap around or go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AtomCounts {
    pub carbon: u64,
    pub hydrogen: u64,
    pub oxygen: u64,
}

impl AtomCounts {
    /// The all-zero triple.
    pub const ZERO: AtomCounts = AtomCounts::new(0, 0, 0);

    /// Creates a triple from carbon, hydrogen and oxygen quantities.
    pub const fn new(carbon: u64, hydrogen: u64, oxygen: u64) -> Self {
        Self {
            carbon,
            hydrogen,
            oxygen,
        }
    }

    /// Returns true if every component is zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the quantity of a single atom.
    pub fn get(&self, atom: Atom) -> u64 {
        match atom {
            Atom::Carbon => self.carbon,
            Atom::Hydrogen => self.hydrogen,
            Atom::Oxygen => self.oxygen,
        }
    }

    fn slot_mut(&mut self, atom: Atom) -> &mut u64 {
        match atom {
            Atom::Carbon => &mut self.carbon,
            Atom::Hydrogen => &mut self.hydrogen,
            Atom::Oxygen => &mut self.oxygen,
        }
    }

    /// Returns a copy with `quantity` added to one atom, or `None` on overflow.
    pub fn checked_credit(&self, atom: Atom, quantity: u64) -> Option<Self> {
        let mut next = *self;
        let slot = next.slot_mut(atom);
        *slot = slot.checked_add(quantity)?;
        Some(next)
    }

    /// Returns true if every component of `requirement` is available.
    pub fn covers(&self, requirement: &AtomCounts) -> bool {
        self.carbon >= requirement.carbon
            && self.hydrogen >= requirement.hydrogen
            && self.oxygen >= requirement.oxygen
    }

    /// Subtracts `requirement` from all three counters at once.
    ///
    /// Returns `None` (and changes nothing) unless every counter covers
    /// its component.
    pub fn checked_debit(&self, requirement: &AtomCounts) -> Option<Self> {
        Some(Self {
            carbon: self.carbon.checked_sub(requirement.carbon)?,
            hydrogen: self.hydrogen.checked_sub(requirement.hydrogen)?,
            oxygen: self.oxygen.checked_sub(requirement.oxygen)?,
        })
    }

    /// Component-wise sum that saturates instead of wrapping.
    pub fn saturating_add(&self, other: &AtomCounts) -> Self {
        Self {
            carbon: self.carbon.saturating_add(other.carbon),
            hydrogen: self.hydrogen.saturating_add(other.hydrogen),
            oxygen: self.oxygen.saturating_add(other.oxygen),
        }
    }

    /// Component-wise scaling that saturates instead of wrapping.
    ///
    /// A saturated requirement can never be covered by a real inventory,
    /// so oversized requests fail instead of becoming cheap.
    pub fn saturating_mul(&self, factor: u64) -> Self {
        Self {
            carbon: self.carbon.saturating_mul(factor),
            hydrogen: self.hydrogen.saturating_mul(factor),
            oxygen: self.oxygen.saturating_mul(factor),
        }
    }

    /// Native-endian record layout used by the backing file.
    pub fn to_record(&self) -> [u64; 3] {
        [self.carbon, self.hydrogen, self.oxygen]
    }

    /// Inverse of [`AtomCounts::to_record`].
    pub fn from_record(record: [u64; 3]) -> Self {
        let [carbon, hydrogen, oxygen] = record;
        Self::new(carbon, hydrogen, oxygen)
    }
}

impl fmt::Display for AtomCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CARBON={} HYDROGEN={} OXYGEN={}",
            self.carbon, self.hydrogen, self.oxygen
        )
    }
}
