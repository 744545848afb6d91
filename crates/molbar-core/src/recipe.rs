//! Fixed molecule and drink recipes.
//!
//! The recipe engine is a pure lookup: no state, no I/O. An unknown name
//! (or a zero count) maps to [`AtomCounts::ZERO`], which callers must
//! treat as an invalid request rather than a free withdrawal.

use std::fmt;

use crate::atom::AtomCounts;

// ============================================================================
// Molecules
// ============================================================================

/// A molecule that can be delivered against the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Molecule {
    Water,
    CarbonDioxide,
    Glucose,
    Alcohol,
}

impl Molecule {
    pub const ALL: [Molecule; 4] = [
        Molecule::Water,
        Molecule::CarbonDioxide,
        Molecule::Glucose,
        Molecule::Alcohol,
    ];

    /// Protocol name. `CARBON DIOXIDE` is the only two-word molecule.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Water => "WATER",
            Self::CarbonDioxide => "CARBON DIOXIDE",
            Self::Glucose => "GLUCOSE",
            Self::Alcohol => "ALCOHOL",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Atoms needed for a single molecule.
    pub fn atoms(&self) -> AtomCounts {
        match self {
            Self::Water => AtomCounts::new(0, 2, 1),
            Self::CarbonDioxide => AtomCounts::new(1, 0, 2),
            Self::Glucose => AtomCounts::new(6, 12, 6),
            Self::Alcohol => AtomCounts::new(2, 6, 1),
        }
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Drinks
// ============================================================================

/// A drink: a fixed set of molecules, served one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Drink {
    Vodka,
    Champagne,
    SoftDrink,
}

impl Drink {
    pub const ALL: [Drink; 3] = [Drink::Vodka, Drink::Champagne, Drink::SoftDrink];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Vodka => "VODKA",
            Self::Champagne => "CHAMPAGNE",
            Self::SoftDrink => "SOFT DRINK",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// The molecules mixed into one serving.
    pub fn ingredients(&self) -> [Molecule; 3] {
        match self {
            Self::Vodka => [Molecule::Water, Molecule::Alcohol, Molecule::Glucose],
            Self::Champagne => [Molecule::Water, Molecule::Alcohol, Molecule::CarbonDioxide],
            Self::SoftDrink => [Molecule::Water, Molecule::Glucose, Molecule::CarbonDioxide],
        }
    }

    /// Atoms needed for one serving: the sum of its molecules at count 1.
    pub fn atoms(&self) -> AtomCounts {
        self.ingredients()
            .iter()
            .fold(AtomCounts::ZERO, |acc, m| acc.saturating_add(&m.atoms()))
    }
}

impl fmt::Display for Drink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Lookups
// ============================================================================

/// Atoms required to deliver `count` molecules named `name`.
///
/// Returns [`AtomCounts::ZERO`] for an unknown name or a zero count.
pub fn requirement_for(name: &str, count: u64) -> AtomCounts {
    if count == 0 {
        return AtomCounts::ZERO;
    }
    match Molecule::from_name(name) {
        Some(molecule) => molecule.atoms().saturating_mul(count),
        None => AtomCounts::ZERO,
    }
}

/// Atoms required for a single serving of the drink named `name`.
///
/// Returns [`AtomCounts::ZERO`] for an unknown drink.
pub fn drink_requirement(name: &str) -> AtomCounts {
    Drink::from_name(name)
        .map(|drink| drink.atoms())
        .unwrap_or(AtomCounts::ZERO)
}

/// How many whole servings of `requirement` the inventory can cover.
///
/// A zero requirement is not a real recipe and yields 0.
pub fn servings_available(inventory: &AtomCounts, requirement: &AtomCounts) -> u64 {
    let per_atom = [
        (inventory.carbon, requirement.carbon),
        (inventory.hydrogen, requirement.hydrogen),
        (inventory.oxygen, requirement.oxygen),
    ];

    per_atom
        .into_iter()
        .filter(|(_, needed)| *needed > 0)
        .map(|(have, needed)| have / needed)
        .min()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_molecule_requirements_scale_linearly() {
        assert_eq!(requirement_for("WATER", 1), AtomCounts::new(0, 2, 1));
        assert_eq!(requirement_for("WATER", 3), AtomCounts::new(0, 6, 3));
        assert_eq!(requirement_for("CARBON DIOXIDE", 2), AtomCounts::new(2, 0, 4));
        assert_eq!(requirement_for("GLUCOSE", 1), AtomCounts::new(6, 12, 6));
        assert_eq!(requirement_for("ALCOHOL", 2), AtomCounts::new(4, 12, 2));
    }

    #[test]
    fn test_unknown_or_zero_yields_zero_sentinel() {
        assert!(requirement_for("PLUTONIUM", 4).is_zero());
        assert!(requirement_for("water", 1).is_zero());
        assert!(requirement_for("WATER", 0).is_zero());
        assert!(drink_requirement("MOJITO").is_zero());
    }

    #[test]
    fn test_drinks_are_sums_of_molecules() {
        assert_eq!(drink_requirement("VODKA"), AtomCounts::new(8, 20, 8));
        assert_eq!(drink_requirement("CHAMPAGNE"), AtomCounts::new(3, 8, 4));
        assert_eq!(drink_requirement("SOFT DRINK"), AtomCounts::new(7, 14, 9));
    }

    #[test]
    fn test_huge_count_saturates() {
        let req = requirement_for("GLUCOSE", u64::MAX);
        assert_eq!(req.carbon, u64::MAX);
        assert!(!AtomCounts::new(1_000, 1_000, 1_000).covers(&req));
    }

    #[test]
    fn test_servings_available() {
        let vodka = Drink::Vodka.atoms();
        assert_eq!(servings_available(&AtomCounts::new(16, 40, 16), &vodka), 2);
        assert_eq!(servings_available(&AtomCounts::new(16, 40, 7), &vodka), 0);
        assert_eq!(servings_available(&AtomCounts::new(100, 100, 100), &vodka), 5);
    }

    #[test]
    fn test_servings_ignore_unused_atoms() {
        // WATER uses no carbon
        let water = Molecule::Water.atoms();
        assert_eq!(servings_available(&AtomCounts::new(0, 10, 3), &water), 3);
    }

    #[test]
    fn test_servings_of_zero_requirement() {
        assert_eq!(
            servings_available(&AtomCounts::new(5, 5, 5), &AtomCounts::ZERO),
            0
        );
    }

    #[test]
    fn test_names_round_trip_through_lookup() {
        for m in Molecule::ALL {
            assert_eq!(Molecule::from_name(m.name()), Some(m));
        }
        for d in Drink::ALL {
            assert_eq!(Drink::from_name(d.name()), Some(d));
        }
    }
}
