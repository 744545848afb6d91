//! Domain-specific error types following panic-free policy.

use thiserror::Error;

use crate::atom::{Atom, AtomCounts};

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Atom name is not one of the three tracked kinds
    #[error("Unknown atom type: {name}")]
    UnknownAtom { name: String },

    /// Molecule or drink name has no recipe
    #[error("Unknown recipe: {name}")]
    UnknownRecipe { name: String },

    /// Quantity must be strictly positive
    #[error("Quantity must be positive")]
    NonPositiveQuantity,

    /// Inventory cannot cover a withdrawal
    #[error("Not enough atoms: need {required}, have {available}")]
    Insufficient {
        required: AtomCounts,
        available: AtomCounts,
    },

    /// A credit would overflow a counter
    #[error("Counter overflow adding {quantity} to {atom}")]
    Overflow { atom: Atom, quantity: u64 },
}
