//! molbar Core - Shared types for the molecule bar
//!
//! This crate provides the domain types shared between the daemon
//! (molbard) and the protocol crate: the three atom kinds, the
//! inventory triple, and the fixed molecule/drink recipes.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod atom;
pub mod error;
pub mod recipe;

// Re-exports for convenience
pub use atom::{Atom, AtomCounts};
pub use error::DomainError;
pub use recipe::{drink_requirement, requirement_for, servings_available, Drink, Molecule};
