//! Inventory store.
//!
//! The store owns the three atom counters and is the only place they are
//! mutated. Two variants implement the same [`Inventory`] contract:
//!
//! - [`MemoryInventory`] - transient, process-local counters
//! - [`FileInventory`] - counters in a memory-mapped record file, guarded
//!   by an exclusive advisory record lock so another process can read a
//!   consistent state
//!
//! The variant is chosen once at startup by [`open_inventory`]; the
//! reactor and the command handlers only ever see `dyn Inventory`.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Lock and flush failures surface as `StoreError`, never as a crash

mod file;
mod memory;

pub use file::{read_record, FileInventory, RECORD_LEN};
pub use memory::MemoryInventory;

use std::path::{Path, PathBuf};

use molbar_core::{Atom, AtomCounts, DomainError};
use tracing::info;

/// Credit/debit/snapshot contract shared by every store variant.
pub trait Inventory: Send {
    /// Adds `quantity` atoms to one counter.
    ///
    /// # Errors
    ///
    /// - `DomainError::NonPositiveQuantity` if `quantity` is zero
    /// - `DomainError::Overflow` if the counter would wrap
    /// - `StoreError::Lock` / `StoreError::Sync` for a file-backed store
    ///   that could not lock or flush; the counter is left unchanged
    fn credit(&mut self, atom: Atom, quantity: u64) -> Result<AtomCounts, StoreError>;

    /// Withdraws `requirement` from all three counters atomically.
    ///
    /// Nothing changes unless every counter covers its component.
    ///
    /// # Errors
    ///
    /// - `DomainError::Insufficient` if any counter is short
    /// - `StoreError::Lock` / `StoreError::Sync` as for [`Inventory::credit`]
    fn try_debit(&mut self, requirement: &AtomCounts) -> Result<AtomCounts, StoreError>;

    /// Current counters, for display.
    fn snapshot(&self) -> AtomCounts;

    /// Short label for logs ("in-memory", "file-backed").
    fn kind(&self) -> &'static str;
}

/// Opens the store selected by configuration.
///
/// With a save file, the file's record wins over `initial` when the file
/// already exists; `initial` only seeds a newly created file.
pub fn open_inventory(
    save_file: Option<&Path>,
    initial: AtomCounts,
) -> Result<Box<dyn Inventory>, StoreError> {
    let inventory: Box<dyn Inventory> = match save_file {
        Some(path) => Box::new(FileInventory::open_or_create(path, initial)?),
        None => Box::new(MemoryInventory::new(initial)),
    };

    info!(
        kind = inventory.kind(),
        inventory = %inventory.snapshot(),
        "Inventory ready"
    );

    Ok(inventory)
}

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Failed to open inventory file {path}: {error}")]
    Open { path: PathBuf, error: String },

    #[error("Inventory file {path} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        actual: u64,
        expected: u64,
    },

    #[error("Failed to map inventory file {path}: {error}")]
    Map { path: PathBuf, error: String },

    #[error("Failed to lock inventory record: {0}")]
    Lock(String),

    #[error("Failed to flush inventory record: {0}")]
    Sync(String),
}

impl StoreError {
    /// Returns true for failures caused by the request itself rather than
    /// by the backing storage.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}
