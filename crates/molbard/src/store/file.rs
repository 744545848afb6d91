//! File-backed inventory shared with other processes.
//!
//! The record is exactly three native-endian `u64` counters (CARBON,
//! HYDROGEN, OXYGEN). It is mapped `MAP_SHARED` and every mutation runs
//! under an exclusive `fcntl` record lock covering the whole record:
//!
//! ```text
//! lock(F_WRLCK) -> read -> check -> write -> msync(MS_SYNC) -> unlock
//! ```
//!
//! The lock is held for the complete check-then-mutate-then-flush
//! sequence, so a cooperating process never observes a torn record.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use molbar_core::{Atom, AtomCounts, DomainError};
use tracing::{debug, info, warn};

use super::{Inventory, StoreError};

/// Size of the persisted record in bytes.
pub const RECORD_LEN: usize = std::mem::size_of::<[u64; 3]>();

/// Inventory stored in a memory-mapped, record-locked file.
pub struct FileInventory {
    path: PathBuf,
    file: File,
    map: MappedRecord,
}

impl FileInventory {
    /// Opens an existing record file or creates one seeded with `initial`.
    ///
    /// # Errors
    ///
    /// - `StoreError::SizeMismatch` if an existing file is not exactly
    ///   [`RECORD_LEN`] bytes; a foreign or corrupt file is never used
    /// - `StoreError::Open` / `StoreError::Map` for I/O failures
    pub fn open_or_create(path: &Path, initial: AtomCounts) -> Result<Self, StoreError> {
        let open_err = |e: io::Error| StoreError::Open {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path)
        {
            Ok(mut file) => {
                file.write_all(&encode(&initial)).map_err(open_err)?;
                file.sync_all().map_err(open_err)?;
                info!(path = %path.display(), "Created inventory file");
                file
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .map_err(open_err)?;
                check_size(&file, path)?;
                debug!(path = %path.display(), "Opened existing inventory file");
                file
            }
            Err(e) => return Err(open_err(e)),
        };

        let map = MappedRecord::map(&file).map_err(|e| StoreError::Map {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publishes `next`, restoring `previous` if the flush fails.
    ///
    /// Must be called with the record lock held.
    fn commit(&self, previous: &AtomCounts, next: &AtomCounts) -> Result<(), StoreError> {
        self.map.store(next);
        if let Err(e) = self.map.flush() {
            self.map.store(previous);
            if let Err(restore) = self.map.flush() {
                warn!(error = %restore, "Failed to flush restored inventory record");
            }
            return Err(StoreError::Sync(e.to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<RecordLock<'_>, StoreError> {
        RecordLock::exclusive(&self.file).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to lock inventory record");
            StoreError::Lock(e.to_string())
        })
    }
}

impl Inventory for FileInventory {
    fn credit(&mut self, atom: Atom, quantity: u64) -> Result<AtomCounts, StoreError> {
        if quantity == 0 {
            return Err(DomainError::NonPositiveQuantity.into());
        }

        let _guard = self.lock()?;
        let current = self.map.load();
        let next = current
            .checked_credit(atom, quantity)
            .ok_or(DomainError::Overflow { atom, quantity })?;
        self.commit(&current, &next)?;
        Ok(next)
    }

    fn try_debit(&mut self, requirement: &AtomCounts) -> Result<AtomCounts, StoreError> {
        let _guard = self.lock()?;
        let current = self.map.load();
        let next = current
            .checked_debit(requirement)
            .ok_or(DomainError::Insufficient {
                required: *requirement,
                available: current,
            })?;
        self.commit(&current, &next)?;
        Ok(next)
    }

    fn snapshot(&self) -> AtomCounts {
        self.map.load()
    }

    fn kind(&self) -> &'static str {
        "file-backed"
    }
}

impl std::fmt::Debug for FileInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInventory")
            .field("path", &self.path)
            .field("counts", &self.map.load())
            .finish_non_exhaustive()
    }
}

/// Reads a record file the way an external observer would: under a
/// shared record lock, without mapping it.
pub fn read_record(path: &Path) -> Result<AtomCounts, StoreError> {
    let open_err = |e: io::Error| StoreError::Open {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let file = File::open(path).map_err(open_err)?;
    check_size(&file, path)?;

    let _guard = RecordLock::shared(&file).map_err(|e| StoreError::Lock(e.to_string()))?;
    let mut bytes = [0u8; RECORD_LEN];
    (&file).read_exact(&mut bytes).map_err(open_err)?;
    Ok(decode(&bytes))
}

fn check_size(file: &File, path: &Path) -> Result<(), StoreError> {
    let actual = file
        .metadata()
        .map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?
        .len();

    if actual != RECORD_LEN as u64 {
        return Err(StoreError::SizeMismatch {
            path: path.to_path_buf(),
            actual,
            expected: RECORD_LEN as u64,
        });
    }
    Ok(())
}

fn encode(counts: &AtomCounts) -> [u8; RECORD_LEN] {
    let mut bytes = [0u8; RECORD_LEN];
    for (chunk, value) in bytes.chunks_exact_mut(8).zip(counts.to_record()) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
    bytes
}

fn decode(bytes: &[u8; RECORD_LEN]) -> AtomCounts {
    let mut record = [0u64; 3];
    for (slot, chunk) in record.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        *slot = u64::from_ne_bytes(word);
    }
    AtomCounts::from_record(record)
}

// ============================================================================
// Memory Mapping
// ============================================================================

/// A `MAP_SHARED` mapping of the three-counter record.
struct MappedRecord {
    base: NonNull<u64>,
}

// SAFETY: the mapping is owned exclusively by one `MappedRecord` and is
// only touched through `&self`/`&mut self` of its owner.
unsafe impl Send for MappedRecord {}

impl MappedRecord {
    fn map(file: &File) -> io::Result<Self> {
        // SAFETY: the file is open read/write and is at least RECORD_LEN bytes.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                RECORD_LEN,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(addr.cast::<u64>())
            .map(|base| Self { base })
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }

    /// Reads the three counters. Each counter is a single aligned 64-bit
    /// load, so no individual value can tear.
    fn load(&self) -> AtomCounts {
        let mut record = [0u64; 3];
        for (i, slot) in record.iter_mut().enumerate() {
            // SAFETY: i < 3 and the mapping spans three aligned u64s.
            *slot = unsafe { ptr::read_volatile(self.base.as_ptr().add(i)) };
        }
        AtomCounts::from_record(record)
    }

    fn store(&self, counts: &AtomCounts) {
        for (i, value) in counts.to_record().into_iter().enumerate() {
            // SAFETY: i < 3 and the mapping is writable.
            unsafe { ptr::write_volatile(self.base.as_ptr().add(i), value) };
        }
    }

    fn flush(&self) -> io::Result<()> {
        // SAFETY: base/RECORD_LEN describe exactly the live mapping.
        let rc = unsafe { libc::msync(self.base.as_ptr().cast(), RECORD_LEN, libc::MS_SYNC) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for MappedRecord {
    fn drop(&mut self) {
        // SAFETY: the mapping was created by `map` and is unmapped once.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), RECORD_LEN) };
        if rc == -1 {
            warn!(error = %io::Error::last_os_error(), "Failed to unmap inventory record");
        }
    }
}

// ============================================================================
// Record Locking
// ============================================================================

/// Advisory `fcntl` lock over the whole record, released on drop.
struct RecordLock<'a> {
    file: &'a File,
}

impl<'a> RecordLock<'a> {
    fn exclusive(file: &'a File) -> io::Result<Self> {
        set_lock(file, libc::F_WRLCK as libc::c_short, libc::F_SETLKW)?;
        Ok(Self { file })
    }

    fn shared(file: &'a File) -> io::Result<Self> {
        set_lock(file, libc::F_RDLCK as libc::c_short, libc::F_SETLKW)?;
        Ok(Self { file })
    }
}

impl Drop for RecordLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = set_lock(self.file, libc::F_UNLCK as libc::c_short, libc::F_SETLK) {
            warn!(error = %e, "Failed to unlock inventory record");
        }
    }
}

fn set_lock(file: &File, kind: libc::c_short, cmd: libc::c_int) -> io::Result<()> {
    // SAFETY: flock is a plain C struct; all-zero is a valid starting value.
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = kind;
    lock.l_whence = libc::SEEK_SET as libc::c_short;
    lock.l_start = 0;
    lock.l_len = RECORD_LEN as libc::off_t;

    loop {
        // SAFETY: fd is valid for the lifetime of `file`; lock outlives the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), cmd, &lock as *const libc::flock) };
        if rc != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
