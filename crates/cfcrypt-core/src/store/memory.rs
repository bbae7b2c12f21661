//! In-memory backing store used as a test double.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use super::{BackingStore, StoreError};

/// Thread-safe in-memory object store.
///
/// Behaves like a sparse file: writing past the end zero-fills the gap.
/// Exposes raw access to stored bytes for tamper tests, and can be told to
/// fail reads or writes to exercise error propagation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<PathBuf, Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    /// Countdown to a single torn write; 0 when disarmed
    tear_write_in: AtomicU64,
    raw_reads: AtomicU64,
    raw_writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with an I/O error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write or truncate fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let the next `successful` writes through, then tear the one after:
    /// only the first half of its data lands and it reports an I/O error.
    /// Later writes succeed again.
    pub fn tear_write_after(&self, successful: u64) {
        self.tear_write_in.store(successful + 1, Ordering::SeqCst);
    }

    /// Copy of the raw bytes of an object.
    pub fn raw(&self, path: &Path) -> Option<Vec<u8>> {
        self.objects.get(path).map(|o| o.clone())
    }

    /// Replace the raw bytes of an object.
    pub fn set_raw(&self, path: &Path, bytes: Vec<u8>) {
        self.objects.insert(path.to_path_buf(), bytes);
    }

    /// XOR one byte of an object in place. Returns `false` if out of range.
    pub fn flip(&self, path: &Path, offset: usize, mask: u8) -> bool {
        match self.objects.get_mut(path) {
            Some(mut object) => match object.get_mut(offset) {
                Some(byte) => {
                    *byte ^= mask;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Number of raw reads served so far.
    pub fn read_count(&self) -> u64 {
        self.raw_reads.load(Ordering::Relaxed)
    }

    /// Number of raw writes accepted so far.
    pub fn write_count(&self) -> u64 {
        self.raw_writes.load(Ordering::Relaxed)
    }

    fn injected(path: &Path) -> StoreError {
        StoreError::Io {
            source: io::Error::other("injected failure"),
            path: path.to_path_buf(),
        }
    }

    fn not_found(path: &Path) -> StoreError {
        StoreError::NotFound {
            path: path.to_path_buf(),
        }
    }
}

// Offsets are bounded by MAX_FILE_SIZE in practice; an in-memory object
// cannot grow past usize anyway.
#[allow(clippy::cast_possible_truncation)]
impl BackingStore for MemoryStore {
    fn read_at(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected(path));
        }
        self.raw_reads.fetch_add(1, Ordering::Relaxed);

        let object = self.objects.get(path).ok_or_else(|| Self::not_found(path))?;
        let start = (offset as usize).min(object.len());
        let end = start.saturating_add(len).min(object.len());
        Ok(object[start..end].to_vec())
    }

    fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected(path));
        }
        self.raw_writes.fetch_add(1, Ordering::Relaxed);

        let countdown = self
            .tear_write_in
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok();
        let torn = countdown == Some(1);
        let data = if torn { &data[..data.len() / 2] } else { data };

        let mut object = self.objects.entry(path.to_path_buf()).or_default();
        let start = offset as usize;
        let end = start + data.len();
        if object.len() < end {
            object.resize(end, 0);
        }
        object[start..end].copy_from_slice(data);
        if torn {
            return Err(Self::injected(path));
        }
        Ok(())
    }

    fn truncate(&self, path: &Path, len: u64) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected(path));
        }
        let mut object = self
            .objects
            .get_mut(path)
            .ok_or_else(|| Self::not_found(path))?;
        object.resize(len as usize, 0);
        Ok(())
    }

    fn len(&self, path: &Path) -> Result<u64, StoreError> {
        self.objects
            .get(path)
            .map(|o| o.len() as u64)
            .ok_or_else(|| Self::not_found(path))
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        self.objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }
}
