//! Thread-safe handle table for open files.
//!
//! Handle IDs are auto-incrementing `u64`s starting at 1; 0 is never handed
//! out so that callers can use it as a null handle.
//!
//! # Handle Lifecycle
//!
//! 1. **Insert**: [`CryptFs::open`](super::CryptFs::open) registers a handle
//! 2. **Get**: every read, write and truncate looks the handle up
//! 3. **Remove**: [`CryptFs::close`](super::CryptFs::close) drops it

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::fs::content::EncryptedFile;

/// Access mode granted when a handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
}

/// One open handle: a path, its shared file object and the access mode.
#[derive(Debug)]
pub struct OpenHandle {
    path: PathBuf,
    file: Arc<EncryptedFile>,
    mode: AccessMode,
}

impl OpenHandle {
    pub fn new(path: PathBuf, file: Arc<EncryptedFile>, mode: AccessMode) -> Self {
        Self { path, file, mode }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn file(&self) -> &Arc<EncryptedFile> {
        &self.file
    }

    #[inline]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

/// Concurrent map from handle IDs to open handles.
#[derive(Debug)]
pub struct HandleTable {
    handles: DashMap<u64, Arc<OpenHandle>>,
    next_id: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a handle and return its freshly allocated ID.
    pub fn insert(&self, handle: OpenHandle) -> u64 {
        let handle = Arc::new(handle);
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id) {
                entry.insert(Arc::clone(&handle));
                return id;
            }
        }
    }

    /// Look up a handle. The returned `Arc` does not pin the table shard.
    pub fn get(&self, id: u64) -> Option<Arc<OpenHandle>> {
        self.handles.get(&id).map(|h| Arc::clone(h.value()))
    }

    /// Remove a handle and return it.
    pub fn remove(&self, id: u64) -> Option<Arc<OpenHandle>> {
        self.handles.remove(&id).map(|(_, h)| h)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
