//! Registry of open logical files.
//!
//! Every handle opened on the same path must see the same file object, so
//! that they share one size, one header and one [`ContentLock`]. The
//! registry maps each open path to its [`EncryptedFile`] plus a count of the
//! handles referencing it; the entry is dropped when the last handle closes.
//!
//! [`ContentLock`]: crate::fs::guard::ContentLock

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::error::Result;
use crate::fs::content::EncryptedFile;

#[derive(Debug)]
struct RegistryEntry {
    file: Arc<EncryptedFile>,
    handles: usize,
}

#[derive(Debug, Default)]
pub struct OpenFileRegistry {
    files: DashMap<PathBuf, RegistryEntry>,
}

impl OpenFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to the file at `path`, opening it with `open` if no
    /// handle currently has it open.
    ///
    /// The map shard stays locked while `open` runs, so two concurrent
    /// first opens of one path never produce two file objects.
    pub fn acquire<F>(&self, path: &Path, open: F) -> Result<Arc<EncryptedFile>>
    where
        F: FnOnce() -> Result<EncryptedFile>,
    {
        match self.files.entry(normalize(path)) {
            Entry::Occupied(mut entry) => {
                let entry = entry.get_mut();
                entry.handles += 1;
                trace!(path = %path.display(), handles = entry.handles, "Shared open file");
                Ok(Arc::clone(&entry.file))
            }
            Entry::Vacant(entry) => {
                let file = Arc::new(open()?);
                entry.insert(RegistryEntry {
                    file: Arc::clone(&file),
                    handles: 1,
                });
                Ok(file)
            }
        }
    }

    /// Drop one handle reference. Returns `true` if it was the last one.
    pub fn release(&self, path: &Path) -> bool {
        let key = normalize(path);
        match self.files.entry(key) {
            Entry::Occupied(mut entry) => {
                let remaining = entry.get().handles.saturating_sub(1);
                if remaining == 0 {
                    entry.remove();
                    true
                } else {
                    entry.get_mut().handles = remaining;
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Run `if_open` on the open file at `path`, or `if_closed` when no
    /// handle has it open.
    ///
    /// Either closure runs with the map shard locked, so no handle can open
    /// `path` until it returns. Use this instead of [`get`](Self::get) when
    /// the action must not race a concurrent first open, such as deleting
    /// the backing object.
    pub fn with_file<T>(
        &self,
        path: &Path,
        if_open: impl FnOnce(&EncryptedFile) -> T,
        if_closed: impl FnOnce() -> T,
    ) -> T {
        match self.files.entry(normalize(path)) {
            Entry::Occupied(entry) => if_open(&entry.get().file),
            Entry::Vacant(_slot) => if_closed(),
        }
    }

    /// The open file at `path`, if any handle has it open.
    pub fn get(&self, path: &Path) -> Option<Arc<EncryptedFile>> {
        self.files
            .get(&normalize(path))
            .map(|entry| Arc::clone(&entry.file))
    }

    /// Number of handles referencing `path`.
    pub fn handle_count(&self, path: &Path) -> usize {
        self.files
            .get(&normalize(path))
            .map_or(0, |entry| entry.handles)
    }

    /// Number of distinct open files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Registry key for a path: `a/./b` and `a/b` name the same file.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
