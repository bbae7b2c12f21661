//! Backing store abstraction.
//!
//! The content manager only ever talks to a [`BackingStore`]: raw byte-range
//! reads and writes on named objects, plus truncate, length and remove.
//! [`LocalStore`] maps objects onto files under a root directory;
//! [`MemoryStore`] keeps them in memory and is the test double.
//!
//! Retry and timeout policy belongs to the store implementation. The content
//! manager propagates every [`StoreError`] unchanged.

pub mod local;
pub mod memory;

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use local::LocalStore;
pub use memory::MemoryStore;

/// Errors reported by a backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object does not exist
    #[error("object not found: {path:?}")]
    NotFound { path: PathBuf },

    /// The object path cannot be used by this store
    #[error("invalid object path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    /// Underlying I/O failure
    #[error("I/O error on {path:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

impl StoreError {
    /// Map an I/O error, turning `NotFound` into [`StoreError::NotFound`].
    pub fn from_io(source: io::Error, path: &Path) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io {
                source,
                path: path.to_path_buf(),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Raw byte-range storage for encrypted objects.
///
/// Implementations must be safe to call from many threads at once. Calls are
/// blocking; the content manager never holds more than one in flight per
/// block.
pub trait BackingStore: Send + Sync + Debug {
    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Returns fewer bytes (possibly none) when the range extends past the
    /// end of the object, and [`StoreError::NotFound`] if the object does
    /// not exist.
    fn read_at(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, StoreError>;

    /// Write `data` at `offset`, creating the object if needed.
    ///
    /// Writing past the end extends the object; the gap reads back as zeros.
    fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> Result<(), StoreError>;

    /// Set the object length, discarding or zero-extending its tail.
    fn truncate(&self, path: &Path, len: u64) -> Result<(), StoreError>;

    /// Current object length in bytes.
    fn len(&self, path: &Path) -> Result<u64, StoreError>;

    /// Delete the object.
    fn remove(&self, path: &Path) -> Result<(), StoreError>;

    /// Whether the object exists.
    fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        match self.len(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
