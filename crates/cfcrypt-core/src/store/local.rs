//! Backing store on the local filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{instrument, trace};

use super::{BackingStore, StoreError};

/// Stores each object as a file below a root directory.
///
/// Object paths must be relative and may not contain `..`. Writes past the
/// end of a file leave a sparse gap that the OS reads back as zeros, which is
/// how holes stay unmaterialized on disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::from_io(e, &root))?;
        Ok(Self { root })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object path to a filesystem path under the root.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let mut resolved = self.root.clone();
        let mut has_name = false;
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    has_name = true;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StoreError::InvalidPath {
                        path: path.to_path_buf(),
                        reason: "parent components are not allowed",
                    });
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::InvalidPath {
                        path: path.to_path_buf(),
                        reason: "object paths must be relative",
                    });
                }
            }
        }
        if !has_name {
            return Err(StoreError::InvalidPath {
                path: path.to_path_buf(),
                reason: "empty object path",
            });
        }
        Ok(resolved)
    }

    fn open_existing(&self, path: &Path, write: bool) -> Result<(File, PathBuf), StoreError> {
        let full = self.resolve(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(write)
            .open(&full)
            .map_err(|e| StoreError::from_io(e, path))?;
        Ok((file, full))
    }
}

impl BackingStore for LocalStore {
    #[instrument(level = "trace", skip(self), fields(path = %path.display()))]
    fn read_at(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        let (mut file, _) = self.open_existing(path, false)?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::from_io(e, path))?;

        let mut buf = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| StoreError::from_io(e, path))?;
        trace!(requested = len, read = buf.len(), "Raw read");
        Ok(buf)
    }

    #[instrument(level = "trace", skip(self, data), fields(path = %path.display(), len = data.len()))]
    fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, path))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&full)
            .map_err(|e| StoreError::from_io(e, path))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::from_io(e, path))?;
        file.write_all(data)
            .map_err(|e| StoreError::from_io(e, path))?;
        Ok(())
    }

    fn truncate(&self, path: &Path, len: u64) -> Result<(), StoreError> {
        let (file, _) = self.open_existing(path, true)?;
        file.set_len(len).map_err(|e| StoreError::from_io(e, path))
    }

    fn len(&self, path: &Path) -> Result<u64, StoreError> {
        let full = self.resolve(path)?;
        let metadata = fs::metadata(&full).map_err(|e| StoreError::from_io(e, path))?;
        Ok(metadata.len())
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        fs::remove_file(&full).map_err(|e| StoreError::from_io(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, store) = store();
        let path = Path::new("a/b/c.bin");
        store.write_at(path, 0, b"hello world").unwrap();
        assert_eq!(store.read_at(path, 6, 5).unwrap(), b"world");
        assert_eq!(store.len(path).unwrap(), 11);
    }

    #[test]
    fn test_short_read_at_end() {
        let (_dir, store) = store();
        let path = Path::new("f");
        store.write_at(path, 0, b"abc").unwrap();
        assert_eq!(store.read_at(path, 1, 100).unwrap(), b"bc");
        assert!(store.read_at(path, 10, 4).unwrap().is_empty());
    }

    #[test]
    fn test_gap_reads_as_zeros() {
        let (_dir, store) = store();
        let path = Path::new("sparse");
        store.write_at(path, 100, b"x").unwrap();
        let data = store.read_at(path, 0, 101).unwrap();
        assert!(data[..100].iter().all(|&b| b == 0));
        assert_eq!(data[100], b'x');
    }

    #[test]
    fn test_missing_object() {
        let (_dir, store) = store();
        let path = Path::new("nope");
        assert!(store.read_at(path, 0, 1).unwrap_err().is_not_found());
        assert!(store.len(path).unwrap_err().is_not_found());
        assert!(!store.exists(path).unwrap());
    }

    #[test]
    fn test_truncate_and_remove() {
        let (_dir, store) = store();
        let path = Path::new("t");
        store.write_at(path, 0, &[1u8; 64]).unwrap();
        store.truncate(path, 10).unwrap();
        assert_eq!(store.len(path).unwrap(), 10);
        store.remove(path).unwrap();
        assert!(!store.exists(path).unwrap());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let (_dir, store) = store();
        assert!(matches!(
            store.resolve(Path::new("../etc/passwd")),
            Err(StoreError::InvalidPath { .. })
        ));
        assert!(matches!(
            store.resolve(Path::new("/etc/passwd")),
            Err(StoreError::InvalidPath { .. })
        ));
        assert!(matches!(
            store.resolve(Path::new("")),
            Err(StoreError::InvalidPath { .. })
        ));
        assert!(store.resolve(Path::new("./ok/file")).is_ok());
    }
}
