//! Handle-based file operations for the mount/dispatch layer.
//!
//! [`CryptFs`] is what a FUSE, WebDAV or NFS front-end talks to: it opens
//! paths into numeric handles and forwards reads, writes and truncates to the
//! shared [`EncryptedFile`] behind each handle.
//!
//! # Key Methods
//!
//! - **Lifecycle**: [`open`](CryptFs::open), [`close`](CryptFs::close), [`remove`](CryptFs::remove)
//! - **Content**: [`read`](CryptFs::read), [`read_into`](CryptFs::read_into), [`write`](CryptFs::write), [`truncate`](CryptFs::truncate)
//! - **Metadata**: [`file_size`](CryptFs::file_size), [`plaintext_len`](CryptFs::plaintext_len), [`verify`](CryptFs::verify)
//!
//! Offsets arrive as `i64`, the way dispatch layers receive them from the
//! kernel; negative values are rejected with [`CryptError::InvalidRange`]
//! before any storage is touched.
//!
//! # Concurrency
//!
//! `CryptFs` is `Send + Sync`; share it behind an `Arc` and call it from any
//! number of threads. Handles on the same path share one file object and one
//! content lock, so concurrent writers through different handles are
//! serialized exactly like writers through the same handle.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::CryptConfig;
use crate::crypto::keys::MasterKey;
use crate::error::{BlockContext, CryptError, Result};
use crate::fs::content::{EncryptedFile, ReadData, ReadOutcome, VerifyReport};
use crate::fs::guard::{LockMetrics, LockMetricsSnapshot};
use crate::fs::layout::checked_offset;
use crate::store::BackingStore;
use crate::vault::handles::{AccessMode, HandleTable, OpenHandle};
use crate::vault::registry::OpenFileRegistry;

/// How a file is opened, mirroring [`std::fs::OpenOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    create: bool,
    truncate: bool,
}

impl Default for OpenOptions {
    /// Read-only, existing files only.
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            truncate: false,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and write, creating the file if it does not exist.
    pub fn read_write_create() -> Self {
        Self::new().write(true).create(true)
    }

    #[must_use]
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    #[must_use]
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Reset the file to zero length on open. Requires write access.
    #[must_use]
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }
}

/// Transparent encrypting file layer over a [`BackingStore`].
pub struct CryptFs {
    store: Arc<dyn BackingStore>,
    master_key: Arc<MasterKey>,
    config: CryptConfig,
    handles: HandleTable,
    registry: OpenFileRegistry,
    metrics: Arc<LockMetrics>,
}

impl std::fmt::Debug for CryptFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptFs")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("open_handles", &self.handles.len())
            .field("open_files", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl CryptFs {
    /// Create a file layer. Fails if the configuration is invalid.
    #[instrument(level = "info", skip(store, master_key))]
    pub fn new(
        store: Arc<dyn BackingStore>,
        master_key: MasterKey,
        config: CryptConfig,
    ) -> Result<Self> {
        config.validate()?;
        debug!(
            block_size = config.plain_block_size,
            cipher = %config.cipher,
            "Initialized encrypted file layer"
        );
        Ok(Self {
            store,
            master_key: Arc::new(master_key),
            config,
            handles: HandleTable::new(),
            registry: OpenFileRegistry::new(),
            metrics: Arc::new(LockMetrics::new()),
        })
    }

    pub fn config(&self) -> &CryptConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    /// Open `path` and return a handle ID.
    ///
    /// All handles on one path share the same logical file. With
    /// `truncate`, the file is reset to zero length and a fresh identifier
    /// is generated on the next write.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn open(&self, path: &Path, options: OpenOptions) -> Result<u64> {
        if options.truncate && !options.write {
            return Err(CryptError::InvalidConfig(
                "truncate on open requires write access".to_string(),
            ));
        }

        let file = self.registry.acquire(path, || {
            EncryptedFile::open(
                path,
                Arc::clone(&self.store),
                Arc::clone(&self.master_key),
                &self.config,
                Arc::clone(&self.metrics),
                options.create,
            )
        })?;

        if options.truncate
            && let Err(e) = file.truncate(0)
        {
            self.registry.release(path);
            return Err(e);
        }

        let mode = AccessMode {
            read: options.read,
            write: options.write,
        };
        let id = self
            .handles
            .insert(OpenHandle::new(path.to_path_buf(), file, mode));
        self.metrics.record_handle_open();
        debug!(handle = id, "Opened handle");
        Ok(id)
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// `eof` is set when the request reached or crossed the end of the file;
    /// `data` then holds exactly the bytes that were available.
    pub fn read(&self, handle: u64, offset: i64, len: usize) -> Result<ReadData> {
        let offset = checked_offset(offset, len)?;
        let open = self.handle(handle, Access::Read)?;
        open.file().read(offset, len)
    }

    /// Read into a caller-provided buffer.
    pub fn read_into(&self, handle: u64, buf: &mut [u8], offset: i64) -> Result<ReadOutcome> {
        let offset = checked_offset(offset, buf.len())?;
        let open = self.handle(handle, Access::Read)?;
        open.file().read_at(buf, offset)
    }

    /// Write `data` at `offset`. Returns the number of bytes written.
    pub fn write(&self, handle: u64, offset: i64, data: &[u8]) -> Result<usize> {
        let offset = checked_offset(offset, data.len())?;
        let open = self.handle(handle, Access::Write)?;
        open.file().write_at(data, offset)
    }

    /// Set the logical size of the file behind `handle`.
    pub fn truncate(&self, handle: u64, size: i64) -> Result<()> {
        let size = checked_offset(size, 0)?;
        let open = self.handle(handle, Access::Truncate)?;
        open.file().truncate(size)
    }

    /// Close a handle. The file object is dropped with its last handle.
    #[instrument(level = "debug", skip(self))]
    pub fn close(&self, handle: u64) -> Result<()> {
        let open = self
            .handles
            .remove(handle)
            .ok_or(CryptError::BadHandle(handle))?;
        self.metrics.record_handle_close();
        if self.registry.release(open.path()) {
            debug!(path = %open.path().display(), "Last handle closed");
        }
        Ok(())
    }

    /// Logical size of the file behind `handle`.
    pub fn file_size(&self, handle: u64) -> Result<u64> {
        let open = self.handle(handle, Access::Stat)?;
        Ok(open.file().size())
    }

    /// Logical size of `path` without opening a handle.
    ///
    /// Uses the open file's size when a handle exists, otherwise derives it
    /// from the backing object's length.
    pub fn plaintext_len(&self, path: &Path) -> Result<u64> {
        self.registry.with_file(
            path,
            |file| Ok(file.size()),
            || self.stored_plaintext_len(path),
        )
    }

    fn stored_plaintext_len(&self, path: &Path) -> Result<u64> {
        let context = || {
            BlockContext::new()
                .with_path(path)
                .with_operation("plaintext_len")
        };
        let encrypted_len = match self.store.len(path) {
            Ok(len) => len,
            Err(e) if e.is_not_found() => return Err(CryptError::NotFound(path.to_path_buf())),
            Err(e) => return Err(CryptError::store(e, context())),
        };
        self.config
            .layout()
            .plaintext_size(encrypted_len)
            .ok_or_else(|| CryptError::CorruptSize {
                actual: encrypted_len,
                reason: "backing length matches no plaintext size",
                context: context(),
            })
    }

    /// Delete the backing object of `path`.
    ///
    /// Handles still open on the path see an empty file afterwards. An open
    /// racing with the removal either shares the file being reset or runs
    /// after the object is gone.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn remove(&self, path: &Path) -> Result<()> {
        self.registry.with_file(
            path,
            |file| file.remove_backing(),
            || self.remove_closed(path),
        )
    }

    fn remove_closed(&self, path: &Path) -> Result<()> {
        match self.store.remove(path) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(CryptError::NotFound(path.to_path_buf())),
            Err(e) => Err(CryptError::store(
                e,
                BlockContext::new()
                    .with_path(path)
                    .with_operation("remove"),
            )),
        }
    }

    /// Authenticate every block of `path`.
    ///
    /// The file is taken from the registry like an open handle would be, so
    /// verification holds the same content lock as writers on the path.
    pub fn verify(&self, path: &Path) -> Result<VerifyReport> {
        let file = self.registry.acquire(path, || {
            EncryptedFile::open(
                path,
                Arc::clone(&self.store),
                Arc::clone(&self.master_key),
                &self.config,
                Arc::clone(&self.metrics),
                false,
            )
        })?;
        let report = file.verify();
        self.registry.release(path);
        report
    }

    /// Number of open handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Number of distinct open files.
    pub fn open_files(&self) -> usize {
        self.registry.len()
    }

    pub fn lock_metrics(&self) -> LockMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn handle(&self, id: u64, access: Access) -> Result<Arc<OpenHandle>> {
        let open = self.handles.get(id).ok_or(CryptError::BadHandle(id))?;
        let mode = open.mode();
        let allowed = match access {
            Access::Read => mode.read,
            Access::Write | Access::Truncate => mode.write,
            Access::Stat => true,
        };
        if !allowed {
            return Err(CryptError::NotPermitted {
                handle: id,
                operation: access.name(),
            });
        }
        Ok(open)
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
    Truncate,
    Stat,
}

impl Access {
    fn name(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::Truncate => "truncate",
            Access::Stat => "stat",
        }
    }
}
