//! File content manager: byte-range reads, writes and truncates on top of
//! whole encrypted blocks.
//!
//! Reads clamp the requested range to the logical size, decrypt every block
//! the clamped range touches, and copy out the requested sub-ranges. A block
//! whose backing bytes are absent or all zero is a hole and reads as zeros.
//!
//! Writes run in two phases under the exclusive side of the file's
//! [`ContentLock`]:
//!
//! 1. **Prepare**: every touched block is built in memory. Full blocks are
//!    encrypted directly; partial blocks are read, decrypted, patched and
//!    re-encrypted. If the write starts past a partial final block, that
//!    block is zero-padded to full size first so block offsets stay
//!    computable.
//! 2. **Commit**: the prepared ciphertext blocks are written in order and
//!    the logical size is advanced.
//!
//! An authentication failure or read error during prepare leaves the file
//! untouched. Prepare also keeps the stored ciphertext of every block the
//! write will replace; if a store write fails during commit, those blocks
//! are written back and the object is cut to its old length, so the failed
//! write leaves no visible trace.
//!
//! # Security
//!
//! A block whose stored bytes are all zero is read as a hole. An attacker
//! who can zero a whole block in the backing store can therefore replace
//! its content with zeros without an authentication failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};
use zeroize::Zeroizing;

use crate::config::CryptConfig;
use crate::crypto::cipher::{BlockCipher, CipherSuite};
use crate::crypto::keys::MasterKey;
use crate::error::{BlockContext, CryptError, Result};
use crate::fs::guard::{ContentLock, LockMetrics};
use crate::fs::header::{FileHeader, FileId, HEADER_SIZE};
use crate::fs::layout::{BlockLayout, BlockOp, MAX_FILE_SIZE};
use crate::store::BackingStore;

/// Result of [`EncryptedFile::read_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes copied into the caller's buffer
    pub n: usize,
    /// The request reached or extended past end-of-file
    pub eof: bool,
}

/// Result of [`EncryptedFile::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadData {
    pub data: Vec<u8>,
    pub eof: bool,
}

/// Summary produced by [`EncryptedFile::verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Logical file size
    pub size: u64,
    /// Blocks that decrypted and authenticated
    pub blocks: u64,
    /// Blocks that are unwritten holes
    pub holes: u64,
}

struct FileCrypto {
    header: FileHeader,
    cipher: BlockCipher,
}

/// Mutable per-file state, guarded by the file's [`ContentLock`].
struct FileState {
    /// `None` until the first write creates the header
    crypto: Option<FileCrypto>,
    size: u64,
}

impl FileState {
    fn empty() -> Self {
        Self {
            crypto: None,
            size: 0,
        }
    }
}

/// A block encrypted during the prepare phase, not yet written.
struct PendingBlock {
    index: u64,
    ciphertext: Vec<u8>,
    /// Stored bytes this block replaces; `None` past the old end
    previous: Option<Vec<u8>>,
}

/// One logical file backed by an encrypted object in a [`BackingStore`].
///
/// Shared between all handles open on the same path. All methods take
/// `&self`; mutual exclusion is provided by the internal [`ContentLock`].
pub struct EncryptedFile {
    path: PathBuf,
    store: Arc<dyn BackingStore>,
    master_key: Arc<MasterKey>,
    suite: CipherSuite,
    layout: BlockLayout,
    state: ContentLock<FileState>,
}

impl std::fmt::Debug for EncryptedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFile")
            .field("path", &self.path)
            .field("suite", &self.suite)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl EncryptedFile {
    /// Open the logical file stored at `path`.
    ///
    /// The logical size is derived from the backing object's length. With
    /// `create`, a missing object is created empty; without it, a missing
    /// object is [`CryptError::NotFound`].
    #[instrument(level = "debug", skip(store, master_key, metrics), fields(path = %path.display()))]
    pub fn open(
        path: &Path,
        store: Arc<dyn BackingStore>,
        master_key: Arc<MasterKey>,
        config: &CryptConfig,
        metrics: Arc<LockMetrics>,
        create: bool,
    ) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        let context = || BlockContext::new().with_path(path).with_operation("open");

        let encrypted_len = match store.len(path) {
            Ok(len) => len,
            Err(e) if e.is_not_found() && create => {
                store
                    .write_at(path, 0, &[])
                    .map_err(|e| CryptError::store(e, context()))?;
                debug!("Created empty backing object");
                0
            }
            Err(e) if e.is_not_found() => return Err(CryptError::NotFound(path.to_path_buf())),
            Err(e) => return Err(CryptError::store(e, context())),
        };

        let state = if encrypted_len == 0 {
            FileState::empty()
        } else {
            let raw = store
                .read_at(path, 0, HEADER_SIZE)
                .map_err(|e| CryptError::store(e, context()))?;
            let header = FileHeader::parse(&raw).map_err(|e| e.in_file(path))?;
            let size = layout.plaintext_size(encrypted_len).ok_or_else(|| {
                warn!(encrypted_len, "Backing length matches no plaintext size");
                CryptError::CorruptSize {
                    actual: encrypted_len,
                    reason: "backing length matches no plaintext size",
                    context: context(),
                }
            })?;
            let cipher = BlockCipher::for_file(&master_key, config.cipher, header.file_id)?;
            debug!(size, file_id = %header.file_id, "Opened encrypted file");
            FileState {
                crypto: Some(FileCrypto { header, cipher }),
                size,
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            store,
            master_key,
            suite: config.cipher,
            layout,
            state: ContentLock::new(state, metrics),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// Current logical size in bytes.
    pub fn size(&self) -> u64 {
        self.state.read().size
    }

    /// Identifier of the current file incarnation, if a header exists.
    pub fn file_id(&self) -> Option<FileId> {
        self.state.read().crypto.as_ref().map(|c| c.header.file_id)
    }

    pub fn metrics(&self) -> &Arc<LockMetrics> {
        self.state.metrics()
    }

    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes read and whether end-of-file was reached.
    /// When the request extends past the end, `n` is exactly the number of
    /// bytes between `offset` and the end. Short reads are not errors.
    #[instrument(level = "debug", skip(self, buf), fields(path = %self.path.display(), len = buf.len()))]
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<ReadOutcome> {
        let state = self.state.read();
        let (n, eof) = clamp_read(state.size, offset, buf.len());
        self.fill_locked(&state, &mut buf[..n], offset)?;
        trace!(n, eof, "Read complete");
        Ok(ReadOutcome { n, eof })
    }

    /// Read up to `len` bytes starting at `offset` into a new buffer.
    pub fn read(&self, offset: u64, len: usize) -> Result<ReadData> {
        let state = self.state.read();
        let (n, eof) = clamp_read(state.size, offset, len);
        let mut data = vec![0u8; n];
        self.fill_locked(&state, &mut data, offset)?;
        Ok(ReadData { data, eof })
    }

    /// Write `data` at `offset`, extending the file if needed.
    ///
    /// Writing past the end leaves a hole between the old end and `offset`
    /// that reads back as zeros. Returns the number of bytes written, which
    /// is always `data.len()` on success.
    #[instrument(level = "debug", skip(self, data), fields(path = %self.path.display(), len = data.len()))]
    pub fn write_at(&self, data: &[u8], offset: u64) -> Result<usize> {
        let ops = self.layout.plan(offset, data.len())?;
        if ops.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write();
        self.write_locked(&mut state, offset, data, &ops)?;
        Ok(data.len())
    }

    /// Set the logical size.
    ///
    /// Shrinking re-encrypts the retained part of the new final block and
    /// cuts the backing object. Growing appends a hole and materializes the
    /// new final block. Truncating to zero discards the header; the next
    /// write starts a new file incarnation with a fresh identifier.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn truncate(&self, new_size: u64) -> Result<()> {
        if new_size > MAX_FILE_SIZE {
            return Err(CryptError::InvalidRange {
                offset: i128::from(new_size),
                len: 0,
                reason: "size exceeds maximum file size",
            });
        }

        let mut state = self.state.write();
        let old_size = state.size;
        if new_size == 0 {
            self.reset_locked(&mut state)?;
        } else if new_size > old_size {
            self.grow_locked(&mut state, new_size)?;
        } else if new_size < old_size {
            self.shrink_locked(&mut state, new_size)?;
        }
        debug!(old_size, new_size, "Truncated");
        Ok(())
    }

    /// Decrypt every block and check the stored header.
    ///
    /// Returns the first integrity violation found.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn verify(&self) -> Result<VerifyReport> {
        let state = self.state.read();
        let mut report = VerifyReport {
            size: state.size,
            ..VerifyReport::default()
        };
        let Some(crypto) = state.crypto.as_ref() else {
            return Ok(report);
        };

        let raw = self
            .store
            .read_at(&self.path, 0, HEADER_SIZE)
            .map_err(|e| CryptError::store(e, self.context("verify")))?;
        let stored = FileHeader::parse(&raw).map_err(|e| e.in_file(&self.path))?;
        if stored != crypto.header {
            warn!(expected = %crypto.header.file_id, found = %stored.file_id, "Header changed underneath open file");
            return Err(CryptError::InvalidHeader {
                reason: "stored header does not match open file".to_string(),
                context: self.context("verify"),
            });
        }

        for index in 0..self.layout.block_count(state.size) {
            let needed = self.layout.block_len(index, state.size);
            match self.load_block(crypto, index)? {
                None => report.holes += 1,
                Some(plain) => {
                    self.check_block_len(index, plain.len(), needed)?;
                    report.blocks += 1;
                }
            }
        }
        Ok(report)
    }

    /// Delete the backing object and reset this file to empty.
    ///
    /// Handles that stay open see a zero-length file; their next write
    /// starts a new incarnation.
    pub(crate) fn remove_backing(&self) -> Result<()> {
        let mut state = self.state.write();
        match self.store.remove(&self.path) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Err(CryptError::NotFound(self.path.clone())),
            Err(e) => return Err(CryptError::store(e, self.context("remove"))),
        }
        *state = FileState::empty();
        debug!("Backing object removed");
        Ok(())
    }

    fn context(&self, operation: &'static str) -> BlockContext {
        BlockContext::new()
            .with_path(&self.path)
            .with_operation(operation)
    }

    /// Copy `[offset, offset + buf.len())` into `buf`. The range must lie
    /// within the file.
    fn fill_locked(&self, state: &FileState, buf: &mut [u8], offset: u64) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let crypto = self.crypto(state)?;

        for op in self.layout.plan(offset, buf.len())? {
            let dst = &mut buf[op.buf_range()];
            match self.load_block(crypto, op.index)? {
                None => dst.fill(0),
                Some(plain) => {
                    self.check_block_len(op.index, plain.len(), op.end)?;
                    dst.copy_from_slice(&plain[op.start..op.end]);
                }
            }
        }
        Ok(())
    }

    fn write_locked(
        &self,
        state: &mut FileState,
        offset: u64,
        data: &[u8],
        ops: &[BlockOp],
    ) -> Result<()> {
        self.ensure_header(state)?;
        let size = state.size;
        let crypto = self.crypto(state)?;
        let stored_len = self.layout.encrypted_size(size).max(HEADER_SIZE as u64);

        let mut pending = Vec::with_capacity(ops.len() + 1);
        if let Some(first) = ops.first()
            && let Some((index, ciphertext)) = self.pad_tail(crypto, size, first.index)?
        {
            pending.push(self.pending_block(index, ciphertext, stored_len)?);
        }

        for op in ops {
            let src = &data[op.buf_range()];
            let ciphertext = if op.full {
                crypto.cipher.encrypt_block(op.index, src)
            } else {
                let mut plain = self.merge_base(crypto, op.index, size)?;
                if plain.len() < op.end {
                    plain.resize(op.end, 0);
                }
                plain[op.start..op.end].copy_from_slice(src);
                crypto.cipher.encrypt_block(op.index, &plain)
            }
            .map_err(|e| e.in_file(&self.path))?;
            pending.push(self.pending_block(op.index, ciphertext, stored_len)?);
        }

        self.commit(&pending, stored_len)?;
        state.size = size.max(offset + data.len() as u64);
        trace!(blocks = pending.len(), size = state.size, "Write committed");
        Ok(())
    }

    /// Create the header on the first write to an empty file.
    fn ensure_header(&self, state: &mut FileState) -> Result<()> {
        if state.crypto.is_some() {
            return Ok(());
        }

        let header = FileHeader::generate();
        let cipher = BlockCipher::for_file(&self.master_key, self.suite, header.file_id)?;
        self.store
            .write_at(&self.path, 0, &header.to_bytes())
            .map_err(|e| CryptError::store(e, self.context("write_header")))?;
        debug!(file_id = %header.file_id, "Wrote new file header");
        state.crypto = Some(FileCrypto { header, cipher });
        Ok(())
    }

    /// Zero-pad a partial final block to full size when a write starts in a
    /// later block.
    fn pad_tail(
        &self,
        crypto: &FileCrypto,
        size: u64,
        first_index: u64,
    ) -> Result<Option<(u64, Vec<u8>)>> {
        if size == 0 {
            return Ok(None);
        }
        let last = self.layout.block_index(size - 1);
        let tail_len = self.layout.block_len(last, size);
        if first_index <= last || tail_len == self.layout.plain_block_size() {
            return Ok(None);
        }

        let mut plain = self.merge_base(crypto, last, size)?;
        plain.resize(self.layout.plain_block_size(), 0);
        trace!(block = last, tail_len, "Padding final block");
        let ciphertext = crypto
            .cipher
            .encrypt_block(last, &plain)
            .map_err(|e| e.in_file(&self.path))?;
        Ok(Some((last, ciphertext)))
    }

    /// Pair a prepared block with the stored bytes it will overwrite.
    fn pending_block(
        &self,
        index: u64,
        ciphertext: Vec<u8>,
        stored_len: u64,
    ) -> Result<PendingBlock> {
        let offset = self.layout.encrypted_offset(index);
        let previous = if offset < stored_len {
            let raw = self
                .store
                .read_at(&self.path, offset, self.layout.encrypted_block_size())
                .map_err(|e| CryptError::store(e, self.context("read_block").with_block(index)))?;
            Some(raw)
        } else {
            None
        };
        Ok(PendingBlock {
            index,
            ciphertext,
            previous,
        })
    }

    /// Current plaintext of a block as the starting point for a patch.
    ///
    /// Bytes at or past the logical end are zeroed so that stale data left
    /// by an earlier failed write never reappears. The result keeps the
    /// stored length so rewriting the block never leaves trailing ciphertext
    /// behind.
    fn merge_base(
        &self,
        crypto: &FileCrypto,
        index: u64,
        size: u64,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let logical = self.layout.block_len(index, size);
        match self.load_block(crypto, index)? {
            None => Ok(Zeroizing::new(vec![0u8; logical])),
            Some(mut plain) => {
                self.check_block_len(index, plain.len(), logical)?;
                plain[logical..].fill(0);
                Ok(plain)
            }
        }
    }

    /// Read and decrypt one block. `None` means the block is a hole.
    ///
    /// # Security
    ///
    /// An all-zero stored block is a hole and is not authenticated.
    fn load_block(&self, crypto: &FileCrypto, index: u64) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let raw = self
            .store
            .read_at(
                &self.path,
                self.layout.encrypted_offset(index),
                self.layout.encrypted_block_size(),
            )
            .map_err(|e| CryptError::store(e, self.context("read_block").with_block(index)))?;

        if raw.iter().all(|&b| b == 0) {
            trace!(block = index, "Hole, synthesizing zeros");
            return Ok(None);
        }

        crypto
            .cipher
            .decrypt_block(index, &raw)
            .map(Some)
            .map_err(|e| e.in_file(&self.path))
    }

    fn check_block_len(&self, index: u64, actual: usize, needed: usize) -> Result<()> {
        if actual < needed {
            warn!(block = index, actual, needed, "Stored block shorter than file size requires");
            return Err(CryptError::CorruptSize {
                actual: actual as u64,
                reason: "block shorter than file size requires",
                context: self.context("read_block").with_block(index),
            });
        }
        Ok(())
    }

    /// Write the prepared blocks in order. On a store error, undo every
    /// block written so far, including the failed one, before returning.
    fn commit(&self, pending: &[PendingBlock], stored_len: u64) -> Result<()> {
        for (done, block) in pending.iter().enumerate() {
            let written = self.store.write_at(
                &self.path,
                self.layout.encrypted_offset(block.index),
                &block.ciphertext,
            );
            if let Err(e) = written {
                warn!(block = block.index, error = %e, "Block write failed, rolling back");
                self.roll_back(&pending[..=done], stored_len);
                return Err(CryptError::store(
                    e,
                    self.context("write_block").with_block(block.index),
                ));
            }
        }
        Ok(())
    }

    /// Restore the stored bytes replaced by `written` and cut anything
    /// written past `stored_len`. Failures are logged; the caller reports
    /// the original error.
    fn roll_back(&self, written: &[PendingBlock], stored_len: u64) {
        let mut extended = false;
        for block in written.iter().rev() {
            let offset = self.layout.encrypted_offset(block.index);
            extended |= offset + block.ciphertext.len() as u64 > stored_len;
            if let Some(previous) = &block.previous
                && let Err(e) = self.store.write_at(&self.path, offset, previous)
            {
                warn!(block = block.index, error = %e, "Rollback of block failed");
            }
        }
        if extended && let Err(e) = self.store.truncate(&self.path, stored_len) {
            warn!(stored_len, error = %e, "Rollback truncate failed");
        }
    }

    fn crypto<'a>(&self, state: &'a FileState) -> Result<&'a FileCrypto> {
        state.crypto.as_ref().ok_or_else(|| CryptError::InvalidHeader {
            reason: "file has content but no header".to_string(),
            context: self.context("load_header"),
        })
    }

    fn reset_locked(&self, state: &mut FileState) -> Result<()> {
        match self.store.truncate(&self.path, 0) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => self
                .store
                .write_at(&self.path, 0, &[])
                .map_err(|e| CryptError::store(e, self.context("truncate")))?,
            Err(e) => return Err(CryptError::store(e, self.context("truncate"))),
        }
        *state = FileState::empty();
        debug!("Header discarded");
        Ok(())
    }

    fn grow_locked(&self, state: &mut FileState, new_size: u64) -> Result<()> {
        let last_start = self
            .layout
            .block_start(self.layout.block_index(new_size - 1));
        let start = state.size.max(last_start);
        // new_size - start never exceeds one block
        #[allow(clippy::cast_possible_truncation)]
        let len = (new_size - start) as usize;

        let zeros = vec![0u8; len];
        let ops = self.layout.plan(start, len)?;
        self.write_locked(state, start, &zeros, &ops)
    }

    fn shrink_locked(&self, state: &mut FileState, new_size: u64) -> Result<()> {
        let old_size = state.size;
        let last = self.layout.block_index(new_size - 1);
        let keep = self.layout.block_len(last, new_size);

        if keep == self.layout.plain_block_size() {
            self.store
                .truncate(&self.path, self.layout.encrypted_size(new_size))
                .map_err(|e| CryptError::store(e, self.context("truncate")))?;
            state.size = new_size;
            return Ok(());
        }

        let crypto = self.crypto(state)?;
        let plain = self.merge_base(crypto, last, old_size)?;
        let ciphertext = crypto
            .cipher
            .encrypt_block(last, &plain[..keep])
            .map_err(|e| e.in_file(&self.path))?;

        // Cut at the block boundary first: if the rewrite then fails, the
        // object still ends on a whole block.
        let block_offset = self.layout.encrypted_offset(last);
        self.store
            .truncate(&self.path, block_offset)
            .map_err(|e| CryptError::store(e, self.context("truncate")))?;
        state.size = self.layout.block_start(last);

        self.store
            .write_at(&self.path, block_offset, &ciphertext)
            .map_err(|e| CryptError::store(e, self.context("truncate").with_block(last)))?;
        state.size = new_size;
        Ok(())
    }
}

/// Bytes readable from `offset` for a request of `len`, and whether EOF is hit.
fn clamp_read(size: u64, offset: u64, len: usize) -> (usize, bool) {
    if offset >= size {
        return (0, true);
    }
    let available = size - offset;
    match usize::try_from(available) {
        Ok(available) if available < len => (available, true),
        _ => (len, false),
    }
}
