//! Error types for the cfcrypt-core crate
//!
//! [`CryptError`] is the error surfaced by every content operation. It keeps
//! integrity violations ([`CryptError::Authentication`]) apart from storage
//! failures ([`CryptError::Store`]) so that callers can tell "the data was
//! tampered with" from "the backing store is unavailable".
//!
//! Short reads at end-of-file are not errors; see
//! [`ReadOutcome`](crate::fs::content::ReadOutcome).

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use crate::crypto::keys::KeyError;
pub use crate::store::StoreError;

/// Context for content operations, providing debugging information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockContext {
    /// Logical path of the file in the backing store
    pub path: Option<PathBuf>,
    /// Block index being processed
    pub block: Option<u64>,
    /// Operation being performed
    pub operation: Option<&'static str>,
}

impl BlockContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_block(mut self, block: u64) -> Self {
        self.block = Some(block);
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl fmt::Display for BlockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref path) = self.path {
            parts.push(format!("at {:?}", path.display()));
        }
        if let Some(block) = self.block {
            parts.push(format!("block {block}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors produced by the content codec and the file content manager.
///
/// # Security Classification
///
/// Variants marked `[INTEGRITY VIOLATION]` mean the on-disk bytes were
/// modified, swapped between files or blocks, or corrupted. They must never
/// be downgraded to a short read.
#[derive(Error, Debug)]
pub enum CryptError {
    /// Block authentication failed (tag, nonce, or file/block context mismatch).
    ///
    /// **[INTEGRITY VIOLATION]**
    #[error(
        "Authentication failed for {context}: invalid tag - block tampered, moved, or wrong key"
    )]
    Authentication { context: BlockContext },

    /// The backing store reported an I/O failure.
    #[error("Backing store error during {context}: {source}")]
    Store {
        #[source]
        source: StoreError,
        context: BlockContext,
    },

    /// Requested byte range cannot be addressed.
    #[error("Invalid range: offset {offset}, length {len}: {reason}")]
    InvalidRange {
        offset: i128,
        len: u64,
        reason: &'static str,
    },

    /// File header is malformed or has an unsupported version.
    ///
    /// **[INTEGRITY VIOLATION]**
    #[error("Invalid file header for {context}: {reason}")]
    InvalidHeader {
        reason: String,
        context: BlockContext,
    },

    /// Backing object length cannot correspond to any plaintext length,
    /// or a stored block is shorter than the logical size requires.
    ///
    /// **[INTEGRITY VIOLATION]**
    #[error("Corrupt encrypted size for {context}: {actual} bytes ({reason})")]
    CorruptSize {
        actual: u64,
        reason: &'static str,
        context: BlockContext,
    },

    /// Block encryption failed unexpectedly.
    #[error("Failed to encrypt {context}: {reason}")]
    Encryption {
        reason: String,
        context: BlockContext,
    },

    /// Configuration rejected by [`CryptConfig::validate`](crate::config::CryptConfig::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key material could not be loaded or derived.
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// Unknown or already closed file handle.
    #[error("Bad file handle: {0}")]
    BadHandle(u64),

    /// Operation not allowed by the handle's access mode.
    #[error("Handle {handle} was not opened for {operation}")]
    NotPermitted {
        handle: u64,
        operation: &'static str,
    },

    /// File does not exist and creation was not requested.
    #[error("File not found: {0:?}")]
    NotFound(PathBuf),
}

impl CryptError {
    /// Wrap a store error with context.
    pub fn store(source: StoreError, context: BlockContext) -> Self {
        CryptError::Store { source, context }
    }

    /// Whether this error indicates tampering or corruption of stored data.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            CryptError::Authentication { .. }
                | CryptError::InvalidHeader { .. }
                | CryptError::CorruptSize { .. }
        )
    }

    /// Whether this error came from the backing store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, CryptError::Store { .. })
    }

    /// Attach the file path to errors raised below the file layer.
    #[must_use]
    pub fn in_file(self, path: &Path) -> Self {
        match self {
            CryptError::Authentication { context } => CryptError::Authentication {
                context: context.with_path(path),
            },
            CryptError::Store { source, context } => CryptError::Store {
                source,
                context: context.with_path(path),
            },
            CryptError::InvalidHeader { reason, context } => CryptError::InvalidHeader {
                reason,
                context: context.with_path(path),
            },
            CryptError::CorruptSize {
                actual,
                reason,
                context,
            } => CryptError::CorruptSize {
                actual,
                reason,
                context: context.with_path(path),
            },
            CryptError::Encryption { reason, context } => CryptError::Encryption {
                reason,
                context: context.with_path(path),
            },
            other => other,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = CryptError> = std::result::Result<T, E>;
