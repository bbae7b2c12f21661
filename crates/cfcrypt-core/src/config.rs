//! Content codec configuration.
//!
//! The block size and cipher suite together fix the on-disk layout, so a
//! store must always be opened with the configuration it was written with.

use crate::crypto::cipher::CipherSuite;
use crate::error::{CryptError, Result};
use crate::fs::layout::BlockLayout;

/// Default plaintext block size (4 KiB).
pub const DEFAULT_PLAIN_BLOCK_SIZE: usize = 4096;

/// Largest accepted plaintext block size (1 MiB).
pub const MAX_PLAIN_BLOCK_SIZE: usize = 1 << 20;

/// Configuration for the block-cipher content codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptConfig {
    /// Plaintext bytes per block.
    ///
    /// Every partial-block write costs one read, decrypt and re-encrypt of a
    /// whole block, so small blocks favour random writes and large blocks
    /// favour sequential throughput. Default: 4096.
    pub plain_block_size: usize,

    /// AEAD construction; fixes the per-block nonce length and overhead.
    /// Default: AES-256-GCM.
    pub cipher: CipherSuite,
}

impl Default for CryptConfig {
    fn default() -> Self {
        Self {
            plain_block_size: DEFAULT_PLAIN_BLOCK_SIZE,
            cipher: CipherSuite::default(),
        }
    }
}

impl CryptConfig {
    /// Sets the plaintext block size.
    #[must_use]
    pub fn plain_block_size(mut self, size: usize) -> Self {
        self.plain_block_size = size;
        self
    }

    /// Sets the cipher suite.
    #[must_use]
    pub fn cipher(mut self, cipher: CipherSuite) -> Self {
        self.cipher = cipher;
        self
    }

    /// Check that the configuration describes a usable layout.
    pub fn validate(&self) -> Result<()> {
        if self.plain_block_size == 0 {
            return Err(CryptError::InvalidConfig(
                "plain block size must be positive".to_string(),
            ));
        }
        if self.plain_block_size > MAX_PLAIN_BLOCK_SIZE {
            return Err(CryptError::InvalidConfig(format!(
                "plain block size {} exceeds maximum {MAX_PLAIN_BLOCK_SIZE}",
                self.plain_block_size
            )));
        }
        Ok(())
    }

    /// Block layout for this configuration. Call [`validate`](Self::validate) first.
    pub fn layout(&self) -> BlockLayout {
        BlockLayout::new(self.plain_block_size, self.cipher.overhead())
    }
}
