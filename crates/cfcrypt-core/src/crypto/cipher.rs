//! Block codec: one plaintext block in, one authenticated ciphertext block out.
//!
//! On-disk block format:
//!
//! ```text
//! [nonce][ciphertext (same length as plaintext)][16-byte tag]
//! AAD = block_index (8 bytes, big-endian) || file_id (16 bytes)
//! ```
//!
//! Every encryption draws a fresh random nonce from the OS CSPRNG and stores
//! it in front of the ciphertext. Nonces are drawn under a per-file key (see
//! [`MasterKey::derive_file_key`]), so a (key, nonce) pair is never shared
//! between files. The AAD binds each block to its position and its file:
//! moving a block to another index or into another file fails authentication.

use std::fmt;
use std::str::FromStr;

use aead::Payload;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use tracing::{trace, warn};
use zeroize::Zeroizing;

use crate::crypto::keys::{KEY_SIZE, KeyError, MasterKey};
use crate::error::{BlockContext, CryptError, Result};
use crate::fs::header::FileId;

/// Size of the authentication tag for every supported suite.
pub const TAG_SIZE: usize = 16;

/// Size of the associated data bound to each block.
const AAD_SIZE: usize = 8 + FileId::SIZE;

/// AEAD construction used for block encryption.
///
/// This is the nonce/overhead scheme selector: the suite fixes the nonce
/// length and therefore the per-block overhead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// AES-256-GCM with a 96-bit random nonce (overhead 28 bytes).
    #[default]
    Aes256Gcm,
    /// XChaCha20-Poly1305 with a 192-bit random nonce (overhead 40 bytes).
    XChaCha20Poly1305,
}

impl CipherSuite {
    /// Nonce length in bytes.
    pub const fn nonce_size(self) -> usize {
        match self {
            CipherSuite::Aes256Gcm => 12,
            CipherSuite::XChaCha20Poly1305 => 24,
        }
    }

    /// Fixed expansion of every block (nonce + tag).
    pub const fn overhead(self) -> usize {
        self.nonce_size() + TAG_SIZE
    }

    pub const fn name(self) -> &'static str {
        match self {
            CipherSuite::Aes256Gcm => "aes-256-gcm",
            CipherSuite::XChaCha20Poly1305 => "xchacha20-poly1305",
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherSuite {
    type Err = CryptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-gcm" | "aes256gcm" | "aes" => Ok(CipherSuite::Aes256Gcm),
            "xchacha20-poly1305" | "xchacha20poly1305" | "xchacha" => {
                Ok(CipherSuite::XChaCha20Poly1305)
            }
            other => Err(CryptError::InvalidConfig(format!(
                "unknown cipher suite '{other}'"
            ))),
        }
    }
}

enum Engine {
    Aes(Box<Aes256Gcm>),
    XChaCha(Box<XChaCha20Poly1305>),
}

/// Stateless per-file block codec.
///
/// Holds the keyed AEAD instance for one file and the file identifier used
/// in every block's AAD. Encrypting and decrypting take `&self` and touch no
/// shared mutable state, so one instance serves any number of threads.
pub struct BlockCipher {
    suite: CipherSuite,
    file_id: FileId,
    engine: Engine,
}

impl fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCipher")
            .field("suite", &self.suite)
            .field("file_id", &self.file_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl BlockCipher {
    /// Build a codec from an already derived file key.
    pub fn new(suite: CipherSuite, file_key: &[u8; KEY_SIZE], file_id: FileId) -> Self {
        let engine = match suite {
            CipherSuite::Aes256Gcm => {
                Engine::Aes(Box::new(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(file_key))))
            }
            CipherSuite::XChaCha20Poly1305 => Engine::XChaCha(Box::new(XChaCha20Poly1305::new(
                chacha20poly1305::Key::from_slice(file_key),
            ))),
        };
        Self {
            suite,
            file_id,
            engine,
        }
    }

    /// Derive the file key from the master key and build the codec.
    pub fn for_file(
        master_key: &MasterKey,
        suite: CipherSuite,
        file_id: FileId,
    ) -> Result<Self, KeyError> {
        let file_key = master_key.derive_file_key(&file_id)?;
        Ok(Self::new(suite, &file_key, file_id))
    }

    #[inline]
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    #[inline]
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Encrypt one plaintext block.
    ///
    /// Returns `[nonce][ciphertext][tag]`, exactly
    /// `plaintext.len() + suite.overhead()` bytes.
    pub fn encrypt_block(&self, block_index: u64, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_size = self.suite.nonce_size();
        let mut out = Vec::with_capacity(plaintext.len() + self.suite.overhead());
        out.resize(nonce_size, 0);
        rand::rng().fill_bytes(&mut out[..nonce_size]);

        let aad = block_aad(block_index, &self.file_id);
        let payload = Payload {
            msg: plaintext,
            aad: &aad,
        };

        let sealed = match &self.engine {
            Engine::Aes(cipher) => cipher.encrypt(Nonce::from_slice(&out[..nonce_size]), payload),
            Engine::XChaCha(cipher) => {
                cipher.encrypt(XNonce::from_slice(&out[..nonce_size]), payload)
            }
        }
        .map_err(|e| CryptError::Encryption {
            reason: e.to_string(),
            context: BlockContext::new()
                .with_block(block_index)
                .with_operation("encrypt_block"),
        })?;

        out.extend_from_slice(&sealed);
        trace!(block = block_index, plaintext_len = plaintext.len(), "Block encrypted");
        Ok(out)
    }

    /// Decrypt and authenticate one ciphertext block.
    ///
    /// Fails closed: any modification of nonce, ciphertext or tag, or a
    /// mismatched block index or file identifier, yields
    /// [`CryptError::Authentication`] and no plaintext.
    pub fn decrypt_block(
        &self,
        block_index: u64,
        encrypted: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let context = BlockContext::new()
            .with_block(block_index)
            .with_operation("decrypt_block");

        let nonce_size = self.suite.nonce_size();
        if encrypted.len() < self.suite.overhead() {
            return Err(CryptError::CorruptSize {
                actual: encrypted.len() as u64,
                reason: "block shorter than nonce and tag",
                context,
            });
        }

        let (nonce, ciphertext) = encrypted.split_at(nonce_size);
        let aad = block_aad(block_index, &self.file_id);
        let payload = Payload {
            msg: ciphertext,
            aad: &aad,
        };

        let plaintext = match &self.engine {
            Engine::Aes(cipher) => cipher.decrypt(Nonce::from_slice(nonce), payload),
            Engine::XChaCha(cipher) => cipher.decrypt(XNonce::from_slice(nonce), payload),
        }
        .map_err(|_| {
            warn!(block = block_index, file_id = %self.file_id, "Block authentication failed");
            CryptError::Authentication { context }
        })?;

        Ok(Zeroizing::new(plaintext))
    }
}

/// Build AAD: block_index (8 bytes BE) || file_id (16 bytes)
fn block_aad(block_index: u64, file_id: &FileId) -> [u8; AAD_SIZE] {
    let mut aad = [0u8; AAD_SIZE];
    aad[..8].copy_from_slice(&block_index.to_be_bytes());
    aad[8..].copy_from_slice(file_id.as_bytes());
    aad
}
