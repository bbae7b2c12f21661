#![forbid(unsafe_code)]

use std::fmt;

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::fs::header::FileId;

/// Size of the master key and of every derived file key, in bytes.
pub const KEY_SIZE: usize = 32;

/// HKDF info prefix for per-file content keys.
const FILE_KEY_INFO: &[u8] = b"cfcrypt content key v1";

/// Errors that can occur while loading or deriving key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key material had the wrong length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Key material was not valid hexadecimal
    #[error("Invalid hex key: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// HKDF expansion failed
    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

/// Opaque master key material.
///
/// Never used directly as a cipher key: every file gets its own key derived
/// with HKDF-SHA256 from this key and the file identifier.
///
/// # Security
///
/// The key is held in `Zeroizing` storage and erased on drop. The `Debug`
/// implementation redacts the key bytes.
#[derive(Clone)]
pub struct MasterKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Create a master key from a byte slice of exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self::new(key))
    }

    /// Parse a master key from a 64-character hex string.
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(hex::decode(hex_key.trim())?);
        Self::from_slice(&bytes)
    }

    /// Generate a new random master key using a cryptographically secure RNG.
    pub fn random() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::rng().fill_bytes(&mut *key);
        Self { key }
    }

    /// Derive the content key for a single file.
    ///
    /// `HKDF-SHA256(ikm = master key, info = "cfcrypt content key v1" || file_id)`.
    pub fn derive_file_key(&self, file_id: &FileId) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeyError> {
        let hkdf = Hkdf::<Sha256>::new(None, &*self.key);

        let mut info = Vec::with_capacity(FILE_KEY_INFO.len() + FileId::SIZE);
        info.extend_from_slice(FILE_KEY_INFO);
        info.extend_from_slice(file_id.as_bytes());

        let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
        hkdf.expand(&info, &mut *okm)
            .map_err(|e| KeyError::Derivation(e.to_string()))?;
        Ok(okm)
    }
}
