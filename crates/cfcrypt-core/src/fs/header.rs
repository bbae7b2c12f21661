//! File header: format version and the random per-file identifier.
//!
//! ```text
//! [version: u16 BE][file_id: 16 random bytes]
//! ```
//!
//! The identifier is mixed into the key derivation and into the AAD of every
//! block, so blocks copied from one file into another never authenticate.

use std::fmt;

use rand::RngCore;

use crate::error::{BlockContext, CryptError, Result};

/// Current header format version.
pub const CURRENT_VERSION: u16 = 2;

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 2 + FileId::SIZE;

/// Random identifier unique to one incarnation of a file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId([u8; FileId::SIZE]);

impl FileId {
    pub const SIZE: usize = 16;

    /// Generate a fresh identifier from the OS CSPRNG.
    pub fn random() -> Self {
        let mut id = [0u8; Self::SIZE];
        rand::rng().fill_bytes(&mut id);
        Self(id)
    }

    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", hex::encode(&self.0[..4]))
    }
}

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub file_id: FileId,
}

impl FileHeader {
    /// Header for a newly created file with a fresh random identifier.
    pub fn generate() -> Self {
        Self {
            version: CURRENT_VERSION,
            file_id: FileId::random(),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..2].copy_from_slice(&self.version.to_be_bytes());
        out[2..].copy_from_slice(self.file_id.as_bytes());
        out
    }

    /// Parse a header from the first bytes of a backing object.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let context = BlockContext::new().with_operation("parse_header");

        let Some(raw) = bytes.get(..HEADER_SIZE) else {
            return Err(CryptError::InvalidHeader {
                reason: format!("expected {HEADER_SIZE} bytes, got {}", bytes.len()),
                context,
            });
        };

        let version = u16::from_be_bytes([raw[0], raw[1]]);
        if version != CURRENT_VERSION {
            return Err(CryptError::InvalidHeader {
                reason: format!("unsupported version {version} (expected {CURRENT_VERSION})"),
                context,
            });
        }

        let mut id = [0u8; FileId::SIZE];
        id.copy_from_slice(&raw[2..]);
        let file_id = FileId::from_bytes(id);

        Ok(Self { version, file_id })
    }
}
