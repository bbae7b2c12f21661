//! Block-cipher content codec for a transparent encrypting storage layer.
//!
//! Plaintext files are presented as ordinary random-access byte ranges while
//! the backing store only ever holds a small header and a sequence of
//! independently authenticated ciphertext blocks:
//!
//! ```text
//! [version | file_id][nonce | ciphertext | tag][nonce | ciphertext | tag]...
//! ```
//!
//! Start with [`CryptFs`] for handle-based access, or [`EncryptedFile`] to
//! work with a single file directly.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cfcrypt_core::{CryptConfig, CryptFs, LocalStore, MasterKey, OpenOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(LocalStore::open("/var/lib/cfcrypt")?);
//! let fs = CryptFs::new(store, MasterKey::random(), CryptConfig::default())?;
//!
//! let h = fs.open(Path::new("notes.txt"), OpenOptions::read_write_create())?;
//! fs.write(h, 0, b"hello")?;
//! let out = fs.read(h, 0, 1024)?;
//! assert_eq!(out.data, b"hello");
//! assert!(out.eof);
//! fs.close(h)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod store;
pub mod vault;

pub use config::{CryptConfig, DEFAULT_PLAIN_BLOCK_SIZE, MAX_PLAIN_BLOCK_SIZE};
pub use crypto::{BlockCipher, CipherSuite, MasterKey};
pub use error::{BlockContext, CryptError, Result};
pub use fs::{EncryptedFile, FileId, ReadData, ReadOutcome, VerifyReport};
pub use store::{BackingStore, LocalStore, MemoryStore, StoreError};
pub use vault::{CryptFs, OpenOptions};
