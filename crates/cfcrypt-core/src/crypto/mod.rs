//! Cryptographic primitives: key material and the per-block AEAD codec

pub mod cipher;
pub mod keys;

pub use cipher::{BlockCipher, CipherSuite, TAG_SIZE};
pub use keys::{KEY_SIZE, KeyError, MasterKey};
