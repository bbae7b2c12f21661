//! Shared helpers for cfcrypt-core integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use cfcrypt_core::{CipherSuite, CryptConfig, CryptFs, MasterKey, MemoryStore, OpenOptions};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Block size used by most tests; small enough that short payloads span
/// many blocks.
pub const TEST_BLOCK_SIZE: usize = 512;

/// Create a deterministic MasterKey for testing
pub fn test_master_key() -> MasterKey {
    MasterKey::new([0x01; 32])
}

pub fn test_config(suite: CipherSuite) -> CryptConfig {
    CryptConfig::default()
        .plain_block_size(TEST_BLOCK_SIZE)
        .cipher(suite)
}

/// Both supported cipher suites, for tests that must hold for each.
pub const SUITES: [CipherSuite; 2] = [CipherSuite::Aes256Gcm, CipherSuite::XChaCha20Poly1305];

/// A `CryptFs` over a fresh in-memory store.
pub fn memory_fs(config: CryptConfig) -> (Arc<MemoryStore>, Arc<CryptFs>) {
    let store = Arc::new(MemoryStore::new());
    let fs = CryptFs::new(store.clone(), test_master_key(), config).expect("valid config");
    (store, Arc::new(fs))
}

pub fn open_rw(fs: &CryptFs, path: &str) -> u64 {
    fs.open(Path::new(path), OpenOptions::read_write_create())
        .expect("open for writing")
}

pub fn open_ro(fs: &CryptFs, path: &str) -> u64 {
    fs.open(Path::new(path), OpenOptions::new())
        .expect("open for reading")
}

/// Seeded RNG so failures are reproducible.
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_bytes(rng: &mut impl RngCore, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

/// Content of exactly the specified size with a recognizable pattern.
pub fn sized_content(size: usize) -> Vec<u8> {
    let pattern = b"0123456789ABCDEF";
    (0..size).map(|i| pattern[i % pattern.len()]).collect()
}

/// Apply a write to a plaintext reference buffer, zero-filling any gap.
pub fn apply_write(model: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if model.len() < end {
        model.resize(end, 0);
    }
    model[offset..end].copy_from_slice(data);
}

/// Read the whole file through `handle`.
pub fn read_all(fs: &CryptFs, handle: u64) -> Vec<u8> {
    let size = fs.file_size(handle).expect("file size");
    let size = usize::try_from(size).expect("test file fits in memory");
    let out = fs.read(handle, 0, size).expect("read whole file");
    assert_eq!(out.data.len(), size);
    out.data
}

/// Install a test subscriber once; honours RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
