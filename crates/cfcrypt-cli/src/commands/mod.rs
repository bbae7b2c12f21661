pub mod cat;
pub mod put;
pub mod read;
pub mod rm;
pub mod stat;
pub mod truncate;
pub mod verify;
pub mod write_at;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cfcrypt_core::{CryptFs, OpenOptions};

/// Bytes requested per read when streaming a file out.
const CHUNK_SIZE: usize = 64 * 1024;

/// Normalize a store path so that `/notes.txt` and `notes.txt` name the same
/// object under the store root.
pub fn normalize_path(path: &str) -> PathBuf {
    PathBuf::from(path.trim_start_matches('/'))
}

/// Open `path`, run `f` with the handle, and close the handle whatever `f`
/// returned.
pub fn with_handle<T>(
    fs: &CryptFs,
    path: &Path,
    options: OpenOptions,
    f: impl FnOnce(u64) -> Result<T>,
) -> Result<T> {
    let handle = fs
        .open(path, options)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let result = f(handle);
    fs.close(handle)?;
    result
}

/// Copy up to `limit` bytes starting at `offset` to `out`. Returns the
/// number of bytes copied.
pub fn copy_out(
    fs: &CryptFs,
    handle: u64,
    mut offset: u64,
    limit: Option<u64>,
    out: &mut impl Write,
) -> Result<u64> {
    let mut remaining = limit.unwrap_or(u64::MAX);
    let mut copied = 0u64;
    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE));
        let chunk = fs.read(handle, i64::try_from(offset)?, want)?;
        out.write_all(&chunk.data)?;

        let n = chunk.data.len() as u64;
        copied += n;
        offset += n;
        remaining -= n;
        if chunk.eof || n == 0 {
            break;
        }
    }
    out.flush()?;
    Ok(copied)
}
