//! Encrypted file content: header, block layout, content manager and the
//! per-file concurrency guard

pub mod content;
pub mod guard;
pub mod header;
pub mod layout;

// Re-export commonly used types
pub use content::{EncryptedFile, ReadData, ReadOutcome, VerifyReport};
pub use guard::{ContentLock, LockMetrics, LockMetricsSnapshot};
pub use header::{CURRENT_VERSION, FileHeader, FileId, HEADER_SIZE};
pub use layout::{BlockLayout, BlockOp, MAX_FILE_SIZE, checked_offset};
