//! Handle-level operations exposed to the mount/dispatch layer

pub mod handles;
pub mod operations;
pub mod registry;

// Re-export commonly used types
pub use handles::{AccessMode, HandleTable, OpenHandle};
pub use operations::{CryptFs, OpenOptions};
pub use registry::OpenFileRegistry;
