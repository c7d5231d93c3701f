//! zerocp: zero-copy file copying and hashing
//!
//! This library moves bytes between kernel-held descriptors with the splice
//! family of syscalls and computes file digests through the kernel crypto
//! API, so content is never staged in user-space buffers. It backs the
//! `zcp` (copy/sync) and `zhash` (digest) binaries.

pub mod cli;
pub mod copy;
pub mod digest;
pub mod error;
pub mod progress;
pub mod skip;
pub mod splice;
pub mod sync;
pub mod walk;

// Re-export commonly used types
pub use error::{EngineError, Result};
pub use sync::{sync, SyncOptions, SyncStats};
pub use walk::{EntryKind, TreeEntry, TreeWalker};
