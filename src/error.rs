//! Error handling and types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Engine errors for copy, sync and digest operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Source path cannot be read
    #[error("cannot read {}: {}", path.display(), source)]
    SourceUnreadable {
        /// Offending source path
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// Destination path cannot be created or written
    #[error("cannot write {}: {}", path.display(), source)]
    DestinationUnwritable {
        /// Offending destination path
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// Requested digest transform is not available
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Fewer bytes moved than the source's known size
    #[error("short transfer for {}: moved {} of {} bytes", path.display(), moved, expected)]
    SizeMismatch {
        /// File whose transfer came up short
        path: PathBuf,
        /// Bytes actually moved
        moved: u64,
        /// Bytes expected from the source size
        expected: u64,
    },

    /// Device, socket or FIFO encountered during tree copy
    #[error("unsupported entry kind: {}", path.display())]
    UnsupportedEntry {
        /// Path of the special file
        path: PathBuf,
    },

    /// Another process holds an advisory lock on the file
    #[error("locked by another process: {}", path.display())]
    Locked {
        /// Path that could not be locked
        path: PathBuf,
    },

    /// Invalid configuration error
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// True for errors that abort the whole invocation rather than one entry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::UnsupportedAlgorithm(_) | EngineError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
