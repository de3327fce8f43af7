//! Error types for lsmkv

use thiserror::Error;

/// Result type alias for lsmkv operations
pub type Result<T> = std::result::Result<T, LsmError>;

/// lsmkv error types
#[derive(Error, Debug)]
pub enum LsmError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A key or value violated format constraints
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// SSTable corruption detected
    #[error("corrupt SSTable: {0}")]
    CorruptSstable(String),

    /// Bloom filter block could not be decoded
    #[error("corrupt Bloom filter: {0}")]
    CorruptFilter(String),

    /// Operation on a closed engine
    #[error("engine is closed")]
    Closed,
}

impl LsmError {
    /// Check if error indicates on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            LsmError::CorruptSstable(_) | LsmError::CorruptFilter(_)
        )
    }
}
