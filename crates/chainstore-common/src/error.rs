//! Error types for chainstore
//!
//! This module defines the common error taxonomy used throughout the
//! engine. Every failure surfaces immediately to the caller; there is
//! no retry policy anywhere in the system.

use thiserror::Error;

/// Common result type for chainstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for chainstore
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("store length {length} is not a multiple of block size {block_size}")]
    DataMisaligned { length: u64, block_size: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("block {id} has been released")]
    Released { id: u32 },

    #[error("corruption detected: {0}")]
    Corruption(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an out of range error
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error indicates on-disk damage
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_) | Self::DataMisaligned { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::not_found("record 7").is_not_found());
        assert!(!Error::invalid_argument("buffer too small").is_not_found());
    }

    #[test]
    fn test_error_corruption() {
        assert!(Error::corruption("cycle in chain").is_corruption());
        assert!(
            Error::DataMisaligned {
                length: 4097,
                block_size: 4096
            }
            .is_corruption()
        );
        assert!(!Error::Released { id: 3 }.is_corruption());
    }

    #[test]
    fn test_error_display() {
        let err = Error::DataMisaligned {
            length: 6000,
            block_size: 4096,
        };
        assert_eq!(
            err.to_string(),
            "store length 6000 is not a multiple of block size 4096"
        );
    }
}
