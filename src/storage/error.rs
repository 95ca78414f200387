//! Storage layer error types.

use crate::storage::block::BlockAddress;
use crate::storage::cache::table::SlotId;
use crate::storage::extent::ExtentKind;
use thiserror::Error;

/// Errors that can occur in the storage layer.
///
/// There is no write-back variant: a dirty block that cannot be written
/// terminates the process.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No contiguous free extent of {requested} blocks")]
    AllocationFailure { requested: usize },

    #[error("Catalog corruption in block {address}: {reason}")]
    CatalogCorruption { address: BlockAddress, reason: String },

    #[error("Block not found: {0}")]
    BlockNotFound(BlockAddress),

    #[error("Block {address} is full: requires {required} bytes but only {available} available")]
    BlockFull {
        address: BlockAddress,
        required: usize,
        available: usize,
    },

    #[error("Stale handle: slot {slot} no longer holds block {expected}")]
    StaleHandle { slot: SlotId, expected: BlockAddress },

    #[error("No system catalog registered for {0} segments")]
    NoCatalog(ExtentKind),

    #[error("Invalid block size: expected {expected} bytes, got {actual}")]
    InvalidBlockSize { expected: usize, actual: usize },

    #[error("Block store is already formatted")]
    AlreadyFormatted,

    #[error("Catalog '{0}' already exists")]
    DuplicateCatalog(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Codec(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
