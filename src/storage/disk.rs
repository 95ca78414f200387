//! Persistent block storage.

pub mod block_store;

use crate::storage::block::{AttributeHeader, Block, BlockAddress};
use crate::storage::error::StorageResult;
use crate::storage::extent::ExtentKind;
use std::fmt::Debug;

pub use block_store::FileBlockStore;

/// Backing store for fixed-size blocks.
///
/// The cache manager is the only component that talks to a store directly;
/// everything above it goes through the cache.
pub trait BlockStore: Send + Debug {
    /// Read the block stored at `address`.
    fn read_block(&mut self, address: BlockAddress) -> StorageResult<Block>;

    /// Persist `block` at its own address.
    fn write_block(&mut self, block: &Block) -> StorageResult<()>;

    /// Reserve `size` contiguous free blocks, format them with `header` and
    /// return the first address. With `first_alloc` the search starts at block
    /// 0, otherwise right after the previous allocation.
    fn allocate_extent(
        &mut self,
        first_alloc: bool,
        size: usize,
        kind: ExtentKind,
        header: &[AttributeHeader],
    ) -> StorageResult<BlockAddress>;

    /// Return `size` blocks starting at `start` to the free pool. Every block
    /// in the range must currently be allocated.
    fn free_extent(&mut self, start: BlockAddress, size: usize) -> StorageResult<()>;

    /// Total number of blocks the store can hold.
    fn capacity(&self) -> usize;
}
