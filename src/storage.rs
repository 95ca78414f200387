//! Block storage for extentdb.
//!
//! - **Block**: fixed-size unit of I/O with an attribute header, a tuple
//!   dictionary and a payload area
//! - **BlockStore**: reads, writes and allocates blocks on disk
//! - **CacheManager**: fixed set of cache slots with oldest-read eviction and
//!   write-back of dirty blocks
//! - **ExtentAllocator**: grows segments by whole extents
//! - **Segment resolution**: maps a segment name to its extents through the
//!   system catalog

pub mod block;
pub mod cache;
pub mod disk;
pub mod error;
pub mod extent;
pub mod segment;

pub use block::{AttributeHeader, Block, BlockAddress, BlockKind, FieldValue, BLOCK_SIZE};
pub use cache::{BlockHandle, CacheManager, CacheStats};
pub use disk::{BlockStore, FileBlockStore};
pub use error::{StorageError, StorageResult};
pub use extent::{ExtentAllocator, ExtentKind};
pub use segment::{Extent, ExtentList};
