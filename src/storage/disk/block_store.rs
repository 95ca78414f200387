use crate::storage::block::{AttributeHeader, Block, BlockAddress, BLOCK_SIZE};
use crate::storage::disk::BlockStore;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::extent::ExtentKind;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

// The kind field follows the 4-byte address in every encoded block.
const KIND_OFFSET: u64 = 4;
const KIND_FREE: i32 = -1;

/// A fixed-capacity file of blocks with an in-memory allocation map.
///
/// The allocation map is rebuilt from the block kinds when the file is opened.
#[derive(Debug)]
pub struct FileBlockStore {
    file: File,
    allocated: Vec<bool>,
    last_allocated: Option<usize>,
}

impl FileBlockStore {
    /// Create a store of `blocks` free blocks, truncating any existing file.
    pub fn create(path: &Path, blocks: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(blocks as u64 * BLOCK_SIZE as u64)?;

        let mut store = Self {
            file,
            allocated: vec![false; blocks],
            last_allocated: None,
        };
        for address in 0..blocks {
            store.write_block(&Block::new(BlockAddress(address as u32)))?;
        }
        store.file.sync_all()?;

        debug!("Created block store {:?} with {} blocks", path, blocks);
        Ok(store)
    }

    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let file_size = file.metadata()?.len();
        if file_size % BLOCK_SIZE as u64 != 0 {
            return Err(StorageError::InvalidBlockSize {
                expected: BLOCK_SIZE,
                actual: (file_size % BLOCK_SIZE as u64) as usize,
            });
        }
        let blocks = (file_size / BLOCK_SIZE as u64) as usize;

        let mut allocated = Vec::with_capacity(blocks);
        let mut kind = [0u8; 4];
        for address in 0..blocks {
            file.seek(SeekFrom::Start(Self::block_offset(address) + KIND_OFFSET))?;
            file.read_exact(&mut kind)?;
            allocated.push(i32::from_le_bytes(kind) != KIND_FREE);
        }
        let last_allocated = allocated.iter().rposition(|&used| used);

        debug!(
            "Opened block store {:?}: {} blocks, {} allocated",
            path,
            blocks,
            allocated.iter().filter(|&&used| used).count()
        );
        Ok(Self {
            file,
            allocated,
            last_allocated,
        })
    }

    pub fn is_allocated(&self, address: BlockAddress) -> bool {
        self.allocated
            .get(address.as_index())
            .copied()
            .unwrap_or(false)
    }

    pub fn allocated_blocks(&self) -> usize {
        self.allocated.iter().filter(|&&used| used).count()
    }

    fn block_offset(index: usize) -> u64 {
        index as u64 * BLOCK_SIZE as u64
    }

    /// First run of `size` free blocks starting at or after `from`.
    fn find_free_run(&self, from: usize, size: usize) -> Option<usize> {
        let mut run_start = from;
        let mut run_len = 0;
        for index in from..self.allocated.len() {
            if self.allocated[index] {
                run_len = 0;
                run_start = index + 1;
                continue;
            }
            run_len += 1;
            if run_len == size {
                return Some(run_start);
            }
        }
        None
    }
}

impl BlockStore for FileBlockStore {
    fn read_block(&mut self, address: BlockAddress) -> StorageResult<Block> {
        if address.as_index() >= self.allocated.len() {
            return Err(StorageError::BlockNotFound(address));
        }

        let mut buf = vec![0u8; BLOCK_SIZE];
        self.file
            .seek(SeekFrom::Start(Self::block_offset(address.as_index())))?;
        self.file.read_exact(&mut buf)?;

        let block = Block::decode(&buf)?;
        if block.address != address {
            return Err(StorageError::CatalogCorruption {
                address,
                reason: format!("block claims address {}", block.address),
            });
        }
        Ok(block)
    }

    fn write_block(&mut self, block: &Block) -> StorageResult<()> {
        if block.address.as_index() >= self.allocated.len() {
            return Err(StorageError::BlockNotFound(block.address));
        }

        let data = block.encode();
        self.file
            .seek(SeekFrom::Start(Self::block_offset(block.address.as_index())))?;
        self.file.write_all(&data)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn allocate_extent(
        &mut self,
        first_alloc: bool,
        size: usize,
        kind: ExtentKind,
        header: &[AttributeHeader],
    ) -> StorageResult<BlockAddress> {
        if size == 0 {
            return Err(StorageError::AllocationFailure { requested: 0 });
        }

        let search_from = if first_alloc {
            0
        } else {
            self.last_allocated.map(|last| last + 1).unwrap_or(0)
        };
        let start = self
            .find_free_run(search_from, size)
            .or_else(|| {
                // Next-fit wraps around once.
                if search_from > 0 {
                    self.find_free_run(0, size)
                } else {
                    None
                }
            })
            .ok_or(StorageError::AllocationFailure { requested: size })?;

        for index in start..start + size {
            let block = Block::formatted(BlockAddress(index as u32), header)?;
            self.write_block(&block)?;
            self.allocated[index] = true;
        }
        self.last_allocated = Some(start + size - 1);

        debug!(
            "Allocated {} extent of {} blocks at {}",
            kind, size, start
        );
        Ok(BlockAddress(start as u32))
    }

    fn free_extent(&mut self, start: BlockAddress, size: usize) -> StorageResult<()> {
        let first = start.as_index();
        let end = first + size;
        if end > self.allocated.len() {
            return Err(StorageError::BlockNotFound(BlockAddress(end as u32 - 1)));
        }
        if let Some(index) = (first..end).find(|&index| !self.allocated[index]) {
            return Err(StorageError::CatalogCorruption {
                address: BlockAddress(index as u32),
                reason: "freeing a block that is not allocated".to_string(),
            });
        }

        for index in first..end {
            self.write_block(&Block::new(BlockAddress(index as u32)))?;
            self.allocated[index] = false;
        }

        debug!("Freed {} blocks at {}", size, start);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.allocated.len()
    }
}
