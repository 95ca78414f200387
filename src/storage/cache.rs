//! Block cache: lookup, load on miss, eviction and write-back.

pub mod table;

use crate::storage::block::{AttributeHeader, Block, BlockAddress};
use crate::storage::disk::BlockStore;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::extent::ExtentKind;
use log::{debug, error, info};
use table::{CacheTable, SlotId};

/// Exit status used when a dirty block cannot be written back.
pub const EXIT_WRITE_BACK_FAILED: i32 = 1;

/// Refers to the block that was resident in `slot` when the handle was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    slot: SlotId,
    address: BlockAddress,
}

impl BlockHandle {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn address(&self) -> BlockAddress {
        self.address
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub capacity: usize,
    pub resident: usize,
    pub dirty: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

#[derive(Debug)]
pub struct CacheManager {
    table: CacheTable,
    store: Box<dyn BlockStore>,
    clock: u64,
    stats: CacheStats,
}

impl CacheManager {
    /// Build the cache and pre-load block `i` into slot `i` for every block
    /// the store holds. Slots beyond the store's capacity start empty.
    pub fn init(store: Box<dyn BlockStore>, capacity: usize) -> StorageResult<Self> {
        let mut cache = Self {
            table: CacheTable::new(capacity),
            store,
            clock: 0,
            stats: CacheStats::default(),
        };

        let preload = capacity.min(cache.store.capacity());
        for slot in 0..preload {
            cache.load_into_slot(BlockAddress(slot as u32), slot)?;
        }
        cache.table.update_next_replace();

        info!(
            "Block cache initialized: {} slots, {} pre-loaded",
            capacity, preload
        );
        Ok(cache)
    }

    /// Return a handle to the cached copy of `address`, loading it on a miss.
    ///
    /// A dirty block found in the cache is written back first; the cached
    /// copy stays authoritative and is not re-read. On a miss the block goes
    /// into a never-used slot if there is one, otherwise into the pre-selected
    /// victim, which is written back first if dirty.
    pub fn get_block(&mut self, address: BlockAddress) -> StorageResult<BlockHandle> {
        let slot = match self.table.slot_for_address(address) {
            Some(slot) => {
                self.stats.hits += 1;
                if self.table.slot(slot).is_dirty() {
                    self.write_back(slot);
                }
                slot
            }
            None => {
                self.stats.misses += 1;
                let block = self.store.read_block(address)?;
                let slot = match self.table.lookup_free_slot() {
                    Some(slot) => slot,
                    None => {
                        let victim = self.table.next_replace();
                        if self.table.slot(victim).is_dirty() {
                            self.write_back(victim);
                        }
                        self.stats.evictions += 1;
                        debug!(
                            "Evicting block {} from slot {} for block {}",
                            self.table.slot(victim).block().address,
                            victim,
                            address
                        );
                        victim
                    }
                };
                let now = self.tick();
                self.table.slot_mut(slot).install(block, now);
                slot
            }
        };

        self.table.update_next_replace();
        Ok(BlockHandle { slot, address })
    }

    pub fn block(&self, handle: BlockHandle) -> StorageResult<&Block> {
        self.check_handle(handle)?;
        Ok(self.table.slot(handle.slot).block())
    }

    /// Mutable access to a cached block. The block is marked dirty.
    pub fn block_mut(&mut self, handle: BlockHandle) -> StorageResult<&mut Block> {
        self.mark_dirty(handle)?;
        Ok(self.table.slot_mut(handle.slot).block_mut())
    }

    /// Flag the block as modified. It is written back on eviction, on the
    /// next cache hit or by `flush_all`.
    pub fn mark_dirty(&mut self, handle: BlockHandle) -> StorageResult<()> {
        self.check_handle(handle)?;
        let now = self.tick();
        self.table.slot_mut(handle.slot).mark_dirty(now);
        Ok(())
    }

    /// Write every dirty block back to the store. Returns how many were written.
    pub fn flush_all(&mut self) -> usize {
        let mut written = 0;
        for slot in 0..self.table.capacity() {
            if self.table.slot(slot).is_dirty() {
                self.write_back(slot);
                written += 1;
            }
        }
        debug!("Flushed {} dirty blocks", written);
        written
    }

    /// Re-read every resident block from the store.
    pub fn refresh(&mut self) -> StorageResult<()> {
        for slot in 0..self.table.capacity() {
            if let Some(address) = self.table.slot(slot).address() {
                self.reload_slot(slot, address)?;
            }
        }
        Ok(())
    }

    /// Re-read the resident blocks whose address lies in `from..=to`.
    pub fn refresh_range(&mut self, from: BlockAddress, to: BlockAddress) -> StorageResult<()> {
        for slot in 0..self.table.capacity() {
            match self.table.slot(slot).address() {
                Some(address) if address >= from && address <= to => {
                    self.reload_slot(slot, address)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reserve a new extent in the store. Cached copies of the blocks it
    /// covers are replaced by the freshly formatted ones; their unwritten
    /// changes are dropped, not written over the new extent.
    pub fn allocate_extent(
        &mut self,
        first_alloc: bool,
        size: usize,
        kind: ExtentKind,
        header: &[AttributeHeader],
    ) -> StorageResult<BlockAddress> {
        let start = self.store.allocate_extent(first_alloc, size, kind, header)?;
        self.discard_range(start, size)?;
        Ok(start)
    }

    /// Return an extent to the store's free pool. Cached copies of its blocks
    /// are replaced by the free blocks without being written back.
    pub fn free_extent(&mut self, start: BlockAddress, size: usize) -> StorageResult<()> {
        self.store.free_extent(start, size)?;
        self.discard_range(start, size)
    }

    pub fn table(&self) -> &CacheTable {
        &self.table
    }

    pub fn store_capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.table.capacity(),
            resident: self.table.resident_count(),
            dirty: self.table.dirty_count(),
            ..self.stats
        }
    }

    fn load_into_slot(&mut self, address: BlockAddress, slot: SlotId) -> StorageResult<()> {
        let block = self.store.read_block(address)?;
        let now = self.tick();
        self.table.slot_mut(slot).install(block, now);
        Ok(())
    }

    fn reload_slot(&mut self, slot: SlotId, address: BlockAddress) -> StorageResult<()> {
        if self.table.slot(slot).is_dirty() {
            self.write_back(slot);
        }
        let block = self.store.read_block(address)?;
        self.table.slot_mut(slot).replace_block(block);
        Ok(())
    }

    /// Replace resident copies of `size` blocks from `start` with the store's
    /// blocks, without writing them back.
    fn discard_range(&mut self, start: BlockAddress, size: usize) -> StorageResult<()> {
        if size == 0 {
            return Ok(());
        }
        let end = start.offset(size as u32 - 1);
        for slot in 0..self.table.capacity() {
            match self.table.slot(slot).address() {
                Some(address) if address >= start && address <= end => {
                    if self.table.slot(slot).is_dirty() {
                        debug!("Dropping unwritten changes to block {} in slot {}", address, slot);
                    }
                    let block = self.store.read_block(address)?;
                    self.table.slot_mut(slot).replace_block(block);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Write a slot back to the store. A failed write loses data the rest of
    /// the system assumes durable, so the process is terminated.
    fn write_back(&mut self, slot: SlotId) {
        let cached = self.table.slot(slot);
        if let Err(err) = self.store.write_block(cached.block()) {
            error!(
                "Cannot write block {} from cache slot {} back to the store: {}",
                cached.block().address,
                slot,
                err
            );
            std::process::exit(EXIT_WRITE_BACK_FAILED);
        }
        self.table.slot_mut(slot).mark_clean();
        self.stats.write_backs += 1;
    }

    fn check_handle(&self, handle: BlockHandle) -> StorageResult<()> {
        let current = self
            .table
            .slots()
            .get(handle.slot)
            .and_then(|slot| slot.address());
        if current != Some(handle.address) {
            return Err(StorageError::StaleHandle {
                slot: handle.slot,
                expected: handle.address,
            });
        }
        Ok(())
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
