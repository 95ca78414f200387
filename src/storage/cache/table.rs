use crate::storage::block::{Block, BlockAddress};

pub type SlotId = usize;

/// One cache slot: a resident block plus its bookkeeping.
///
/// A slot whose `timestamp_read` is `None` has never held a block.
#[derive(Debug)]
pub struct CachedBlock {
    block: Block,
    dirty: bool,
    timestamp_read: Option<u64>,
    timestamp_last_change: Option<u64>,
}

impl CachedBlock {
    fn empty(slot: SlotId) -> Self {
        Self {
            block: Block::new(BlockAddress(slot as u32)),
            dirty: false,
            timestamp_read: None,
            timestamp_last_change: None,
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub(crate) fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_resident(&self) -> bool {
        self.timestamp_read.is_some()
    }

    pub fn timestamp_read(&self) -> Option<u64> {
        self.timestamp_read
    }

    pub fn timestamp_last_change(&self) -> Option<u64> {
        self.timestamp_last_change
    }

    /// Resident address, if any.
    pub fn address(&self) -> Option<BlockAddress> {
        self.is_resident().then_some(self.block.address)
    }

    /// Replace the slot content with a freshly read block.
    pub(crate) fn install(&mut self, block: Block, now: u64) {
        self.block = block;
        self.dirty = false;
        self.timestamp_read = Some(now);
        self.timestamp_last_change = Some(now);
    }

    /// Swap in a re-read copy of the same block, keeping the timestamps.
    pub(crate) fn replace_block(&mut self, block: Block) {
        self.block = block;
        self.dirty = false;
    }

    pub(crate) fn mark_dirty(&mut self, now: u64) {
        self.dirty = true;
        self.timestamp_last_change = Some(now);
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// Fixed array of cache slots and the pre-selected eviction victim.
#[derive(Debug)]
pub struct CacheTable {
    slots: Vec<CachedBlock>,
    next_replace: SlotId,
}

impl CacheTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(CachedBlock::empty).collect(),
            next_replace: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[CachedBlock] {
        &self.slots
    }

    pub fn slot(&self, slot: SlotId) -> &CachedBlock {
        &self.slots[slot]
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotId) -> &mut CachedBlock {
        &mut self.slots[slot]
    }

    /// Slot currently holding `address`.
    pub fn slot_for_address(&self, address: BlockAddress) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| slot.is_resident() && slot.block.address == address)
    }

    /// First slot that has never held a block.
    pub fn lookup_free_slot(&self) -> Option<SlotId> {
        self.slots.iter().position(|slot| !slot.is_resident())
    }

    pub fn next_replace(&self) -> SlotId {
        self.next_replace
    }

    /// Pick the resident slot with the oldest read time as the next victim.
    /// Ties go to the lowest slot index.
    pub fn update_next_replace(&mut self) {
        let oldest = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.timestamp_read.map(|ts| (ts, index)))
            .min();
        if let Some((_, index)) = oldest {
            self.next_replace = index;
        }
    }

    pub fn resident_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_resident()).count()
    }

    pub fn dirty_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_dirty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(address: u32) -> Block {
        Block::new(BlockAddress(address))
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = CacheTable::new(4);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.resident_count(), 0);
        assert_eq!(table.lookup_free_slot(), Some(0));
        // Empty slots never match, even though their placeholder block has
        // an address.
        assert_eq!(table.slot_for_address(BlockAddress(0)), None);
    }

    #[test]
    fn test_install_and_lookup() {
        let mut table = CacheTable::new(3);
        table.slot_mut(0).install(block(10), 1);
        table.slot_mut(1).install(block(20), 2);

        assert_eq!(table.slot_for_address(BlockAddress(20)), Some(1));
        assert_eq!(table.slot_for_address(BlockAddress(30)), None);
        assert_eq!(table.lookup_free_slot(), Some(2));
        assert_eq!(table.slot(0).address(), Some(BlockAddress(10)));
        assert_eq!(table.slot(2).address(), None);
    }

    #[test]
    fn test_full_table_has_no_free_slot() {
        let mut table = CacheTable::new(2);
        table.slot_mut(0).install(block(0), 1);
        table.slot_mut(1).install(block(1), 2);
        assert_eq!(table.lookup_free_slot(), None);
    }

    #[test]
    fn test_next_replace_is_oldest_read() {
        let mut table = CacheTable::new(4);
        table.slot_mut(0).install(block(0), 7);
        table.slot_mut(1).install(block(1), 3);
        table.slot_mut(2).install(block(2), 5);

        table.update_next_replace();
        assert_eq!(table.next_replace(), 1);

        // Changing a block does not move its read time.
        table.slot_mut(1).mark_dirty(9);
        table.update_next_replace();
        assert_eq!(table.next_replace(), 1);

        table.slot_mut(1).install(block(8), 10);
        table.update_next_replace();
        assert_eq!(table.next_replace(), 2);
    }

    #[test]
    fn test_next_replace_tie_breaks_on_lowest_slot() {
        let mut table = CacheTable::new(3);
        table.slot_mut(2).install(block(2), 4);
        table.slot_mut(1).install(block(1), 4);
        table.update_next_replace();
        assert_eq!(table.next_replace(), 1);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut table = CacheTable::new(2);
        table.slot_mut(0).install(block(0), 1);
        table.slot_mut(0).mark_dirty(2);

        assert!(table.slot(0).is_dirty());
        assert_eq!(table.slot(0).timestamp_read(), Some(1));
        assert_eq!(table.slot(0).timestamp_last_change(), Some(2));
        assert_eq!(table.dirty_count(), 1);

        table.slot_mut(0).mark_clean();
        assert_eq!(table.dirty_count(), 0);
    }
}
