//! Cache of recent query results.

use crate::storage::block::{AttributeHeader, Block};
use crate::storage::error::{StorageError, StorageResult};
use log::debug;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct CachedResult {
    pub result_id: u64,
    pub date_created: SystemTime,
    pub source_table: String,
    pub header: Vec<AttributeHeader>,
    pub block: Block,
}

/// Fixed array of result entries. New results take the first free entry;
/// once every entry is in use they overwrite in round-robin order.
#[derive(Debug)]
pub struct QueryResultCache {
    entries: Vec<Option<CachedResult>>,
    next_overwrite: usize,
}

impl QueryResultCache {
    pub fn new(capacity: usize) -> StorageResult<Self> {
        if capacity == 0 {
            return Err(StorageError::InvalidConfig(
                "query result cache needs at least one entry".to_string(),
            ));
        }
        Ok(Self {
            entries: (0..capacity).map(|_| None).collect(),
            next_overwrite: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a copy of `block` as the result of a query on `source_table`
    /// and return the id it can be looked up by.
    pub fn cache_result(
        &mut self,
        source_table: &str,
        block: &Block,
        header: &[AttributeHeader],
    ) -> u64 {
        let index = self.available_index();
        // Drop the entry being replaced first so its id can be reused.
        self.entries[index] = None;

        let date_created = SystemTime::now();
        let mut result_id = generate_result_id(&creation_stamp(date_created));
        while self.lookup(result_id).is_some() {
            result_id = result_id.wrapping_add(1);
        }

        self.entries[index] = Some(CachedResult {
            result_id,
            date_created,
            source_table: source_table.to_string(),
            header: header.to_vec(),
            block: block.clone(),
        });
        debug!(
            "Cached result {} of '{}' in entry {}",
            result_id, source_table, index
        );
        result_id
    }

    pub fn lookup(&self, result_id: u64) -> Option<&CachedResult> {
        self.entries
            .iter()
            .flatten()
            .find(|entry| entry.result_id == result_id)
    }

    /// Free the entry holding `result_id`. Returns whether it was cached.
    pub fn release(&mut self, result_id: u64) -> bool {
        match self
            .entries
            .iter()
            .position(|e| e.as_ref().map(|r| r.result_id) == Some(result_id))
        {
            Some(index) => {
                self.entries[index] = None;
                true
            }
            None => false,
        }
    }

    fn available_index(&mut self) -> usize {
        if let Some(index) = self.entries.iter().position(Option::is_none) {
            return index;
        }
        let index = self.next_overwrite;
        self.next_overwrite = (self.next_overwrite + 1) % self.entries.len();
        index
    }
}

fn creation_stamp(time: SystemTime) -> String {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:09}", since_epoch.as_secs(), since_epoch.subsec_nanos())
}

/// djb2 hash of `seed`.
pub fn djb2(seed: &str) -> u64 {
    seed.bytes().fold(5381u64, |hash, c| {
        (hash << 5).wrapping_add(hash).wrapping_add(c as u64)
    })
}

/// djb2 hash of `seed` plus a random offset below 1000.
pub fn generate_result_id(seed: &str) -> u64 {
    let offset = rand::thread_rng().gen_range(0..1000);
    djb2(seed).wrapping_add(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::{BlockAddress, TYPE_INT};
    use anyhow::Result;

    fn header() -> Vec<AttributeHeader> {
        vec![AttributeHeader::new("id", TYPE_INT)]
    }

    #[test]
    fn test_djb2_known_values() {
        assert_eq!(djb2(""), 5381);
        assert_eq!(djb2("a"), 5381 * 33 + 97);
    }

    #[test]
    fn test_result_id_offset_range() {
        let base = djb2("2026-10-19 12:00:00");
        for _ in 0..50 {
            let id = generate_result_id("2026-10-19 12:00:00");
            assert!(id >= base && id < base + 1000);
        }
    }

    #[test]
    fn test_cache_and_lookup() -> Result<()> {
        let mut cache = QueryResultCache::new(4)?;
        let block = Block::new(BlockAddress(12));

        let id = cache.cache_result("students", &block, &header());
        let entry = cache.lookup(id).unwrap();
        assert_eq!(entry.source_table, "students");
        assert_eq!(entry.block.address, BlockAddress(12));
        assert_eq!(entry.header, header());
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn test_release_frees_entry() -> Result<()> {
        let mut cache = QueryResultCache::new(2)?;
        let id = cache.cache_result("t", &Block::new(BlockAddress(1)), &header());

        assert!(cache.release(id));
        assert!(!cache.release(id));
        assert!(cache.lookup(id).is_none());
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_ids_are_unique() -> Result<()> {
        let mut cache = QueryResultCache::new(8)?;
        let mut ids: Vec<u64> = (0..8)
            .map(|_| cache.cache_result("t", &Block::new(BlockAddress(0)), &header()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        Ok(())
    }

    #[test]
    fn test_overwrites_round_robin_when_full() -> Result<()> {
        let mut cache = QueryResultCache::new(2)?;
        let first = cache.cache_result("a", &Block::new(BlockAddress(1)), &header());
        let second = cache.cache_result("b", &Block::new(BlockAddress(2)), &header());
        let third = cache.cache_result("c", &Block::new(BlockAddress(3)), &header());

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(first).is_none());
        assert!(cache.lookup(second).is_some());
        assert_eq!(cache.lookup(third).unwrap().source_table, "c");

        let fourth = cache.cache_result("d", &Block::new(BlockAddress(4)), &header());
        assert!(cache.lookup(second).is_none());
        assert!(cache.lookup(fourth).is_some());
        Ok(())
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            QueryResultCache::new(0),
            Err(StorageError::InvalidConfig(_))
        ));
    }
}
