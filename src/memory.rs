//! Memory manager: block cache, extent allocator, redo log and query result
//! cache behind one handle.

pub mod query_cache;
pub mod redo_log;

use crate::catalog;
use crate::config::MemoryConfig;
use crate::storage::block::{AttributeHeader, Block, BlockAddress};
use crate::storage::cache::{BlockHandle, CacheManager, CacheStats};
use crate::storage::disk::{BlockStore, FileBlockStore};
use crate::storage::error::StorageResult;
use crate::storage::extent::{ExtentAllocator, ExtentKind};
use crate::storage::segment::{self, ExtentList};
use log::info;
use parking_lot::Mutex;
use query_cache::QueryResultCache;
use redo_log::RedoLog;
use std::path::Path;
use std::sync::Arc;

/// Memory manager shared between threads.
pub type SharedMemoryManager = Arc<Mutex<MemoryManager>>;

#[derive(Debug)]
pub struct MemoryManager {
    config: MemoryConfig,
    cache: CacheManager,
    allocator: ExtentAllocator,
    redo_log: RedoLog,
    query_cache: QueryResultCache,
}

impl MemoryManager {
    pub fn init(store: Box<dyn BlockStore>, config: MemoryConfig) -> StorageResult<Self> {
        config.validate()?;
        let cache = CacheManager::init(store, config.cache_capacity)?;
        Ok(Self {
            allocator: ExtentAllocator::new(config.clone()),
            redo_log: RedoLog::new(config.redo_log_entries)?,
            query_cache: QueryResultCache::new(config.query_result_entries)?,
            cache,
            config,
        })
    }

    /// Create a store file of `blocks` blocks and format its system catalog.
    pub fn create(path: &Path, blocks: usize, config: MemoryConfig) -> StorageResult<Self> {
        let store = FileBlockStore::create(path, blocks)?;
        let mut manager = Self::init(Box::new(store), config)?;
        manager.bootstrap()?;
        Ok(manager)
    }

    pub fn open(path: &Path, config: MemoryConfig) -> StorageResult<Self> {
        let store = FileBlockStore::open(path)?;
        let manager = Self::init(Box::new(store), config)?;
        info!("Opened store {:?}", path);
        Ok(manager)
    }

    pub fn bootstrap(&mut self) -> StorageResult<()> {
        catalog::bootstrap(&mut self.cache)
    }

    pub fn get_block(&mut self, address: BlockAddress) -> StorageResult<BlockHandle> {
        self.cache.get_block(address)
    }

    pub fn block(&self, handle: BlockHandle) -> StorageResult<&Block> {
        self.cache.block(handle)
    }

    pub fn block_mut(&mut self, handle: BlockHandle) -> StorageResult<&mut Block> {
        self.cache.block_mut(handle)
    }

    pub fn mark_dirty(&mut self, handle: BlockHandle) -> StorageResult<()> {
        self.cache.mark_dirty(handle)
    }

    pub fn flush_all(&mut self) -> usize {
        self.cache.flush_all()
    }

    pub fn grow_segment(&mut self, segment_name: &str, kind: ExtentKind) -> StorageResult<BlockAddress> {
        self.allocator.grow_segment(&mut self.cache, segment_name, kind)
    }

    pub fn grow_segment_with_header(
        &mut self,
        segment_name: &str,
        kind: ExtentKind,
        header: &[AttributeHeader],
    ) -> StorageResult<BlockAddress> {
        self.allocator
            .grow_segment_with_header(&mut self.cache, segment_name, kind, header)
    }

    pub fn resolve_addresses(&mut self, segment_name: &str, kind: ExtentKind) -> StorageResult<ExtentList> {
        self.allocator.resolve(&mut self.cache, segment_name, kind)
    }

    pub fn resolve_table_addresses(&mut self, table: &str) -> StorageResult<ExtentList> {
        segment::resolve_table_addresses(&mut self.cache, table, self.config.max_extents_in_segment)
    }

    pub fn resolve_index_addresses(&mut self, index: &str) -> StorageResult<ExtentList> {
        segment::resolve_index_addresses(&mut self.cache, index, self.config.max_extents_in_segment)
    }

    /// First block of `table` with room for more rows.
    pub fn find_free_space(&mut self, table: &str) -> StorageResult<Option<BlockAddress>> {
        let extents = self.resolve_table_addresses(table)?;
        segment::find_free_space(&mut self.cache, &extents)
    }

    /// Record segments of `kind` in `catalog_table`, creating the catalog
    /// table first if the store does not have it yet.
    pub fn register_catalog(&mut self, kind: ExtentKind, catalog_table: &str) -> StorageResult<()> {
        let exists = catalog::root_rows(&mut self.cache)?
            .iter()
            .any(|row| row.name == catalog_table);
        if !exists {
            catalog::create_catalog(&mut self.cache, catalog_table)?;
        }
        self.allocator.register_catalog(kind, catalog_table);
        Ok(())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn redo_log(&self) -> &RedoLog {
        &self.redo_log
    }

    pub fn redo_log_mut(&mut self) -> &mut RedoLog {
        &mut self.redo_log
    }

    pub fn query_cache(&self) -> &QueryResultCache {
        &self.query_cache
    }

    pub fn query_cache_mut(&mut self) -> &mut QueryResultCache {
        &mut self.query_cache
    }

    pub fn into_shared(self) -> SharedMemoryManager {
        Arc::new(Mutex::new(self))
    }
}
