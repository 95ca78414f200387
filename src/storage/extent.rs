//! Segment growth: sizing and recording new extents.

use crate::catalog::{self, CatalogRow, CATALOG_ROOT, INDEX_CATALOG, RELATION_CATALOG};
use crate::config::MemoryConfig;
use crate::storage::block::{AttributeHeader, Block, BlockAddress};
use crate::storage::cache::CacheManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::segment::{self, ExtentList};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtentKind {
    Table,
    Index,
    Transaction,
    Temp,
}

impl ExtentKind {
    pub const ALL: [ExtentKind; 4] = [
        ExtentKind::Table,
        ExtentKind::Index,
        ExtentKind::Transaction,
        ExtentKind::Temp,
    ];

    /// Catalog that records segments of this kind out of the box.
    pub fn default_catalog(self) -> Option<&'static str> {
        match self {
            ExtentKind::Table => Some(RELATION_CATALOG),
            ExtentKind::Index => Some(INDEX_CATALOG),
            ExtentKind::Transaction | ExtentKind::Temp => None,
        }
    }
}

impl fmt::Display for ExtentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtentKind::Table => "table",
            ExtentKind::Index => "index",
            ExtentKind::Transaction => "transaction",
            ExtentKind::Temp => "temp",
        };
        f.write_str(name)
    }
}

/// Grows segments by allocating extents and recording them in the catalog
/// for their kind.
///
/// Table and index segments are recorded in `AK_relation` and `AK_index`.
/// Transaction and temp segments have no catalog until one is registered
/// with [`ExtentAllocator::register_catalog`].
#[derive(Debug, Clone)]
pub struct ExtentAllocator {
    config: MemoryConfig,
    catalogs: HashMap<ExtentKind, String>,
}

impl ExtentAllocator {
    pub fn new(config: MemoryConfig) -> Self {
        let catalogs = ExtentKind::ALL
            .iter()
            .filter_map(|kind| kind.default_catalog().map(|name| (*kind, name.to_string())))
            .collect();
        Self { config, catalogs }
    }

    /// Record segments of `kind` in `catalog_table`, which must already be
    /// listed in the catalog-of-catalogs.
    pub fn register_catalog(&mut self, kind: ExtentKind, catalog_table: &str) {
        self.catalogs.insert(kind, catalog_table.to_string());
    }

    pub fn catalog_for(&self, kind: ExtentKind) -> StorageResult<&str> {
        self.catalogs
            .get(&kind)
            .map(String::as_str)
            .ok_or(StorageError::NoCatalog(kind))
    }

    pub fn resolve(
        &self,
        cache: &mut CacheManager,
        segment_name: &str,
        kind: ExtentKind,
    ) -> StorageResult<ExtentList> {
        let catalog_table = self.catalog_for(kind)?;
        segment::resolve_addresses(
            cache,
            segment_name,
            catalog_table,
            self.config.max_extents_in_segment,
        )
    }

    /// Add an extent to `segment_name` and return its first block.
    ///
    /// New blocks copy the header of the segment's first block; a segment
    /// without extents takes the header of block 0.
    pub fn grow_segment(
        &self,
        cache: &mut CacheManager,
        segment_name: &str,
        kind: ExtentKind,
    ) -> StorageResult<BlockAddress> {
        let extents = self.resolve(cache, segment_name, kind)?;
        let header_source = extents.first().map(|extent| extent.from).unwrap_or(CATALOG_ROOT);
        let handle = cache.get_block(header_source)?;
        let header = cache.block(handle)?.header().to_vec();

        self.add_extent(cache, segment_name, kind, &extents, &header)
    }

    /// Like [`grow_segment`](Self::grow_segment), with an explicit header for
    /// the new blocks.
    pub fn grow_segment_with_header(
        &self,
        cache: &mut CacheManager,
        segment_name: &str,
        kind: ExtentKind,
        header: &[AttributeHeader],
    ) -> StorageResult<BlockAddress> {
        let extents = self.resolve(cache, segment_name, kind)?;
        self.add_extent(cache, segment_name, kind, &extents, header)
    }

    fn add_extent(
        &self,
        cache: &mut CacheManager,
        segment_name: &str,
        kind: ExtentKind,
        extents: &ExtentList,
        header: &[AttributeHeader],
    ) -> StorageResult<BlockAddress> {
        let catalog_table = self.catalog_for(kind)?;
        let (old_size, blocks) = self.extent_size(extents, kind)?;

        // Reject a row the catalog could never hold before touching the store.
        let mut row = CatalogRow {
            obj_id: catalog::next_object_id(cache)?,
            name: segment_name.to_string(),
            start_address: CATALOG_ROOT,
            end_address: CATALOG_ROOT,
        };
        Block::new(CATALOG_ROOT).check_row(&row.to_fields())?;

        let start_address = cache.allocate_extent(true, blocks, kind, header)?;
        row.start_address = start_address;
        row.end_address = start_address.offset(blocks as u32 - 1);

        if let Err(err) = catalog::insert_row(cache, catalog_table, &row) {
            warn!(
                "Could not record extent {}..={} of '{}': {}; releasing it",
                row.start_address, row.end_address, segment_name, err
            );
            cache.free_extent(start_address, blocks)?;
            return Err(err);
        }

        debug!(
            "Grew {} segment '{}': old_size={}, new extent {}..={}",
            kind, segment_name, old_size, row.start_address, row.end_address
        );
        Ok(start_address)
    }

    /// `old_size` is the block count of the widest existing extent (1 for a
    /// new segment). The new extent ends at
    /// `start + old_size + floor(old_size * growth_factor)`, inclusive.
    fn extent_size(&self, extents: &ExtentList, kind: ExtentKind) -> StorageResult<(usize, usize)> {
        let old_size = extents.largest_span() + 1;
        let growth = (old_size as f64 * f64::from(self.config.growth_factor(kind))).floor();
        let blocks = if growth < u32::MAX as f64 {
            old_size
                .checked_add(growth as usize)
                .and_then(|size| size.checked_add(1))
                .filter(|&size| size <= u32::MAX as usize)
        } else {
            None
        };
        let blocks = blocks.ok_or(StorageError::AllocationFailure {
            requested: usize::MAX,
        })?;
        Ok((old_size, blocks))
    }
}
