//! Segment address resolution: segment name to extent list.

use crate::catalog::{self, INDEX_CATALOG, RELATION_CATALOG};
use crate::storage::block::BlockAddress;
use crate::storage::cache::CacheManager;
use crate::storage::error::StorageResult;
use log::{debug, warn};

/// A block is a candidate for new rows while it uses less payload than this.
pub const MAX_FREE_SPACE_SIZE: usize = 4000;
/// ... and fewer tuple dictionary entries than this.
pub const MAX_LAST_TUPLE_DICT_SIZE_TO_USE: usize = 480;

/// Inclusive range of block addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub from: BlockAddress,
    pub to: BlockAddress,
}

impl Extent {
    pub fn new(from: BlockAddress, to: BlockAddress) -> Self {
        Self { from, to }
    }

    /// Number of blocks covered.
    pub fn len(&self) -> usize {
        (self.to.0 - self.from.0) as usize + 1
    }

    pub fn contains(&self, address: BlockAddress) -> bool {
        address >= self.from && address <= self.to
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    pub fn addresses(&self) -> impl Iterator<Item = BlockAddress> {
        (self.from.0..=self.to.0).map(BlockAddress)
    }
}

/// Extents of one segment in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentList {
    extents: Vec<Extent>,
}

impl ExtentList {
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn first(&self) -> Option<&Extent> {
        self.extents.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Extent> {
        self.extents.iter()
    }

    /// `to - from` of the widest extent, or 0 for an empty segment.
    pub fn largest_span(&self) -> usize {
        self.extents
            .iter()
            .map(|extent| (extent.to.0 - extent.from.0) as usize)
            .max()
            .unwrap_or(0)
    }

    pub fn contains(&self, address: BlockAddress) -> bool {
        self.extents.iter().any(|extent| extent.contains(address))
    }

    pub fn total_blocks(&self) -> usize {
        self.extents.iter().map(Extent::len).sum()
    }
}

impl<'a> IntoIterator for &'a ExtentList {
    type Item = &'a Extent;
    type IntoIter = std::slice::Iter<'a, Extent>;

    fn into_iter(self) -> Self::IntoIter {
        self.extents.iter()
    }
}

impl FromIterator<Extent> for ExtentList {
    fn from_iter<I: IntoIterator<Item = Extent>>(iter: I) -> Self {
        Self {
            extents: iter.into_iter().collect(),
        }
    }
}

/// Collect the extents recorded for `segment_name` in `catalog_table`, at
/// most `max_extents` of them. An unknown segment yields an empty list.
pub fn resolve_addresses(
    cache: &mut CacheManager,
    segment_name: &str,
    catalog_table: &str,
    max_extents: usize,
) -> StorageResult<ExtentList> {
    let rows = catalog::catalog_rows(cache, catalog_table)?;

    let mut extents = Vec::new();
    for row in rows.iter().filter(|row| row.name == segment_name) {
        if extents.len() == max_extents {
            warn!(
                "Segment '{}' has more than {} extents in {}; ignoring the rest",
                segment_name, max_extents, catalog_table
            );
            break;
        }
        extents.push(row.extent());
    }

    debug!(
        "Resolved '{}' in {}: {} extents",
        segment_name,
        catalog_table,
        extents.len()
    );
    Ok(ExtentList { extents })
}

pub fn resolve_table_addresses(
    cache: &mut CacheManager,
    table: &str,
    max_extents: usize,
) -> StorageResult<ExtentList> {
    resolve_addresses(cache, table, RELATION_CATALOG, max_extents)
}

pub fn resolve_index_addresses(
    cache: &mut CacheManager,
    index: &str,
    max_extents: usize,
) -> StorageResult<ExtentList> {
    resolve_addresses(cache, index, INDEX_CATALOG, max_extents)
}

/// First block of the segment with room for more rows. `None` means the
/// segment needs a new extent.
pub fn find_free_space(
    cache: &mut CacheManager,
    extents: &ExtentList,
) -> StorageResult<Option<BlockAddress>> {
    for extent in extents {
        for address in extent.addresses() {
            let handle = cache.get_block(address)?;
            let block = cache.block(handle)?;
            if block.free_space < MAX_FREE_SPACE_SIZE
                && block.last_tuple_dict_id < MAX_LAST_TUPLE_DICT_SIZE_TO_USE
            {
                return Ok(Some(address));
            }
        }
    }
    Ok(None)
}
