//! System catalog kept in ordinary blocks.
//!
//! Block 0 is the catalog-of-catalogs: `(name, address)` rows telling where
//! each catalog table lives. A catalog table is a chain of blocks of
//! `(obj_id, name, start_address, end_address)` rows, one row per extent;
//! every block of the chain has its own root row, in chain order. A full
//! catalog grows by one block. All access goes through the block cache.

pub mod catalog_row;

use crate::storage::block::{Block, BlockAddress, BlockKind};
use crate::storage::cache::CacheManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::extent::ExtentKind;
use catalog_row::{catalog_header, root_header, RootRow, CATALOG_ROW_FIELDS, ROOT_ROW_FIELDS};
use log::{debug, info};

pub use catalog_row::CatalogRow;

pub const CATALOG_ROOT: BlockAddress = BlockAddress(0);
pub const RELATION_CATALOG: &str = "AK_relation";
pub const INDEX_CATALOG: &str = "AK_index";
/// First object id handed out.
pub const ID_START_VALUE: i32 = 100;

/// Format an empty store: the root block plus the relation and index catalogs.
pub fn bootstrap(cache: &mut CacheManager) -> StorageResult<()> {
    if is_formatted(cache)? {
        return Err(StorageError::AlreadyFormatted);
    }

    cache.allocate_extent(true, 1, ExtentKind::Table, &root_header())?;
    let relation = create_catalog(cache, RELATION_CATALOG)?;
    let index = create_catalog(cache, INDEX_CATALOG)?;
    cache.flush_all();

    info!(
        "Bootstrapped system catalog: {} at {}, {} at {}",
        RELATION_CATALOG, relation, INDEX_CATALOG, index
    );
    Ok(())
}

pub fn is_formatted(cache: &mut CacheManager) -> StorageResult<bool> {
    let root = cache.get_block(CATALOG_ROOT)?;
    Ok(cache.block(root)?.kind != BlockKind::Free)
}

/// Allocate a block for a new catalog table and register it in the root block.
pub fn create_catalog(cache: &mut CacheManager, name: &str) -> StorageResult<BlockAddress> {
    if root_rows(cache)?.iter().any(|row| row.name == name) {
        return Err(StorageError::DuplicateCatalog(name.to_string()));
    }

    let row = RootRow {
        name: name.to_string(),
        address: CATALOG_ROOT,
    };
    let root = cache.get_block(CATALOG_ROOT)?;
    cache.block(root)?.check_row(&row.to_fields())?;

    let address = cache.allocate_extent(false, 1, ExtentKind::Table, &catalog_header())?;
    let row = RootRow { address, ..row };
    let root = cache.get_block(CATALOG_ROOT)?;
    cache.block_mut(root)?.append_row(&row.to_fields())?;

    debug!("Created catalog {} at block {}", name, address);
    Ok(address)
}

/// Rows of the catalog-of-catalogs, in insertion order.
pub fn root_rows(cache: &mut CacheManager) -> StorageResult<Vec<RootRow>> {
    let handle = cache.get_block(CATALOG_ROOT)?;
    let block = cache.block(handle)?;

    let mut rows = Vec::new();
    let mut index = 0;
    while let Some(entry) = block.entry(index) {
        if entry.is_free() {
            break;
        }
        rows.push(RootRow::decode(block, index)?);
        index += ROOT_ROW_FIELDS;
    }
    Ok(rows)
}

/// Names of all catalog tables, in creation order.
pub fn catalog_names(cache: &mut CacheManager) -> StorageResult<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for row in root_rows(cache)? {
        if !names.contains(&row.name) {
            names.push(row.name);
        }
    }
    Ok(names)
}

/// Blocks of the catalog table called `catalog_table`, in chain order.
pub fn catalog_blocks(
    cache: &mut CacheManager,
    catalog_table: &str,
) -> StorageResult<Vec<BlockAddress>> {
    let blocks: Vec<_> = root_rows(cache)?
        .into_iter()
        .filter(|row| row.name == catalog_table)
        .map(|row| row.address)
        .collect();
    if blocks.is_empty() {
        return Err(StorageError::CatalogCorruption {
            address: CATALOG_ROOT,
            reason: format!("no catalog named '{}'", catalog_table),
        });
    }
    Ok(blocks)
}

/// First block of the catalog table called `catalog_table`.
pub fn catalog_address(cache: &mut CacheManager, catalog_table: &str) -> StorageResult<BlockAddress> {
    Ok(catalog_blocks(cache, catalog_table)?[0])
}

/// Every row of a catalog table, walking its blocks in chain order. Within a
/// block the scan stops at the first free tuple dictionary entry or at the
/// block's last used entry.
pub fn catalog_rows(cache: &mut CacheManager, catalog_table: &str) -> StorageResult<Vec<CatalogRow>> {
    let mut rows = Vec::new();
    for address in catalog_blocks(cache, catalog_table)? {
        let handle = cache.get_block(address)?;
        let block = cache.block(handle)?;

        let mut index = 0;
        while index < block.last_tuple_dict_id {
            match block.entry(index) {
                Some(entry) if !entry.is_free() => {}
                _ => break,
            }
            if index + CATALOG_ROW_FIELDS > block.last_tuple_dict_id {
                return Err(StorageError::CatalogCorruption {
                    address,
                    reason: format!("truncated catalog row at tuple dict entry {}", index),
                });
            }
            rows.push(CatalogRow::decode(block, index)?);
            index += CATALOG_ROW_FIELDS;
        }
    }
    Ok(rows)
}

/// Append `row` to a catalog table, adding a block to the table when its
/// last block is full.
pub fn insert_row(cache: &mut CacheManager, catalog_table: &str, row: &CatalogRow) -> StorageResult<()> {
    let fields = row.to_fields();
    // A row that cannot fit even an empty block is rejected before anything
    // is allocated.
    Block::new(CATALOG_ROOT).check_row(&fields)?;

    let blocks = catalog_blocks(cache, catalog_table)?;
    let last = blocks[blocks.len() - 1];
    let handle = cache.get_block(last)?;
    let address = match cache.block(handle)?.check_row(&fields) {
        Ok(()) => last,
        Err(StorageError::BlockFull { .. }) => extend_catalog(cache, catalog_table)?,
        Err(err) => return Err(err),
    };

    let handle = cache.get_block(address)?;
    cache.block_mut(handle)?.append_row(&fields)?;
    debug!(
        "Recorded extent {}..={} of '{}' in {} (block {})",
        row.start_address, row.end_address, row.name, catalog_table, address
    );
    Ok(())
}

/// Allocate one more block for `catalog_table` and register it in the root.
fn extend_catalog(cache: &mut CacheManager, catalog_table: &str) -> StorageResult<BlockAddress> {
    let root_row = RootRow {
        name: catalog_table.to_string(),
        address: CATALOG_ROOT,
    };
    let root = cache.get_block(CATALOG_ROOT)?;
    cache.block(root)?.check_row(&root_row.to_fields())?;

    let address = cache.allocate_extent(false, 1, ExtentKind::Table, &catalog_header())?;
    let root_row = RootRow { address, ..root_row };
    let root = cache.get_block(CATALOG_ROOT)?;
    cache.block_mut(root)?.append_row(&root_row.to_fields())?;

    info!("Catalog {} extended with block {}", catalog_table, address);
    Ok(address)
}

/// One past the largest object id recorded in any catalog.
pub fn next_object_id(cache: &mut CacheManager) -> StorageResult<i32> {
    let mut next = ID_START_VALUE;
    for catalog in catalog_names(cache)? {
        for row in catalog_rows(cache, &catalog)? {
            next = next.max(row.obj_id + 1);
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::{FieldValue, DATA_SIZE};
    use crate::storage::disk::FileBlockStore;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn create_test_cache(blocks: usize, capacity: usize) -> Result<(TempDir, CacheManager)> {
        let dir = tempdir()?;
        let store = FileBlockStore::create(&dir.path().join("test.db"), blocks)?;
        let cache = CacheManager::init(Box::new(store), capacity)?;
        Ok((dir, cache))
    }

    fn row(obj_id: i32, name: &str, start: u32, end: u32) -> CatalogRow {
        CatalogRow {
            obj_id,
            name: name.to_string(),
            start_address: BlockAddress(start),
            end_address: BlockAddress(end),
        }
    }

    #[test]
    fn test_bootstrap_layout() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(16, 8)?;
        bootstrap(&mut cache)?;

        let roots = root_rows(&mut cache)?;
        assert_eq!(
            roots,
            vec![
                RootRow {
                    name: RELATION_CATALOG.to_string(),
                    address: BlockAddress(1)
                },
                RootRow {
                    name: INDEX_CATALOG.to_string(),
                    address: BlockAddress(2)
                },
            ]
        );
        assert_eq!(catalog_address(&mut cache, INDEX_CATALOG)?, BlockAddress(2));
        assert!(catalog_rows(&mut cache, RELATION_CATALOG)?.is_empty());
        assert_eq!(cache.stats().dirty, 0);

        Ok(())
    }

    #[test]
    fn test_bootstrap_twice_fails() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(16, 8)?;
        bootstrap(&mut cache)?;
        assert!(matches!(
            bootstrap(&mut cache),
            Err(StorageError::AlreadyFormatted)
        ));
        Ok(())
    }

    #[test]
    fn test_bootstrap_needs_three_blocks() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(2, 2)?;
        assert!(matches!(
            bootstrap(&mut cache),
            Err(StorageError::AllocationFailure { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_insert_and_scan_rows() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(16, 8)?;
        bootstrap(&mut cache)?;

        insert_row(&mut cache, RELATION_CATALOG, &row(100, "students", 3, 4))?;
        insert_row(&mut cache, RELATION_CATALOG, &row(101, "courses", 5, 6))?;
        insert_row(&mut cache, INDEX_CATALOG, &row(102, "students_idx", 7, 7))?;

        let rows = catalog_rows(&mut cache, RELATION_CATALOG)?;
        assert_eq!(rows, vec![row(100, "students", 3, 4), row(101, "courses", 5, 6)]);
        assert_eq!(next_object_id(&mut cache)?, 103);

        Ok(())
    }

    #[test]
    fn test_next_object_id_starts_at_base() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(8, 8)?;
        bootstrap(&mut cache)?;
        assert_eq!(next_object_id(&mut cache)?, ID_START_VALUE);
        Ok(())
    }

    #[test]
    fn test_unknown_catalog() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(8, 8)?;
        bootstrap(&mut cache)?;
        assert!(matches!(
            catalog_address(&mut cache, "AK_missing"),
            Err(StorageError::CatalogCorruption { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_create_extra_catalog() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(8, 8)?;
        bootstrap(&mut cache)?;

        let address = create_catalog(&mut cache, "AK_transaction")?;
        assert_eq!(address, BlockAddress(3));
        assert_eq!(catalog_address(&mut cache, "AK_transaction")?, address);
        assert!(matches!(
            create_catalog(&mut cache, "AK_transaction"),
            Err(StorageError::DuplicateCatalog(_))
        ));

        Ok(())
    }

    #[test]
    fn test_catalog_grows_past_one_block() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(16, 8)?;
        bootstrap(&mut cache)?;

        // 500 tuple dict entries hold 125 four-field rows per block.
        for i in 0..130 {
            let obj_id = ID_START_VALUE + i;
            insert_row(&mut cache, RELATION_CATALOG, &row(obj_id, "t", 3, 3))?;
        }

        let blocks = catalog_blocks(&mut cache, RELATION_CATALOG)?;
        assert_eq!(blocks, vec![BlockAddress(1), BlockAddress(3)]);
        assert_eq!(catalog_address(&mut cache, RELATION_CATALOG)?, BlockAddress(1));
        assert_eq!(
            catalog_names(&mut cache)?,
            vec![RELATION_CATALOG.to_string(), INDEX_CATALOG.to_string()]
        );

        let rows = catalog_rows(&mut cache, RELATION_CATALOG)?;
        assert_eq!(rows.len(), 130);
        assert_eq!(rows[129].obj_id, ID_START_VALUE + 129);
        assert_eq!(next_object_id(&mut cache)?, ID_START_VALUE + 130);

        // Other catalogs are unaffected.
        assert!(catalog_rows(&mut cache, INDEX_CATALOG)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_oversized_row_allocates_nothing() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(16, 8)?;
        bootstrap(&mut cache)?;

        let huge = row(ID_START_VALUE, &"x".repeat(DATA_SIZE), 3, 3);
        assert!(matches!(
            insert_row(&mut cache, RELATION_CATALOG, &huge),
            Err(StorageError::BlockFull { .. })
        ));
        assert_eq!(catalog_blocks(&mut cache, RELATION_CATALOG)?.len(), 1);
        assert!(matches!(
            insert_row(&mut cache, RELATION_CATALOG, &row(100, "", 3, 3)),
            Err(StorageError::Codec(_))
        ));

        // Block 3 is still free and goes to the next catalog.
        assert_eq!(create_catalog(&mut cache, "AK_temp")?, BlockAddress(3));

        Ok(())
    }

    #[test]
    fn test_truncated_row_is_corruption() -> Result<()> {
        let (_dir, mut cache) = create_test_cache(8, 8)?;
        bootstrap(&mut cache)?;

        let handle = cache.get_block(BlockAddress(1))?;
        cache
            .block_mut(handle)?
            .append_row(&[FieldValue::Int(100), FieldValue::Varchar("half".to_string())])?;

        assert!(matches!(
            catalog_rows(&mut cache, RELATION_CATALOG),
            Err(StorageError::CatalogCorruption { .. })
        ));
        Ok(())
    }
}
