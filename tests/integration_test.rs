use extentdb::catalog;
use extentdb::config::MemoryConfig;
use extentdb::memory::MemoryManager;
use extentdb::storage::block::{TYPE_INT, TYPE_VARCHAR};
use extentdb::storage::{
    AttributeHeader, BlockAddress, BlockStore, CacheManager, Extent, ExtentKind, FieldValue,
    FileBlockStore,
};
use tempfile::tempdir;

fn student_header() -> Vec<AttributeHeader> {
    vec![
        AttributeHeader::new("id", TYPE_INT),
        AttributeHeader::new("name", TYPE_VARCHAR),
    ]
}

#[test]
fn test_repeated_get_block_is_a_hit() {
    let dir = tempdir().unwrap();
    let store = FileBlockStore::create(&dir.path().join("test.db"), 16).unwrap();
    let mut cache = CacheManager::init(Box::new(store), 4).unwrap();

    let first = cache.get_block(BlockAddress(9)).unwrap();
    let content = cache.block(first).unwrap().clone();
    let second = cache.get_block(BlockAddress(9)).unwrap();

    assert_eq!(first.slot(), second.slot());
    assert_eq!(cache.block(second).unwrap(), &content);
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn test_evicted_dirty_block_reaches_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = FileBlockStore::create(&path, 16).unwrap();
    let mut cache = CacheManager::init(Box::new(store), 2).unwrap();

    // Slot 0 holds block 0, the oldest read, so it is the next victim.
    let handle = cache.get_block(BlockAddress(0)).unwrap();
    cache
        .block_mut(handle)
        .unwrap()
        .append_row(&[FieldValue::Int(42)])
        .unwrap();

    let mut observer = FileBlockStore::open(&path).unwrap();
    assert!(observer.read_block(BlockAddress(0)).unwrap().tuple_dict()[0].is_free());

    cache.get_block(BlockAddress(7)).unwrap();
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(cache.stats().write_backs, 1);

    let on_disk = observer.read_block(BlockAddress(0)).unwrap();
    assert_eq!(on_disk.int_field(0).unwrap(), 42);
}

#[test]
fn test_full_cache_evicts_exactly_one_slot() {
    let dir = tempdir().unwrap();
    let store = FileBlockStore::create(&dir.path().join("test.db"), 32).unwrap();
    let mut cache = CacheManager::init(Box::new(store), 8).unwrap();
    assert_eq!(cache.table().resident_count(), 8);

    let before: Vec<_> = cache.table().slots().iter().map(|s| s.address()).collect();
    cache.get_block(BlockAddress(20)).unwrap();
    let after: Vec<_> = cache.table().slots().iter().map(|s| s.address()).collect();

    let changed = before.iter().zip(&after).filter(|(a, b)| a != b).count();
    assert_eq!(changed, 1);
    assert_eq!(cache.table().resident_count(), 8);
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_victim_choice_is_deterministic() {
    let run = || {
        let dir = tempdir().unwrap();
        let store = FileBlockStore::create(&dir.path().join("test.db"), 32).unwrap();
        let mut cache = CacheManager::init(Box::new(store), 4).unwrap();
        let mut slots = Vec::new();
        for address in [10, 2, 11, 3, 12, 0, 13, 14] {
            slots.push(cache.get_block(BlockAddress(address)).unwrap().slot());
        }
        slots
    };

    let first = run();
    assert_eq!(first, run());
    // Block 10 takes slot 0, block 2 is a hit, block 11 takes slot 1.
    assert_eq!(&first[..3], &[0, 2, 1]);
}

#[test]
fn test_students_segment_grows_without_overlap() {
    let dir = tempdir().unwrap();
    let config = MemoryConfig::default().with_cache_capacity(16);
    let mut manager = MemoryManager::create(&dir.path().join("test.db"), 64, config).unwrap();

    let first = manager
        .grow_segment_with_header("students", ExtentKind::Table, &student_header())
        .unwrap();
    let extents = manager.resolve_table_addresses("students").unwrap();
    assert_eq!(
        extents.iter().copied().collect::<Vec<_>>(),
        vec![Extent::new(first, first.offset(1))]
    );

    let second = manager.grow_segment("students", ExtentKind::Table).unwrap();
    let extents = manager.resolve_table_addresses("students").unwrap();
    assert_eq!(extents.len(), 2);
    let (a, b) = (extents.iter().next().unwrap(), extents.iter().nth(1).unwrap());
    assert_eq!(b.from, second);
    assert!(!a.overlaps(b));
    // Old size 2, factor 0.5: end = start + 2 + 1.
    assert_eq!(b.to, second.offset(3));

    let handle = manager.get_block(second).unwrap();
    assert_eq!(manager.block(handle).unwrap().header(), student_header().as_slice());
}

#[test]
fn test_resolve_sees_new_extent_immediately() {
    let dir = tempdir().unwrap();
    let config = MemoryConfig::default().with_cache_capacity(4);
    let mut manager = MemoryManager::create(&dir.path().join("test.db"), 64, config).unwrap();

    for _ in 0..3 {
        let start = manager.grow_segment("courses_idx", ExtentKind::Index).unwrap();
        let extents = manager.resolve_index_addresses("courses_idx").unwrap();
        assert!(extents.contains(start));
    }
    assert!(manager.resolve_table_addresses("courses_idx").unwrap().is_empty());
}

#[test]
fn test_flushed_changes_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let config = MemoryConfig::default().with_cache_capacity(8);

    let start = {
        let mut manager = MemoryManager::create(&path, 32, config.clone()).unwrap();
        let start = manager
            .grow_segment_with_header("students", ExtentKind::Table, &student_header())
            .unwrap();
        let handle = manager.get_block(start).unwrap();
        manager
            .block_mut(handle)
            .unwrap()
            .append_row(&[FieldValue::Int(1), FieldValue::Varchar("Ana".to_string())])
            .unwrap();
        manager.flush_all();
        start
    };

    let mut manager = MemoryManager::open(&path, config).unwrap();
    assert_eq!(
        manager.resolve_table_addresses("students").unwrap().first(),
        Some(&Extent::new(start, start.offset(1)))
    );
    let handle = manager.get_block(start).unwrap();
    let block = manager.block(handle).unwrap();
    assert_eq!(block.int_field(0).unwrap(), 1);
    assert_eq!(block.varchar_field(1).unwrap(), "Ana");

    drop(manager);

    // The catalog row itself was written back, not just the data block.
    let store = FileBlockStore::open(&path).unwrap();
    let mut cache = CacheManager::init(Box::new(store), 4).unwrap();
    let rows = catalog::catalog_rows(&mut cache, catalog::RELATION_CATALOG).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "students");
}
