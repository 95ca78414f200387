//! Sizing and growth constants for the memory manager.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::extent::ExtentKind;

/// Number of cache slots.
pub const MAX_CACHE_MEMORY: usize = 255;
/// Number of redo log entries kept in memory.
pub const MAX_REDO_LOG_ENTRIES: usize = 20;
/// Number of cached query results.
pub const MAX_QUERY_RESULT_MEMORY: usize = 100;
/// Upper bound on extents reported for one segment.
pub const MAX_EXTENTS_IN_SEGMENT: usize = 200;

pub const EXTENT_GROWTH_TABLE: f32 = 0.5;
pub const EXTENT_GROWTH_INDEX: f32 = 0.2;
pub const EXTENT_GROWTH_TRANSACTION: f32 = 0.2;
pub const EXTENT_GROWTH_TEMP: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryConfig {
    pub cache_capacity: usize,
    pub redo_log_entries: usize,
    pub query_result_entries: usize,
    pub max_extents_in_segment: usize,
    pub growth_table: f32,
    pub growth_index: f32,
    pub growth_transaction: f32,
    pub growth_temp: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cache_capacity: MAX_CACHE_MEMORY,
            redo_log_entries: MAX_REDO_LOG_ENTRIES,
            query_result_entries: MAX_QUERY_RESULT_MEMORY,
            max_extents_in_segment: MAX_EXTENTS_IN_SEGMENT,
            growth_table: EXTENT_GROWTH_TABLE,
            growth_index: EXTENT_GROWTH_INDEX,
            growth_transaction: EXTENT_GROWTH_TRANSACTION,
            growth_temp: EXTENT_GROWTH_TEMP,
        }
    }
}

impl MemoryConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_redo_log_entries(mut self, entries: usize) -> Self {
        self.redo_log_entries = entries;
        self
    }

    pub fn with_query_result_entries(mut self, entries: usize) -> Self {
        self.query_result_entries = entries;
        self
    }

    pub fn with_max_extents_in_segment(mut self, extents: usize) -> Self {
        self.max_extents_in_segment = extents;
        self
    }

    pub fn with_growth_factor(mut self, kind: ExtentKind, factor: f32) -> Self {
        match kind {
            ExtentKind::Table => self.growth_table = factor,
            ExtentKind::Index => self.growth_index = factor,
            ExtentKind::Transaction => self.growth_transaction = factor,
            ExtentKind::Temp => self.growth_temp = factor,
        }
        self
    }

    /// Growth factor applied when a segment of `kind` gets a new extent.
    pub fn growth_factor(&self, kind: ExtentKind) -> f32 {
        match kind {
            ExtentKind::Table => self.growth_table,
            ExtentKind::Index => self.growth_index,
            ExtentKind::Transaction => self.growth_transaction,
            ExtentKind::Temp => self.growth_temp,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.cache_capacity == 0 {
            return Err(StorageError::InvalidConfig(
                "cache capacity must be at least one slot".to_string(),
            ));
        }
        if self.redo_log_entries == 0 || self.query_result_entries == 0 {
            return Err(StorageError::InvalidConfig(
                "redo log and query cache need at least one entry".to_string(),
            ));
        }
        if self.max_extents_in_segment == 0 {
            return Err(StorageError::InvalidConfig(
                "a segment must be allowed at least one extent".to_string(),
            ));
        }
        for kind in ExtentKind::ALL {
            let factor = self.growth_factor(kind);
            if !factor.is_finite() || factor < 0.0 {
                return Err(StorageError::InvalidConfig(format!(
                    "growth factor for {} must be a non-negative number, got {}",
                    kind, factor
                )));
            }
        }
        Ok(())
    }
}
