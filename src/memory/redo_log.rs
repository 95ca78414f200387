//! In-memory redo log ring.

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// One logged command against a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedoLogEntry {
    pub table_name: String,
    pub command: String,
    pub attributes: String,
}

/// Fixed number of entries, overwritten oldest first once full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedoLog {
    entries: Vec<RedoLogEntry>,
    capacity: usize,
    /// Entries appended since creation, including overwritten ones.
    number: u64,
}

impl RedoLog {
    pub fn new(capacity: usize) -> StorageResult<Self> {
        if capacity == 0 {
            return Err(StorageError::InvalidConfig(
                "redo log needs at least one entry".to_string(),
            ));
        }
        Ok(Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            number: 0,
        })
    }

    pub fn append(&mut self, table_name: &str, command: &str, attributes: &str) {
        let entry = RedoLogEntry {
            table_name: table_name.to_string(),
            command: command.to_string(),
            attributes: attributes.to_string(),
        };
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            let slot = (self.number % self.capacity as u64) as usize;
            self.entries[slot] = entry;
        }
        self.number += 1;
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<&RedoLogEntry> {
        let start = if self.entries.len() < self.capacity {
            0
        } else {
            (self.number % self.capacity as u64) as usize
        };
        self.entries[start..]
            .iter()
            .chain(self.entries[..start].iter())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.number = 0;
    }

    pub fn snapshot(&self) -> StorageResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn restore(bytes: &[u8]) -> StorageResult<Self> {
        let log: Self = bincode::deserialize(bytes)?;
        if log.capacity == 0 || log.entries.len() > log.capacity {
            return Err(StorageError::Codec(format!(
                "redo log snapshot holds {} entries for capacity {}",
                log.entries.len(),
                log.capacity
            )));
        }
        Ok(log)
    }
}
