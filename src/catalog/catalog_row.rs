//! Row layouts of the system catalogs.

use crate::storage::block::{AttributeHeader, Block, BlockAddress, FieldValue, TYPE_INT, TYPE_VARCHAR};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::segment::Extent;

/// Fields per row in a segment catalog (`AK_relation`, `AK_index`, ...).
pub const CATALOG_ROW_FIELDS: usize = 4;
/// Fields per row in the catalog-of-catalogs.
pub const ROOT_ROW_FIELDS: usize = 2;

/// Header of the catalog-of-catalogs block.
pub fn root_header() -> Vec<AttributeHeader> {
    vec![
        AttributeHeader::new("name", TYPE_VARCHAR),
        AttributeHeader::new("address", TYPE_INT),
    ]
}

/// Header of a segment catalog block.
pub fn catalog_header() -> Vec<AttributeHeader> {
    vec![
        AttributeHeader::new("obj_id", TYPE_INT),
        AttributeHeader::new("name", TYPE_VARCHAR),
        AttributeHeader::new("start_address", TYPE_INT),
        AttributeHeader::new("end_address", TYPE_INT),
    ]
}

/// `(name, address)`: where a catalog table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRow {
    pub name: String,
    pub address: BlockAddress,
}

impl RootRow {
    pub(crate) fn to_fields(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Varchar(self.name.clone()),
            FieldValue::Int(self.address.0 as i32),
        ]
    }

    pub(crate) fn decode(block: &Block, index: usize) -> StorageResult<Self> {
        Ok(Self {
            name: block.varchar_field(index)?,
            address: decode_address(block, index + 1)?,
        })
    }
}

/// `(obj_id, name, start_address, end_address)`: one extent of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub obj_id: i32,
    pub name: String,
    pub start_address: BlockAddress,
    pub end_address: BlockAddress,
}

impl CatalogRow {
    pub fn extent(&self) -> Extent {
        Extent::new(self.start_address, self.end_address)
    }

    pub(crate) fn to_fields(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Int(self.obj_id),
            FieldValue::Varchar(self.name.clone()),
            FieldValue::Int(self.start_address.0 as i32),
            FieldValue::Int(self.end_address.0 as i32),
        ]
    }

    pub(crate) fn decode(block: &Block, index: usize) -> StorageResult<Self> {
        let row = Self {
            obj_id: block.int_field(index)?,
            name: block.varchar_field(index + 1)?,
            start_address: decode_address(block, index + 2)?,
            end_address: decode_address(block, index + 3)?,
        };
        if row.end_address < row.start_address {
            return Err(StorageError::CatalogCorruption {
                address: block.address,
                reason: format!(
                    "extent of '{}' ends at {} before it starts at {}",
                    row.name, row.end_address, row.start_address
                ),
            });
        }
        Ok(row)
    }
}

fn decode_address(block: &Block, index: usize) -> StorageResult<BlockAddress> {
    let raw = block.int_field(index)?;
    if raw < 0 {
        return Err(StorageError::CatalogCorruption {
            address: block.address,
            reason: format!("field {} holds negative block address {}", index, raw),
        });
    }
    Ok(BlockAddress(raw as u32))
}
