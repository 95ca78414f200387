//! Fixed-size disk block and its on-disk layout.
//!
//! A block is laid out as (all integers little-endian `i32`):
//!
//! ```text
//! | address | kind | free_space | last_tuple_dict_id |      16 bytes
//! | header: MAX_ATTRIBUTES x { type, name[MAX_ATT_NAME] } |
//! | tuple dict: DATA_BLOCK_SIZE x { type, address, size } |
//! | payload: DATA_SIZE bytes                             |
//! ```
//!
//! Field values live in the payload; the tuple dictionary records where each
//! one starts, how long it is and what type it has. Entries are densely packed
//! from index 0 and the first free entry ends the used part of the dictionary.

use crate::storage::error::{StorageError, StorageResult};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Number of attribute descriptors in a block header.
pub const MAX_ATTRIBUTES: usize = 10;
/// Bytes reserved for one attribute name, zero padded.
pub const MAX_ATT_NAME: usize = 32;
/// Number of tuple dictionary entries per block.
pub const DATA_BLOCK_SIZE: usize = 500;
/// Average payload bytes budgeted per tuple dictionary entry.
pub const DATA_ENTRY_SIZE: usize = 10;
/// Payload bytes per block.
pub const DATA_SIZE: usize = DATA_BLOCK_SIZE * DATA_ENTRY_SIZE;

/// Marks an unused tuple dictionary entry.
pub const FREE_INT: i32 = -10;

pub const TYPE_INT: i32 = 1;
pub const TYPE_VARCHAR: i32 = 4;

const BLOCK_HEADER_SIZE: usize = 16;
const ATTRIBUTE_SIZE: usize = 4 + MAX_ATT_NAME;
const TUPLE_DICT_ENTRY_SIZE: usize = 12;

/// Size of an encoded block on disk.
pub const BLOCK_SIZE: usize = BLOCK_HEADER_SIZE
    + MAX_ATTRIBUTES * ATTRIBUTE_SIZE
    + DATA_BLOCK_SIZE * TUPLE_DICT_ENTRY_SIZE
    + DATA_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockAddress(pub u32);

impl BlockAddress {
    pub fn offset(self, blocks: u32) -> Self {
        BlockAddress(self.0 + blocks)
    }

    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Free,
    Normal,
}

impl BlockKind {
    fn to_raw(self) -> i32 {
        match self {
            BlockKind::Free => -1,
            BlockKind::Normal => 0,
        }
    }

    fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(BlockKind::Free),
            0 => Some(BlockKind::Normal),
            _ => None,
        }
    }
}

/// Column descriptor stored in a block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeHeader {
    pub type_tag: i32,
    pub name: String,
}

impl AttributeHeader {
    pub fn new(name: &str, type_tag: i32) -> Self {
        Self {
            type_tag,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleDictEntry {
    pub type_tag: i32,
    pub address: i32,
    pub size: i32,
}

impl TupleDictEntry {
    pub const FREE: TupleDictEntry = TupleDictEntry {
        type_tag: FREE_INT,
        address: FREE_INT,
        size: FREE_INT,
    };

    pub fn is_free(&self) -> bool {
        self.type_tag == FREE_INT || self.size == 0
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i32),
    Varchar(String),
    Raw { type_tag: i32, bytes: Vec<u8> },
}

impl FieldValue {
    pub fn type_tag(&self) -> i32 {
        match self {
            FieldValue::Int(_) => TYPE_INT,
            FieldValue::Varchar(_) => TYPE_VARCHAR,
            FieldValue::Raw { type_tag, .. } => *type_tag,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            FieldValue::Int(_) => 4,
            FieldValue::Varchar(s) => s.len(),
            FieldValue::Raw { bytes, .. } => bytes.len(),
        }
    }

    fn write_to(&self, out: &mut [u8]) {
        match self {
            FieldValue::Int(v) => LittleEndian::write_i32(out, *v),
            FieldValue::Varchar(s) => out.copy_from_slice(s.as_bytes()),
            FieldValue::Raw { bytes, .. } => out.copy_from_slice(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub address: BlockAddress,
    pub kind: BlockKind,
    /// Payload bytes in use; the next field is written at this offset.
    pub free_space: usize,
    /// Number of used tuple dictionary entries.
    pub last_tuple_dict_id: usize,
    header: Vec<AttributeHeader>,
    tuple_dict: Vec<TupleDictEntry>,
    data: Vec<u8>,
}

impl Block {
    /// An unallocated block.
    pub fn new(address: BlockAddress) -> Self {
        Self {
            address,
            kind: BlockKind::Free,
            free_space: 0,
            last_tuple_dict_id: 0,
            header: Vec::new(),
            tuple_dict: vec![TupleDictEntry::FREE; DATA_BLOCK_SIZE],
            data: vec![0u8; DATA_SIZE],
        }
    }

    /// An empty block that belongs to an extent and carries `header`.
    pub fn formatted(address: BlockAddress, header: &[AttributeHeader]) -> StorageResult<Self> {
        let mut block = Self::new(address);
        block.kind = BlockKind::Normal;
        block.set_header(header)?;
        Ok(block)
    }

    pub fn header(&self) -> &[AttributeHeader] {
        &self.header
    }

    pub fn set_header(&mut self, header: &[AttributeHeader]) -> StorageResult<()> {
        if header.len() > MAX_ATTRIBUTES {
            return Err(StorageError::Codec(format!(
                "header has {} attributes, at most {} fit in a block",
                header.len(),
                MAX_ATTRIBUTES
            )));
        }
        if let Some(attr) = header
            .iter()
            .find(|a| a.name.is_empty() || a.name.len() >= MAX_ATT_NAME)
        {
            return Err(StorageError::Codec(format!(
                "attribute name '{}' must be 1..{} bytes",
                attr.name, MAX_ATT_NAME
            )));
        }
        self.header = header.to_vec();
        Ok(())
    }

    pub fn tuple_dict(&self) -> &[TupleDictEntry] {
        &self.tuple_dict
    }

    pub fn entry(&self, index: usize) -> Option<&TupleDictEntry> {
        self.tuple_dict.get(index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn available_space(&self) -> usize {
        DATA_SIZE.saturating_sub(self.free_space)
    }

    /// Decodes the field at tuple dictionary `index`, validating its placement.
    pub fn field(&self, index: usize) -> StorageResult<FieldValue> {
        let entry = self
            .tuple_dict
            .get(index)
            .ok_or_else(|| self.corruption(format!("tuple dict index {} out of range", index)))?;
        if entry.type_tag == FREE_INT {
            return Err(self.corruption(format!("tuple dict entry {} is free", index)));
        }
        if entry.address < 0 || entry.size < 0 {
            return Err(self.corruption(format!(
                "tuple dict entry {} has offset {} and size {}",
                index, entry.address, entry.size
            )));
        }

        let start = entry.address as usize;
        let end = start + entry.size as usize;
        if end > DATA_SIZE {
            return Err(self.corruption(format!(
                "tuple dict entry {} spans {}..{} past the payload",
                index, start, end
            )));
        }
        let bytes = &self.data[start..end];

        match entry.type_tag {
            TYPE_INT => {
                if bytes.len() != 4 {
                    return Err(self.corruption(format!(
                        "integer field {} has size {}",
                        index,
                        bytes.len()
                    )));
                }
                Ok(FieldValue::Int(LittleEndian::read_i32(bytes)))
            }
            TYPE_VARCHAR => String::from_utf8(bytes.to_vec())
                .map(FieldValue::Varchar)
                .map_err(|_| self.corruption(format!("varchar field {} is not UTF-8", index))),
            type_tag => Ok(FieldValue::Raw {
                type_tag,
                bytes: bytes.to_vec(),
            }),
        }
    }

    pub fn int_field(&self, index: usize) -> StorageResult<i32> {
        match self.field(index)? {
            FieldValue::Int(v) => Ok(v),
            other => Err(self.corruption(format!(
                "field {} has type {}, expected integer",
                index,
                other.type_tag()
            ))),
        }
    }

    pub fn varchar_field(&self, index: usize) -> StorageResult<String> {
        match self.field(index)? {
            FieldValue::Varchar(s) => Ok(s),
            other => Err(self.corruption(format!(
                "field {} has type {}, expected varchar",
                index,
                other.type_tag()
            ))),
        }
    }

    /// Fails the way [`append_row`](Self::append_row) would, without changing
    /// the block.
    pub fn check_row(&self, values: &[FieldValue]) -> StorageResult<()> {
        if values.iter().any(|v| v.encoded_len() == 0) {
            return Err(StorageError::Codec(
                "zero-length fields cannot be stored".to_string(),
            ));
        }
        let required: usize = values.iter().map(FieldValue::encoded_len).sum();
        let available = self.available_space();
        if required > available || self.last_tuple_dict_id + values.len() > DATA_BLOCK_SIZE {
            return Err(StorageError::BlockFull {
                address: self.address,
                required,
                available,
            });
        }
        Ok(())
    }

    /// Appends all `values` or none of them.
    pub fn append_row(&mut self, values: &[FieldValue]) -> StorageResult<()> {
        self.check_row(values)?;

        for value in values {
            let len = value.encoded_len();
            let start = self.free_space;
            value.write_to(&mut self.data[start..start + len]);
            self.tuple_dict[self.last_tuple_dict_id] = TupleDictEntry {
                type_tag: value.type_tag(),
                address: start as i32,
                size: len as i32,
            };
            self.last_tuple_dict_id += 1;
            self.free_space += len;
        }
        Ok(())
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(BLOCK_SIZE);
        buf.put_i32_le(self.address.0 as i32);
        buf.put_i32_le(self.kind.to_raw());
        buf.put_i32_le(self.free_space as i32);
        buf.put_i32_le(self.last_tuple_dict_id as i32);

        for slot in 0..MAX_ATTRIBUTES {
            match self.header.get(slot) {
                Some(attr) => {
                    buf.put_i32_le(attr.type_tag);
                    buf.put_slice(attr.name.as_bytes());
                    buf.put_bytes(0, MAX_ATT_NAME - attr.name.len());
                }
                None => {
                    buf.put_i32_le(0);
                    buf.put_bytes(0, MAX_ATT_NAME);
                }
            }
        }

        for entry in &self.tuple_dict {
            buf.put_i32_le(entry.type_tag);
            buf.put_i32_le(entry.address);
            buf.put_i32_le(entry.size);
        }

        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn decode(raw: &[u8]) -> StorageResult<Self> {
        if raw.len() != BLOCK_SIZE {
            return Err(StorageError::InvalidBlockSize {
                expected: BLOCK_SIZE,
                actual: raw.len(),
            });
        }
        let mut buf = raw;

        let raw_address = buf.get_i32_le();
        if raw_address < 0 {
            return Err(StorageError::Codec(format!(
                "negative block address {}",
                raw_address
            )));
        }
        let address = BlockAddress(raw_address as u32);
        let corrupt = |reason: String| StorageError::CatalogCorruption { address, reason };

        let raw_kind = buf.get_i32_le();
        let kind = BlockKind::from_raw(raw_kind)
            .ok_or_else(|| corrupt(format!("unknown block kind {}", raw_kind)))?;
        let free_space = buf.get_i32_le();
        let last_tuple_dict_id = buf.get_i32_le();
        if free_space < 0 || free_space as usize > DATA_SIZE {
            return Err(corrupt(format!("free space counter {}", free_space)));
        }
        if last_tuple_dict_id < 0 || last_tuple_dict_id as usize > DATA_BLOCK_SIZE {
            return Err(corrupt(format!("last tuple dict id {}", last_tuple_dict_id)));
        }

        let mut header = Vec::new();
        let mut name = [0u8; MAX_ATT_NAME];
        for _ in 0..MAX_ATTRIBUTES {
            let type_tag = buf.get_i32_le();
            buf.copy_to_slice(&mut name);
            let len = name.iter().position(|&b| b == 0).unwrap_or(MAX_ATT_NAME);
            if len == 0 {
                continue;
            }
            let name = String::from_utf8(name[..len].to_vec())
                .map_err(|_| corrupt("attribute name is not UTF-8".to_string()))?;
            header.push(AttributeHeader { type_tag, name });
        }

        let mut tuple_dict = Vec::with_capacity(DATA_BLOCK_SIZE);
        for _ in 0..DATA_BLOCK_SIZE {
            tuple_dict.push(TupleDictEntry {
                type_tag: buf.get_i32_le(),
                address: buf.get_i32_le(),
                size: buf.get_i32_le(),
            });
        }

        let mut data = vec![0u8; DATA_SIZE];
        buf.copy_to_slice(&mut data);

        Ok(Self {
            address,
            kind,
            free_space: free_space as usize,
            last_tuple_dict_id: last_tuple_dict_id as usize,
            header,
            tuple_dict,
            data,
        })
    }

    fn corruption(&self, reason: String) -> StorageError {
        StorageError::CatalogCorruption {
            address: self.address,
            reason,
        }
    }
}
