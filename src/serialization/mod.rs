//! Wire format serialization/deserialization
//!
//! Used for transaction ids, block hashes, the block size limit and the
//! stored block bodies. All integers are little-endian.

pub mod block;
pub mod transaction;
pub mod varint;

pub use block::{
    deserialize_block, deserialize_block_header, serialize_block, serialize_block_header,
    serialized_block_size,
};
pub use transaction::{deserialize_transaction, serialize_transaction, serialized_tx_size};
pub use varint::{decode_varint, encode_varint, VarIntError};

use crate::error::{ChainError, Result};

/// Forward-only cursor over an input buffer
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Reader { data, offset: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.offset
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                ChainError::Serialization(
                    format!("need {len} bytes at offset {}", self.offset).into(),
                )
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub(crate) fn varint(&mut self) -> Result<u64> {
        let (value, used) = decode_varint(&self.data[self.offset..])?;
        self.offset += used;
        Ok(value)
    }

    /// Length-prefixed byte string
    pub(crate) fn var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.varint()?;
        let len = usize::try_from(len)
            .map_err(|_| ChainError::Serialization("length overflows usize".into()))?;
        Ok(self.take(len)?.to_vec())
    }

    /// A collection count, bounded by the bytes left so a hostile prefix
    /// cannot request a huge allocation
    pub(crate) fn count(&mut self, min_item_size: usize) -> Result<usize> {
        let count = self.varint()?;
        let remaining = (self.data.len() - self.offset) as u64;
        if count.saturating_mul(min_item_size as u64) > remaining {
            return Err(ChainError::Serialization(
                format!("count {count} exceeds remaining {remaining} bytes").into(),
            ));
        }
        Ok(count as usize)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.offset == self.data.len()
    }
}
