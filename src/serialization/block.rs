//! Block and header wire format

use super::transaction::{read_transaction, serialized_tx_size, write_transaction};
use super::varint::{varint_len, write_varint};
use super::Reader;
use crate::constants::BLOCK_HEADER_SIZE;
use crate::error::{ChainError, Result};
use crate::types::*;

/// Serialize a block header to its fixed 80-byte form
pub fn serialize_block_header(header: &BlockHeader) -> [u8; BLOCK_HEADER_SIZE] {
    let mut bytes = [0u8; BLOCK_HEADER_SIZE];
    bytes[0..4].copy_from_slice(&header.version.to_le_bytes());
    bytes[4..36].copy_from_slice(&header.prev_block_hash.0);
    bytes[36..68].copy_from_slice(&header.merkle_root);
    bytes[68..72].copy_from_slice(&header.timestamp.to_le_bytes());
    bytes[72..76].copy_from_slice(&header.bits.to_le_bytes());
    bytes[76..80].copy_from_slice(&header.nonce.to_le_bytes());
    bytes
}

pub fn deserialize_block_header(data: &[u8]) -> Result<BlockHeader> {
    if data.len() < BLOCK_HEADER_SIZE {
        return Err(ChainError::Serialization(
            format!("header needs {BLOCK_HEADER_SIZE} bytes, got {}", data.len()).into(),
        ));
    }
    read_header(&mut Reader::new(&data[..BLOCK_HEADER_SIZE]))
}

fn read_header(reader: &mut Reader<'_>) -> Result<BlockHeader> {
    Ok(BlockHeader {
        version: reader.i32_le()?,
        prev_block_hash: BlockHash(reader.array()?),
        merkle_root: reader.array()?,
        timestamp: reader.u32_le()?,
        bits: reader.u32_le()?,
        nonce: reader.u32_le()?,
    })
}

pub fn serialize_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(serialized_block_size(block));
    out.extend_from_slice(&serialize_block_header(&block.header));
    write_varint(&mut out, block.transactions.len() as u64);
    for tx in &block.transactions {
        write_transaction(&mut out, tx);
    }
    out
}

/// Encoded size, used for the block size limit
pub fn serialized_block_size(block: &Block) -> usize {
    BLOCK_HEADER_SIZE
        + varint_len(block.transactions.len() as u64)
        + block.transactions.iter().map(serialized_tx_size).sum::<usize>()
}

pub fn deserialize_block(data: &[u8]) -> Result<Block> {
    let mut reader = Reader::new(data);
    let header = read_header(&mut reader)?;
    // Smallest transaction: 4 + 1 + 1 + 4
    let tx_count = reader.count(10)?;
    let mut transactions = Vec::with_capacity(tx_count);
    for _ in 0..tx_count {
        transactions.push(read_transaction(&mut reader)?);
    }
    if !reader.is_empty() {
        return Err(ChainError::Serialization("trailing bytes after block".into()));
    }
    Ok(Block {
        header,
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: BlockHash([1; 32]),
            merkle_root: [2; 32],
            timestamp: 1_231_006_505,
            bits: 0x1d00ffff,
            nonce: 2_083_236_893,
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = serialize_block_header(&header());
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[72..76], &[0xff, 0xff, 0x00, 0x1d]);
        assert_eq!(deserialize_block_header(&bytes).unwrap(), header());
    }

    #[test]
    fn test_deserialize_block_header_insufficient_bytes() {
        assert!(deserialize_block_header(&[0u8; 79]).is_err());
    }

    #[test]
    fn test_block_size_matches_encoding() {
        let block = Block {
            header: header(),
            transactions: vec![Transaction {
                version: 1,
                inputs: vec![TransactionInput {
                    prevout: OutPoint::null(),
                    script_sig: vec![1, 2, 3],
                    sequence: u32::MAX,
                }],
                outputs: vec![TransactionOutput {
                    value: 50,
                    script_pubkey: vec![0x51],
                }],
                lock_time: 0,
            }],
        };
        let bytes = serialize_block(&block);
        assert_eq!(bytes.len(), serialized_block_size(&block));
        assert_eq!(deserialize_block(&bytes).unwrap(), block);
    }
}
