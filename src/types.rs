//! Core ledger types shared by every component of the chain engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Natural number type
pub type Natural = u64;

/// Integer type (amounts are signed so negative wire values can be rejected rather than wrapped)
pub type Integer = i64;

/// Block hash: newtype wrapper for type safety
///
/// Prevents mixing up block hashes with transaction ids and merkle roots.
/// Uses `#[repr(transparent)]` so it has the same layout as [`Hash`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash(pub Hash);

impl BlockHash {
    /// The all-zero hash used as the genesis block's previous hash
    pub const ZERO: BlockHash = BlockHash([0; 32]);

    #[inline]
    pub fn new(hash: Hash) -> Self {
        BlockHash(hash)
    }

    #[inline]
    pub fn as_hash(self) -> Hash {
        self.0
    }

    /// Hex in display order (byte-reversed, as block explorers print it)
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }
}

impl From<Hash> for BlockHash {
    #[inline]
    fn from(hash: Hash) -> Self {
        BlockHash(hash)
    }
}

impl From<BlockHash> for Hash {
    #[inline]
    fn from(hash: BlockHash) -> Self {
        hash.0
    }
}

impl std::ops::Deref for BlockHash {
    type Target = Hash;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

/// OutPoint: (transaction id, output index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// Index value carried by the coinbase's null prevout
    pub const NULL_INDEX: u32 = 0xffff_ffff;

    pub fn new(hash: Hash, index: u32) -> Self {
        OutPoint { hash, index }
    }

    /// The outpoint a coinbase input references
    pub fn null() -> Self {
        OutPoint {
            hash: [0; 32],
            index: Self::NULL_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == Self::NULL_INDEX && self.hash == [0; 32]
    }
}

/// Transaction input: referenced outpoint, unlocking script, sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

/// Transaction output: amount and locking script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Integer,
    pub script_pubkey: ByteString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

/// Block header. Immutable once constructed; the block hash commits to all six fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: BlockHash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Double-SHA256 of the 80-byte wire encoding
    pub fn block_hash(&self) -> BlockHash {
        BlockHash(crate::crypto::sha256d(
            &crate::serialization::serialize_block_header(self),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    #[inline]
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_display_is_reversed() {
        let mut raw = [0u8; 32];
        raw[0] = 0xab;
        raw[31] = 0x01;
        let hash = BlockHash(raw);
        let shown = hash.to_string();
        assert!(shown.starts_with("01"));
        assert!(shown.ends_with("ab"));
    }

    #[test]
    fn test_null_outpoint() {
        assert!(OutPoint::null().is_null());
        assert!(!OutPoint::new([0; 32], 0).is_null());
        assert!(!OutPoint::new([1; 32], OutPoint::NULL_INDEX).is_null());
    }

    #[test]
    fn test_header_hash_commits_to_nonce() {
        let header = BlockHeader {
            version: 1,
            prev_block_hash: BlockHash::ZERO,
            merkle_root: [7; 32],
            timestamp: 1_296_688_602,
            bits: 0x207fffff,
            nonce: 0,
        };
        let mut other = header.clone();
        other.nonce = 1;
        assert_ne!(header.block_hash(), other.block_hash());
        assert_eq!(header.block_hash(), header.clone().block_hash());
    }
}
