//! Storage collaborator contract
//!
//! The engine only needs an ordered key/value store with column families and
//! atomic batches. Every connect, disconnect or reorg is staged into one
//! [`WriteBatch`] and committed with a single [`KeyValueStore::write_batch`],
//! so a crash or backend failure never leaves a half-applied UTXO set.

use std::sync::Arc;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt record in {column}: {detail}")]
    Corrupt { column: &'static str, detail: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Column {
    /// Block hash -> block-index record (header, height, status)
    BlockIndex,
    /// Block hash -> serialized block
    BlockData,
    /// Block hash -> UTXO diff recorded when the block was connected
    BlockUndo,
    /// Outpoint -> UTXO entry
    Utxo,
    /// Singletons such as the best tip
    Meta,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::BlockIndex,
        Column::BlockData,
        Column::BlockUndo,
        Column::Utxo,
        Column::Meta,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::BlockIndex => "block_index",
            Column::BlockData => "block_data",
            Column::BlockUndo => "block_undo",
            Column::Utxo => "utxo",
            Column::Meta => "meta",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        column: Column,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        column: Column,
        key: Vec<u8>,
    },
}

/// Ordered set of writes applied all-or-nothing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            column,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, column: Column, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Delete {
            column,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StorageError>;
    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
    /// Apply every op or none of them
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.as_ref().get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.as_ref().put(column, key, value)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StorageError> {
        self.as_ref().delete(column, key)
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.as_ref().scan_prefix(column, prefix)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.as_ref().write_batch(batch)
    }
}
