//! In-process storage engine

use super::{Column, KeyValueStore, StorageError, WriteBatch, WriteOp};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Ordered in-memory store; a batch is applied under one write lock, so it is atomic
#[derive(Debug, Default)]
pub struct MemoryStore {
    columns: RwLock<HashMap<Column, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in `column`
    pub fn len(&self, column: Column) -> usize {
        self.columns
            .read()
            .map(|columns| columns.get(&column).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Copy of every column, for byte-level comparisons in tests and audits
    pub fn dump(&self) -> Result<BTreeMap<Column, Table>, StorageError> {
        let columns = self.columns.read().map_err(|_| poisoned())?;
        Ok(columns.iter().map(|(c, t)| (*c, t.clone())).collect())
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("memory store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let columns = self.columns.read().map_err(|_| poisoned())?;
        Ok(columns.get(&column).and_then(|t| t.get(key).cloned()))
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut columns = self.columns.write().map_err(|_| poisoned())?;
        columns
            .entry(column)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StorageError> {
        let mut columns = self.columns.write().map_err(|_| poisoned())?;
        if let Some(table) = columns.get_mut(&column) {
            table.remove(key);
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let columns = self.columns.read().map_err(|_| poisoned())?;
        let Some(table) = columns.get(&column) else {
            return Ok(Vec::new());
        };
        Ok(table
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut columns = self.columns.write().map_err(|_| poisoned())?;
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { column, key, value } => {
                    columns.entry(column).or_default().insert(key, value);
                }
                WriteOp::Delete { column, key } => {
                    if let Some(table) = columns.get_mut(&column) {
                        table.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}
