//! Unspent output tracking
//!
//! ```text
//! ┌──────────────────┐
//! │  UtxoViewpoint   │  ← block- or reorg-sized overlay (additions, deletions)
//! │  + UtxoDiff      │    plus the undo journal of the block being applied
//! └────────┬─────────┘
//!          │ fallback
//! ┌────────▼─────────┐
//! │  UtxoSet<S>      │  ← authoritative, backed by the key/value store
//! └──────────────────┘
//! ```
//!
//! Viewpoints stack: a reorg stages its disconnects in one viewpoint over the
//! [`UtxoSet`] and validates each connected block in a child viewpoint over
//! that, merging the child only if the block is valid. Nothing reaches the
//! store until the whole operation is written as one batch.

use crate::serialization::Reader;
use crate::storage::{Column, KeyValueStore, StorageError, WriteBatch};
use crate::types::{Hash, Natural, OutPoint, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub amount: i64,
    pub script_pubkey: Vec<u8>,
    /// Height of the block that created the output
    pub height: Natural,
    pub is_coinbase: bool,
}

impl UtxoEntry {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 9 + self.script_pubkey.len() + 8 + 1);
        out.extend_from_slice(&self.amount.to_le_bytes());
        crate::serialization::varint::write_varint(&mut out, self.script_pubkey.len() as u64);
        out.extend_from_slice(&self.script_pubkey);
        out.extend_from_slice(&self.height.to_le_bytes());
        out.push(u8::from(self.is_coinbase));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let corrupt = |detail: String| StorageError::Corrupt {
            column: Column::Utxo.as_str(),
            detail,
        };
        let mut reader = Reader::new(bytes);
        let amount = reader.i64_le().map_err(|e| corrupt(e.to_string()))?;
        let script_pubkey = reader.var_bytes().map_err(|e| corrupt(e.to_string()))?;
        let height = u64::from_le_bytes(reader.array().map_err(|e| corrupt(e.to_string()))?);
        let flag = reader.array::<1>().map_err(|e| corrupt(e.to_string()))?[0];
        if !reader.is_empty() {
            return Err(corrupt("trailing bytes".to_string()));
        }
        Ok(UtxoEntry {
            amount,
            script_pubkey,
            height,
            is_coinbase: flag != 0,
        })
    }
}

pub fn outpoint_key(outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.extend_from_slice(&outpoint.hash);
    key.extend_from_slice(&outpoint.index.to_le_bytes());
    key
}

fn outpoint_from_key(key: &[u8]) -> Result<OutPoint, StorageError> {
    if key.len() != 36 {
        return Err(StorageError::Corrupt {
            column: Column::Utxo.as_str(),
            detail: format!("outpoint key of {} bytes", key.len()),
        });
    }
    let mut hash: Hash = [0; 32];
    hash.copy_from_slice(&key[..32]);
    let mut index = [0u8; 4];
    index.copy_from_slice(&key[32..]);
    Ok(OutPoint::new(hash, u32::from_le_bytes(index)))
}

/// Anything outpoints can be resolved against
pub trait UtxoLookup {
    fn lookup(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError>;
}

impl UtxoLookup for HashMap<OutPoint, UtxoEntry> {
    fn lookup(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError> {
        Ok(self.get(outpoint).cloned())
    }
}

impl UtxoLookup for BTreeMap<OutPoint, UtxoEntry> {
    fn lookup(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError> {
        Ok(self.get(outpoint).cloned())
    }
}

/// The authoritative UTXO set: exactly the unspent outputs of the best chain
pub struct UtxoSet<S> {
    store: S,
}

impl<S> UtxoSet<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> UtxoSet<S> {
    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError> {
        match self.store.get(Column::Utxo, &outpoint_key(outpoint))? {
            Some(bytes) => Ok(Some(UtxoEntry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, batch: &mut WriteBatch, outpoint: &OutPoint, entry: &UtxoEntry) {
        batch.put(Column::Utxo, outpoint_key(outpoint), entry.encode());
    }

    pub fn delete(&self, batch: &mut WriteBatch, outpoint: &OutPoint) {
        batch.delete(Column::Utxo, outpoint_key(outpoint));
    }

    /// Queue a viewpoint's net effect into `batch`
    pub fn stage(&self, batch: &mut WriteBatch, changes: &UtxoChanges) {
        for outpoint in &changes.deletions {
            self.delete(batch, outpoint);
        }
        for (outpoint, entry) in &changes.additions {
            self.put(batch, outpoint, entry);
        }
    }

    /// Full contents, ordered by outpoint
    pub fn entries(&self) -> Result<BTreeMap<OutPoint, UtxoEntry>, StorageError> {
        self.store
            .scan_prefix(Column::Utxo, &[])?
            .into_iter()
            .map(|(key, value)| Ok((outpoint_from_key(&key)?, UtxoEntry::decode(&value)?)))
            .collect()
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.store.scan_prefix(Column::Utxo, &[])?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl<S: KeyValueStore> UtxoLookup for UtxoSet<S> {
    fn lookup(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError> {
        self.get(outpoint)
    }
}

/// Reversible record of one block's effect on the UTXO set
///
/// Outputs created and spent inside the same block appear in neither list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoDiff {
    pub created: BTreeSet<OutPoint>,
    /// Entries removed, in spend order, with their contents so they can be restored
    pub spent: Vec<(OutPoint, UtxoEntry)>,
}

impl UtxoDiff {
    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(self).map_err(|e| StorageError::Backend(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt {
            column: Column::BlockUndo.as_str(),
            detail: e.to_string(),
        })
    }
}

/// Net effect of a viewpoint relative to its base
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoChanges {
    pub additions: HashMap<OutPoint, UtxoEntry>,
    pub deletions: HashSet<OutPoint>,
}

impl UtxoChanges {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }
}

/// Copy-on-write overlay used while validating or applying blocks
pub struct UtxoViewpoint<'a> {
    base: &'a dyn UtxoLookup,
    changes: UtxoChanges,
    journal: UtxoDiff,
}

impl<'a> UtxoViewpoint<'a> {
    pub fn new(base: &'a dyn UtxoLookup) -> Self {
        Self {
            base,
            changes: UtxoChanges::default(),
            journal: UtxoDiff::default(),
        }
    }

    /// Additions first, then deletions, then the base
    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError> {
        if let Some(entry) = self.changes.additions.get(outpoint) {
            return Ok(Some(entry.clone()));
        }
        if self.changes.deletions.contains(outpoint) {
            return Ok(None);
        }
        self.base.lookup(outpoint)
    }

    fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.changes.deletions.remove(&outpoint);
        self.changes.additions.insert(outpoint, entry);
    }

    fn remove(&mut self, outpoint: OutPoint) {
        self.changes.additions.remove(&outpoint);
        self.changes.deletions.insert(outpoint);
    }

    /// Add a new unspent output, recording it in the undo journal
    pub fn add_entry(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.journal.created.insert(outpoint);
        self.insert(outpoint, entry);
    }

    /// Add every output of `tx` as created at `height`
    pub fn add_transaction_outputs(&mut self, tx: &Transaction, txid: Hash, height: Natural) {
        let is_coinbase = crate::transaction::is_coinbase(tx);
        for (index, output) in tx.outputs.iter().enumerate() {
            self.add_entry(
                OutPoint::new(txid, index as u32),
                UtxoEntry {
                    amount: output.value,
                    script_pubkey: output.script_pubkey.clone(),
                    height,
                    is_coinbase,
                },
            );
        }
    }

    /// Remove an unspent output, returning it; `None` if it is not unspent here
    pub fn spend(&mut self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError> {
        let Some(entry) = self.get(outpoint)? else {
            return Ok(None);
        };
        if !self.journal.created.remove(outpoint) {
            self.journal.spent.push((*outpoint, entry.clone()));
        }
        self.remove(*outpoint);
        Ok(Some(entry))
    }

    /// Reverse a connected block's effect. Not journaled.
    pub fn undo(&mut self, diff: &UtxoDiff) {
        for outpoint in &diff.created {
            self.remove(*outpoint);
        }
        for (outpoint, entry) in diff.spent.iter().rev() {
            self.insert(*outpoint, entry.clone());
        }
    }

    /// Fold a child viewpoint's changes into this one. Not journaled.
    pub fn merge(&mut self, child: UtxoChanges) {
        for outpoint in child.deletions {
            self.remove(outpoint);
        }
        for (outpoint, entry) in child.additions {
            self.insert(outpoint, entry);
        }
    }

    pub fn changes(&self) -> &UtxoChanges {
        &self.changes
    }

    pub fn journal(&self) -> &UtxoDiff {
        &self.journal
    }

    pub fn into_parts(self) -> (UtxoChanges, UtxoDiff) {
        (self.changes, self.journal)
    }
}

impl UtxoLookup for UtxoViewpoint<'_> {
    fn lookup(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StorageError> {
        self.get(outpoint)
    }
}
