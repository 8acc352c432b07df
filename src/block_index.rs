//! Block index: every header the node has accepted, as a tree rooted at genesis
//!
//! Nodes live in a hash-keyed arena. A node names its parent by hash and
//! never owns it, so the structure cannot form cycles; children are found on
//! demand by scanning. Nodes are never removed, only re-flagged.

use crate::constants::MEDIAN_TIME_BLOCKS;
use crate::error::{ChainError, Result};
use crate::pow::block_work;
use crate::storage::{Column, KeyValueStore, StorageError, WriteBatch};
use crate::types::{BlockHash, BlockHeader, Natural};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Unvalidated,
    /// Header passed structural and contextual header checks; body not yet connected
    ValidHeader,
    /// Fully validated against the UTXO set at least once
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    pub hash: BlockHash,
    pub height: Natural,
    pub header: BlockHeader,
    pub parent: Option<BlockHash>,
    /// Sum of per-block work from genesis through this block
    pub cumulative_work: u128,
    pub status: BlockStatus,
    /// Whether the node is on the current best chain
    pub in_main_chain: bool,
}

/// What is persisted per node; work and chain membership are rebuilt on load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BlockRecord {
    header: BlockHeader,
    height: Natural,
    status: BlockStatus,
}

#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    nodes: HashMap<BlockHash, BlockNode>,
}

impl BlockIndex {
    /// An index holding only the genesis node, marked valid and on the main chain
    pub fn with_genesis(genesis: &BlockHeader) -> Self {
        let hash = genesis.block_hash();
        let node = BlockNode {
            hash,
            height: 0,
            header: genesis.clone(),
            parent: None,
            cumulative_work: block_work(genesis.bits),
            status: BlockStatus::Valid,
            in_main_chain: true,
        };
        let mut nodes = HashMap::new();
        nodes.insert(hash, node);
        BlockIndex { nodes }
    }

    /// The node `header` would become, without inserting it
    pub fn candidate(&self, header: &BlockHeader) -> Result<BlockNode> {
        let hash = header.block_hash();
        if self.nodes.contains_key(&hash) {
            return Err(ChainError::DuplicateHeader(hash));
        }
        let parent = self
            .nodes
            .get(&header.prev_block_hash)
            .ok_or(ChainError::UnknownParent(header.prev_block_hash))?;
        Ok(BlockNode {
            hash,
            height: parent.height + 1,
            header: header.clone(),
            parent: Some(parent.hash),
            cumulative_work: parent
                .cumulative_work
                .saturating_add(block_work(header.bits)),
            status: BlockStatus::Unvalidated,
            in_main_chain: false,
        })
    }

    pub fn insert(&mut self, header: &BlockHeader) -> Result<&BlockNode> {
        let node = self.candidate(header)?;
        Ok(self.insert_node(node))
    }

    pub(crate) fn insert_node(&mut self, node: BlockNode) -> &BlockNode {
        let hash = node.hash;
        self.nodes.entry(hash).or_insert(node)
    }

    pub fn lookup(&self, hash: &BlockHash) -> Option<&BlockNode> {
        self.nodes.get(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_status(&mut self, hash: &BlockHash, status: BlockStatus) -> Result<()> {
        let node = self
            .nodes
            .get_mut(hash)
            .ok_or(ChainError::UnknownBlock(*hash))?;
        node.status = status;
        Ok(())
    }

    pub(crate) fn set_in_main_chain(&mut self, hash: &BlockHash, in_main_chain: bool) -> Result<()> {
        let node = self
            .nodes
            .get_mut(hash)
            .ok_or(ChainError::UnknownBlock(*hash))?;
        node.in_main_chain = in_main_chain;
        Ok(())
    }

    /// Walk parents from `hash` to the ancestor at `height`
    pub fn ancestor_at(&self, hash: &BlockHash, height: Natural) -> Option<&BlockNode> {
        let mut node = self.nodes.get(hash)?;
        if height > node.height {
            return None;
        }
        while node.height > height {
            node = self.nodes.get(&node.parent?)?;
        }
        Some(node)
    }

    /// Fork point of two nodes: bring both to equal height, then walk together
    pub fn common_ancestor(&self, a: &BlockHash, b: &BlockHash) -> Result<&BlockNode> {
        let node_a = self.nodes.get(a).ok_or(ChainError::UnknownBlock(*a))?;
        let node_b = self.nodes.get(b).ok_or(ChainError::UnknownBlock(*b))?;
        let height = node_a.height.min(node_b.height);
        let missing = || ChainError::Corrupt("broken parent chain in block index".into());
        let mut x = self.ancestor_at(a, height).ok_or_else(missing)?;
        let mut y = self.ancestor_at(b, height).ok_or_else(missing)?;
        while x.hash != y.hash {
            x = x.parent.and_then(|p| self.nodes.get(&p)).ok_or_else(missing)?;
            y = y.parent.and_then(|p| self.nodes.get(&p)).ok_or_else(missing)?;
        }
        Ok(x)
    }

    /// Hashes from just above `ancestor` up to and including `descendant`, in forward order
    pub fn path_from(&self, ancestor: &BlockHash, descendant: &BlockHash) -> Result<Vec<BlockHash>> {
        let mut path = Vec::new();
        let mut cursor = *descendant;
        while cursor != *ancestor {
            let node = self
                .nodes
                .get(&cursor)
                .ok_or(ChainError::UnknownBlock(cursor))?;
            path.push(cursor);
            cursor = node.parent.ok_or_else(|| {
                ChainError::Corrupt(format!("{ancestor} is not an ancestor of {descendant}").into())
            })?;
        }
        path.reverse();
        Ok(path)
    }

    pub fn children_of(&self, hash: &BlockHash) -> Vec<BlockHash> {
        self.nodes
            .values()
            .filter(|n| n.parent.as_ref() == Some(hash))
            .map(|n| n.hash)
            .collect()
    }

    /// Median timestamp of the node and up to ten of its ancestors
    pub fn median_time_past(&self, hash: &BlockHash) -> Option<u32> {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIME_BLOCKS);
        let mut node = self.nodes.get(hash);
        while let Some(current) = node {
            timestamps.push(current.header.timestamp);
            if timestamps.len() == MEDIAN_TIME_BLOCKS {
                break;
            }
            node = current.parent.and_then(|p| self.nodes.get(&p));
        }
        if timestamps.is_empty() {
            return None;
        }
        timestamps.sort_unstable();
        Some(timestamps[timestamps.len() / 2])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockNode> {
        self.nodes.values()
    }

    /// Queue the node's record for persistence (the storage contract's `appendBlockMeta`)
    pub fn append_block_meta(node: &BlockNode, batch: &mut WriteBatch) -> Result<()> {
        let record = BlockRecord {
            header: node.header.clone(),
            height: node.height,
            status: node.status,
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| ChainError::Serialization(e.to_string().into()))?;
        batch.put(Column::BlockIndex, node.hash.0.to_vec(), bytes);
        Ok(())
    }

    /// Rebuild the index from persisted records
    ///
    /// Records are replayed in height order so every parent precedes its
    /// children. Chain membership is left unset; the caller marks the best
    /// chain once it knows the tip.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S, genesis: &BlockHeader) -> Result<Self> {
        let mut records = store
            .scan_prefix(Column::BlockIndex, &[])?
            .into_iter()
            .map(|(_, value)| {
                serde_json::from_slice::<BlockRecord>(&value).map_err(|e| {
                    ChainError::Storage(StorageError::Corrupt {
                        column: Column::BlockIndex.as_str(),
                        detail: e.to_string(),
                    })
                })
            })
            .collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.height);

        let mut index = BlockIndex::with_genesis(genesis);
        if let Some(g) = index.nodes.get_mut(&genesis.block_hash()) {
            g.in_main_chain = false;
        }
        for record in records {
            if record.height == 0 {
                if record.header != *genesis {
                    return Err(ChainError::Corrupt(
                        "stored genesis does not match chain parameters".into(),
                    ));
                }
                continue;
            }
            let mut node = index.candidate(&record.header)?;
            if node.height != record.height {
                return Err(ChainError::Corrupt(
                    format!("stored height {} for {} disagrees with its parent", record.height, node.hash)
                        .into(),
                ));
            }
            node.status = record.status;
            index.insert_node(node);
        }
        Ok(index)
    }
}
