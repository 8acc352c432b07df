//! Blocks whose parent is not yet known
//!
//! Bounded by count and age. When full, the oldest orphan is evicted to make
//! room; orphans older than the TTL are expired whenever a new one arrives.

use crate::config::OrphanPoolConfig;
use crate::types::{Block, BlockHash};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

struct OrphanEntry {
    block: Block,
    received: u64,
}

pub struct OrphanPool {
    max_orphans: usize,
    ttl_secs: u64,
    orphans: HashMap<BlockHash, OrphanEntry>,
    /// Parent hash -> orphans waiting on it, in arrival order
    by_parent: HashMap<BlockHash, Vec<BlockHash>>,
    /// Arrival order; may hold hashes already removed, skipped lazily
    arrivals: VecDeque<BlockHash>,
}

impl OrphanPool {
    pub fn new(config: &OrphanPoolConfig) -> Self {
        Self {
            max_orphans: config.max_orphans,
            ttl_secs: config.orphan_ttl_secs,
            orphans: HashMap::new(),
            by_parent: HashMap::new(),
            arrivals: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.orphans.contains_key(hash)
    }

    /// Hold `block` until its parent arrives. Returns false if it was already
    /// held or the pool has no capacity at all.
    pub fn add(&mut self, block: Block, now: u64) -> bool {
        let hash = block.block_hash();
        if self.orphans.contains_key(&hash) {
            return false;
        }
        if self.max_orphans == 0 {
            warn!(%hash, "orphan pool disabled, dropping block");
            return false;
        }

        self.expire(now);
        while self.orphans.len() >= self.max_orphans {
            let Some(oldest) = self.oldest() else { break };
            warn!(evicted = %oldest, limit = self.max_orphans, "orphan pool full, evicting oldest");
            self.remove(&oldest);
        }

        let parent = block.header.prev_block_hash;
        debug!(%hash, %parent, "holding orphan block");
        self.by_parent.entry(parent).or_default().push(hash);
        self.arrivals.push_back(hash);
        self.orphans.insert(hash, OrphanEntry { block, received: now });
        true
    }

    /// Remove and return every orphan whose parent is `parent`, oldest first
    pub fn take_children(&mut self, parent: &BlockHash) -> Vec<Block> {
        let Some(children) = self.by_parent.remove(parent) else {
            return Vec::new();
        };
        let released: Vec<Block> = children
            .into_iter()
            .filter_map(|hash| self.orphans.remove(&hash).map(|e| e.block))
            .collect();
        let orphans = &self.orphans;
        self.arrivals.retain(|h| orphans.contains_key(h));
        released
    }

    /// Drop orphans received more than the TTL before `now`; returns how many
    pub fn expire(&mut self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.ttl_secs);
        let expired: Vec<BlockHash> = self
            .orphans
            .iter()
            .filter(|(_, e)| e.received < cutoff)
            .map(|(h, _)| *h)
            .collect();
        for hash in &expired {
            debug!(%hash, "orphan expired");
            self.remove(hash);
        }
        if !expired.is_empty() {
            let orphans = &self.orphans;
            self.arrivals.retain(|h| orphans.contains_key(h));
        }
        expired.len()
    }

    fn oldest(&mut self) -> Option<BlockHash> {
        while let Some(hash) = self.arrivals.front() {
            if self.orphans.contains_key(hash) {
                return Some(*hash);
            }
            self.arrivals.pop_front();
        }
        None
    }

    fn remove(&mut self, hash: &BlockHash) {
        let Some(entry) = self.orphans.remove(hash) else {
            return;
        };
        let parent = entry.block.header.prev_block_hash;
        if let Some(siblings) = self.by_parent.get_mut(&parent) {
            siblings.retain(|h| h != hash);
            if siblings.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockHeader;

    fn block(parent: u8, nonce: u32) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                prev_block_hash: BlockHash([parent; 32]),
                merkle_root: [0; 32],
                timestamp: 0,
                bits: 0x207fffff,
                nonce,
            },
            transactions: vec![],
        }
    }

    fn pool(max_orphans: usize, orphan_ttl_secs: u64) -> OrphanPool {
        OrphanPool::new(&OrphanPoolConfig {
            max_orphans,
            orphan_ttl_secs,
        })
    }

    #[test]
    fn test_children_in_arrival_order() {
        let mut pool = pool(10, 100);
        let (a, b, c) = (block(1, 1), block(1, 2), block(2, 3));
        assert!(pool.add(a.clone(), 0));
        assert!(pool.add(b.clone(), 1));
        assert!(pool.add(c.clone(), 2));
        assert!(!pool.add(a.clone(), 3));

        let children = pool.take_children(&BlockHash([1; 32]));
        assert_eq!(children, vec![a, b]);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&c.block_hash()));
        assert!(pool.take_children(&BlockHash([1; 32])).is_empty());
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut pool = pool(2, 1_000);
        let (a, b, c) = (block(1, 1), block(2, 2), block(3, 3));
        pool.add(a.clone(), 0);
        pool.add(b.clone(), 1);
        pool.add(c.clone(), 2);
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&a.block_hash()));
        assert!(pool.contains(&b.block_hash()));
        assert!(pool.take_children(&BlockHash([1; 32])).is_empty());
    }

    #[test]
    fn test_expiry() {
        let mut pool = pool(10, 60);
        let (a, b) = (block(1, 1), block(2, 2));
        pool.add(a.clone(), 0);
        pool.add(b.clone(), 50);
        assert_eq!(pool.expire(61), 1);
        assert!(!pool.contains(&a.block_hash()));
        assert!(pool.contains(&b.block_hash()));
    }

    #[test]
    fn test_zero_capacity() {
        let mut pool = pool(0, 60);
        assert!(!pool.add(block(1, 1), 0));
        assert!(pool.is_empty());
    }
}
