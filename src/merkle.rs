//! Transaction merkle root

use crate::crypto::{calculate_tx_id, sha256d};
use crate::types::{Hash, Transaction};

/// Merkle root of a transaction list plus whether the tree was mutated
///
/// A tree is "mutated" when two sibling hashes at some level are equal
/// (CVE-2012-2459): such a list has the same root as a different list with a
/// duplicated tail, so a block carrying it must be rejected even though the
/// root matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleRoot {
    pub root: Hash,
    pub mutated: bool,
}

pub fn calculate_merkle_root(transactions: &[Transaction]) -> MerkleRoot {
    let ids: Vec<Hash> = transactions.iter().map(calculate_tx_id).collect();
    merkle_root_from_ids(ids)
}

/// Build the tree bottom-up; an odd level duplicates its last hash.
/// An empty list has the all-zero root.
pub fn merkle_root_from_ids(mut hashes: Vec<Hash>) -> MerkleRoot {
    if hashes.is_empty() {
        return MerkleRoot {
            root: [0; 32],
            mutated: false,
        };
    }

    let mut mutated = false;
    while hashes.len() > 1 {
        for pair in hashes.chunks_exact(2) {
            if pair[0] == pair[1] {
                mutated = true;
            }
        }

        if hashes.len() % 2 == 1 {
            let last = hashes[hashes.len() - 1];
            hashes.push(last);
        }

        hashes = hashes
            .chunks_exact(2)
            .map(|pair| {
                let mut combined = [0u8; 64];
                combined[..32].copy_from_slice(&pair[0]);
                combined[32..].copy_from_slice(&pair[1]);
                sha256d(&combined)
            })
            .collect();
    }

    MerkleRoot {
        root: hashes[0],
        mutated,
    }
}
