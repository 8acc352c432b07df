//! Hashing primitives

use crate::serialization::serialize_transaction;
use crate::types::{Hash, Transaction};
use sha2::{Digest, Sha256};

/// Double SHA256, the agreed hash function for block ids, transaction ids and merkle nodes
#[inline]
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Transaction id: sha256d of the wire encoding
pub fn calculate_tx_id(tx: &Transaction) -> Hash {
    sha256d(&serialize_transaction(tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256d_empty() {
        // Well-known double-SHA256 of the empty string
        assert_eq!(
            hex::encode(sha256d(&[])),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
