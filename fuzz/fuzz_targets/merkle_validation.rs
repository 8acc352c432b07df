#![no_main]
use blvm_chainstate::merkle::merkle_root_from_ids;
use blvm_chainstate::types::Hash;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let ids: Vec<Hash> = data
        .chunks_exact(32)
        .map(|chunk| {
            let mut id = [0u8; 32];
            id.copy_from_slice(chunk);
            id
        })
        .collect();
    let base = merkle_root_from_ids(ids.clone());

    // Duplicating the tail of an odd list keeps the root but must be flagged
    if ids.len() > 1 && ids.len() % 2 == 1 {
        let mut padded = ids.clone();
        padded.push(ids[ids.len() - 1]);
        let mutated = merkle_root_from_ids(padded);
        assert_eq!(mutated.root, base.root);
        assert!(mutated.mutated);
    }
});
