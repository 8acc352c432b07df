#![no_main]
use blvm_chainstate::block::check_block_sanity;
use blvm_chainstate::chain::ChainSelector;
use blvm_chainstate::chain_params::ChainParams;
use blvm_chainstate::config::ChainConfig;
use blvm_chainstate::script::AcceptAllScripts;
use blvm_chainstate::serialization::block::deserialize_block;
use blvm_chainstate::storage::MemoryStore;
use blvm_chainstate::time::FixedClock;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let Ok(block) = deserialize_block(data) else {
        return;
    };
    let params = Arc::new(ChainParams::regtest());
    let sane = check_block_sanity(&block, &params).is_ok();

    // Submission must agree with the structural verdict and never panic
    let clock = Arc::new(FixedClock::new(u32::MAX as u64));
    let Ok(chain) = ChainSelector::open(
        Arc::clone(&params),
        ChainConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(AcceptAllScripts),
        clock,
    ) else {
        return;
    };
    let before = chain.snapshot();
    let result = chain.submit_block(block);
    if !sane {
        assert!(result.is_err());
        assert_eq!(chain.snapshot(), before);
    }
    assert!(chain.verify_utxo_set().is_ok());
});
