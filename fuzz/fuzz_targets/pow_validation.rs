#![no_main]
use blvm_chainstate::chain_params::ChainParams;
use blvm_chainstate::pow::{block_work, compress_target, expand_target, target_from_bits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some(bytes) = data.get(..4) else {
        return;
    };
    let bits = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    let decoded = expand_target(bits);
    let valid = !decoded.negative && !decoded.overflow && !decoded.target.is_zero();
    if valid {
        // Compact form is lossy only once: a decoded target survives a round trip
        let again = expand_target(compress_target(&decoded.target));
        assert_eq!(again.target, decoded.target);
        assert!(block_work(bits) >= 1);
    } else {
        assert_eq!(block_work(bits), 0);
    }

    let limit = ChainParams::regtest().pow_limit();
    if let Ok(target) = target_from_bits(bits, &limit) {
        assert!(valid);
        assert!(target <= limit);
    }
});
