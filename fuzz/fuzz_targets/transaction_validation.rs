#![no_main]
use blvm_chainstate::chain_params::ChainParams;
use blvm_chainstate::serialization::transaction::deserialize_transaction;
use blvm_chainstate::transaction::{check_transaction, check_tx_inputs, is_coinbase};
use blvm_chainstate::utxo::UtxoEntry;
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

fuzz_target!(|data: &[u8]| {
    let Some((&amount_seed, rest)) = data.split_first() else {
        return;
    };
    let Ok(tx) = deserialize_transaction(rest) else {
        return;
    };
    if check_transaction(&tx).is_err() || is_coinbase(&tx) {
        return;
    }

    // Fund every input so the value rules are exercised
    let amount = i64::from(amount_seed) * 1_000_000_000;
    let funded: HashMap<_, _> = tx
        .inputs
        .iter()
        .map(|input| {
            let entry = UtxoEntry {
                amount,
                script_pubkey: vec![0x51],
                height: 0,
                is_coinbase: amount_seed % 2 == 0,
            };
            (input.prevout, entry)
        })
        .collect();

    let params = ChainParams::regtest();
    if let Ok(resolved) = check_tx_inputs(&tx, &funded, 1_000, &params) {
        assert!(resolved.fee >= 0);
        assert_eq!(resolved.spent.len(), tx.inputs.len());
    }
});
