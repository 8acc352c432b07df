//! Fork choice and reorganization tests
//!
//! Every block at the regtest limit carries the same work, so branch length
//! decides the best chain.

mod common;

use blvm_chainstate::chain::SubmitOutcome;
use blvm_chainstate::crypto::calculate_tx_id;
use blvm_chainstate::error::{ChainError, RuleKind};
use blvm_chainstate::script::{ScriptContext, ScriptVerifier};
use blvm_chainstate::storage::Column;
use blvm_chainstate::types::*;
use blvm_chainstate::BlockStatus;
use common::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Heavier branch B = G->B1->B2->B3 replaces A = G->A1->A2
#[test]
fn test_reorg_to_heavier_branch() {
    let h = Harness::new(params_with_maturity(1));
    let g = h.genesis();
    let gcb = genesis_coinbase_outpoint(&h.params);

    let a_spend = spend(gcb, coins(49));
    let a1 = make_block(&g.header, 0, 0xa, vec![a_spend.clone()]);
    let a2 = make_block(&a1.header, 1, 0xa, vec![]);
    assert_eq!(h.chain.submit_block(a1.clone()).unwrap(), SubmitOutcome::MainChain(a1.block_hash()));
    assert_eq!(h.chain.submit_block(a2.clone()).unwrap(), SubmitOutcome::MainChain(a2.block_hash()));

    let events = h.chain.subscribe();

    // B spends the genesis coinbase differently
    let b_spend = spend(gcb, coins(48));
    let b1 = make_block(&g.header, 0, 0xb, vec![b_spend.clone()]);
    let b2 = make_block(&b1.header, 1, 0xb, vec![]);
    let b3 = make_block(&b2.header, 2, 0xb, vec![]);

    assert_eq!(h.chain.submit_block(b1.clone()).unwrap(), SubmitOutcome::SideChain(b1.block_hash()));
    // Equal work: first seen keeps the tip
    assert_eq!(h.chain.submit_block(b2.clone()).unwrap(), SubmitOutcome::SideChain(b2.block_hash()));
    assert_eq!(h.tip(), a2.block_hash());
    assert_eq!(h.chain.submit_block(b3.clone()).unwrap(), SubmitOutcome::MainChain(b3.block_hash()));

    assert_eq!(
        block_events(events.try_iter()),
        vec![
            ("disconnected", a2.block_hash()),
            ("disconnected", a1.block_hash()),
            ("connected", b1.block_hash()),
            ("connected", b2.block_hash()),
            ("connected", b3.block_hash()),
        ]
    );

    let snapshot = h.chain.snapshot();
    assert_eq!(snapshot.tip, b3.block_hash());
    assert_eq!(snapshot.height, 3);
    assert_eq!(
        h.chain.best_chain().unwrap(),
        vec![g.block_hash(), b1.block_hash(), b2.block_hash(), b3.block_hash()]
    );

    // Only G+B1+B2+B3 effects remain
    let expected: BTreeSet<OutPoint> = [
        first_output(&b1.transactions[0]),
        first_output(&b_spend),
        first_output(&b2.transactions[0]),
        first_output(&b3.transactions[0]),
    ]
    .into_iter()
    .collect();
    let actual: BTreeSet<OutPoint> = h.chain.utxo_entries().unwrap().into_keys().collect();
    assert_eq!(actual, expected);
    assert!(h.chain.utxo(&first_output(&a_spend)).unwrap().is_none());

    let a1_node = h.chain.block_node(&a1.block_hash()).unwrap();
    assert!(!a1_node.in_main_chain);
    assert_eq!(a1_node.status, BlockStatus::Valid);
    assert!(h.chain.block_node(&b1.block_hash()).unwrap().in_main_chain);
    h.chain.verify_utxo_set().unwrap();
}

/// A later equal-work competitor never displaces the tip
#[test]
fn test_equal_work_first_seen_wins() {
    let h = Harness::new(params_with_maturity(1));
    let g = h.genesis();
    let a1 = make_block(&g.header, 0, 0xa, vec![]);
    let b1 = make_block(&g.header, 0, 0xb, vec![]);

    h.chain.submit_block(a1.clone()).unwrap();
    assert_eq!(h.chain.submit_block(b1.clone()).unwrap(), SubmitOutcome::SideChain(b1.block_hash()));
    assert_eq!(h.tip(), a1.block_hash());

    let b1_node = h.chain.block_node(&b1.block_hash()).unwrap();
    assert_eq!(b1_node.status, BlockStatus::ValidHeader);
    assert_eq!(b1_node.cumulative_work, h.chain.snapshot().cumulative_work);
}

/// A -> B -> back to A restores A's UTXO state plus the new A blocks
#[test]
fn test_reorg_round_trip() {
    let h = Harness::new(params_with_maturity(1));
    let g = h.genesis();
    let gcb = genesis_coinbase_outpoint(&h.params);

    let a1 = make_block(&g.header, 0, 0xa, vec![spend(gcb, coins(45))]);
    let a2 = make_block(&a1.header, 1, 0xa, vec![]);
    h.chain.submit_block(a1.clone()).unwrap();
    h.chain.submit_block(a2.clone()).unwrap();
    let before = h.chain.utxo_entries().unwrap();

    for block in make_chain(&g.header, 0, 0xb, 3) {
        h.chain.submit_block(block).unwrap();
    }
    assert_eq!(h.chain.snapshot().height, 3);
    assert_ne!(h.chain.utxo_entries().unwrap(), before);

    let a3 = make_block(&a2.header, 2, 0xa, vec![]);
    let a4 = make_block(&a3.header, 3, 0xa, vec![]);
    assert_eq!(h.chain.submit_block(a3.clone()).unwrap(), SubmitOutcome::SideChain(a3.block_hash()));
    assert_eq!(h.chain.submit_block(a4.clone()).unwrap(), SubmitOutcome::MainChain(a4.block_hash()));

    let mut expected = before;
    for block in [&a3, &a4] {
        let outpoint = first_output(&block.transactions[0]);
        let entry = h.chain.utxo(&outpoint).unwrap().expect("coinbase output");
        expected.insert(outpoint, entry);
    }
    assert_eq!(h.chain.utxo_entries().unwrap(), expected);
    h.chain.verify_utxo_set().unwrap();
}

/// An invalid block deep in the heavier branch aborts the switch
#[test]
fn test_failed_reorg_keeps_tip() {
    let h = Harness::new(params_with_maturity(1));
    let g = h.genesis();
    let chain_a = make_chain(&g.header, 0, 0xa, 2);
    for block in &chain_a {
        h.chain.submit_block(block.clone()).unwrap();
    }
    let store_before = h.store.dump().unwrap();
    let utxo_before = h.chain.utxo_entries().unwrap();
    let events = h.chain.subscribe();

    let b1 = make_block(&g.header, 0, 0xb, vec![]);
    let missing = OutPoint::new([0xcd; 32], 0);
    let b2 = make_block(&b1.header, 1, 0xb, vec![spend(missing, 1)]);
    let b3 = make_block(&b2.header, 2, 0xb, vec![]);
    h.chain.submit_block(b1.clone()).unwrap();
    // Body is not connected on a side branch, so this is accepted for now
    assert_eq!(h.chain.submit_block(b2.clone()).unwrap(), SubmitOutcome::SideChain(b2.block_hash()));

    let err = h.chain.submit_block(b3.clone()).unwrap_err();
    assert_eq!(err.rule_kind(), Some(RuleKind::InputNotFound));

    assert_eq!(h.tip(), chain_a[1].block_hash());
    assert_eq!(h.chain.utxo_entries().unwrap(), utxo_before);
    assert_eq!(h.store.dump().unwrap()[&Column::Utxo], store_before[&Column::Utxo]);
    assert_eq!(events.try_iter().count(), 0);

    assert_eq!(h.chain.block_node(&b1.block_hash()).unwrap().status, BlockStatus::ValidHeader);
    assert_eq!(h.chain.block_node(&b2.block_hash()).unwrap().status, BlockStatus::Invalid);
    assert_eq!(h.chain.block_node(&b3.block_hash()).unwrap().status, BlockStatus::Invalid);

    let again = h.chain.submit_block(b3.clone()).unwrap_err();
    assert_eq!(again.rule_kind(), Some(RuleKind::PreviouslyRejected));
    let b4 = make_block(&b3.header, 3, 0xb, vec![]);
    let child = h.chain.submit_block(b4).unwrap_err();
    assert_eq!(child.rule_kind(), Some(RuleKind::InvalidAncestor));
    h.chain.verify_utxo_set().unwrap();
}

struct SwitchableVerifier(AtomicBool);

impl ScriptVerifier for SwitchableVerifier {
    fn verify(&self, _: &[u8], _: &[u8], _: &ScriptContext<'_>) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A block that was valid once but fails on reconnection is an internal fault
#[test]
fn test_revalidation_failure_is_reported_as_invariant_break() {
    let verifier = Arc::new(SwitchableVerifier(AtomicBool::new(true)));
    let h = Harness::with_verifier(params_with_maturity(1), verifier.clone());
    let g = h.genesis();
    let gcb = genesis_coinbase_outpoint(&h.params);

    let a1 = make_block(&g.header, 0, 0xa, vec![spend(gcb, coins(49))]);
    h.chain.submit_block(a1.clone()).unwrap();
    for block in make_chain(&g.header, 0, 0xb, 2) {
        h.chain.submit_block(block).unwrap();
    }
    let b_tip = h.tip();
    assert_ne!(b_tip, a1.block_hash());
    let utxo_before = h.chain.utxo_entries().unwrap();

    verifier.0.store(false, Ordering::SeqCst);
    let more_a = make_chain(&a1.header, 1, 0xa, 2);
    h.chain.submit_block(more_a[0].clone()).unwrap();
    let err = h.chain.submit_block(more_a[1].clone()).unwrap_err();
    match err {
        ChainError::ReorgInvariantBroken { hash, violation } => {
            assert_eq!(hash, a1.block_hash());
            assert_eq!(violation.kind, RuleKind::ScriptFailure);
        }
        other => panic!("expected invariant break, got {other:?}"),
    }
    assert_eq!(h.tip(), b_tip);
    assert_eq!(h.chain.utxo_entries().unwrap(), utxo_before);
    assert_eq!(h.chain.block_node(&a1.block_hash()).unwrap().status, BlockStatus::Invalid);
}

/// Connected block events carry the node as committed
#[test]
fn test_extend_tip_events() {
    let h = Harness::new(params_with_maturity(1));
    let events = h.chain.subscribe();
    let blocks = make_chain(&h.genesis().header, 0, 0xa, 3);
    for block in &blocks {
        h.chain.submit_block(block.clone()).unwrap();
    }
    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len(), 3);
    for (event, block) in received.iter().zip(&blocks) {
        match event {
            blvm_chainstate::ChainEvent::BlockConnected(node) => {
                assert_eq!(node.hash, block.block_hash());
                assert!(node.in_main_chain);
                assert_eq!(node.status, BlockStatus::Valid);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(calculate_tx_id(&blocks[0].transactions[0]), blocks[0].header.merkle_root);
}
