//! Concurrent submission from independent producers

mod common;

use blvm_chainstate::chain::SubmitOutcome;
use blvm_chainstate::notify::ChainEvent;
use common::*;
use std::sync::{Arc, Barrier};
use std::thread;

/// Two blocks spending the same outpoint race; exactly one is connected
#[test]
fn test_double_spend_race() {
    for _ in 0..8 {
        let h = Harness::new(params_with_maturity(1));
        let gcb = genesis_coinbase_outpoint(&h.params);
        let g = h.genesis();
        let left = make_block(&g.header, 0, 0x1, vec![spend(gcb, coins(30))]);
        let right = make_block(&g.header, 0, 0x2, vec![spend(gcb, coins(31))]);

        let barrier = Arc::new(Barrier::new(2));
        let outcomes: Vec<SubmitOutcome> = thread::scope(|s| {
            let handles: Vec<_> = [left.clone(), right.clone()]
                .into_iter()
                .map(|block| {
                    let chain = Arc::clone(&h.chain);
                    let barrier = Arc::clone(&barrier);
                    s.spawn(move || {
                        barrier.wait();
                        chain.submit_block(block).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|t| t.join().unwrap()).collect()
        });

        let connected: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::MainChain(_)))
            .collect();
        assert_eq!(connected.len(), 1);
        assert_eq!(h.tip(), connected[0].hash());

        let winner = if h.tip() == left.block_hash() { &left } else { &right };
        let entries = h.chain.utxo_entries().unwrap();
        assert!(!entries.contains_key(&gcb));
        assert!(entries.contains_key(&first_output(&winner.transactions[1])));
        assert_eq!(entries.values().filter(|e| !e.is_coinbase).count(), 1);
    }
}

/// Many producers extending independent branches end in a consistent state
#[test]
fn test_parallel_branch_submission() {
    let h = Harness::new(params_with_maturity(1));
    let g = h.genesis();
    let branches: Vec<_> = (0..4u8)
        .map(|tag| make_chain(&g.header, 0, tag, 3 + tag as usize))
        .collect();
    let events = h.chain.subscribe();

    thread::scope(|s| {
        for branch in &branches {
            let chain = Arc::clone(&h.chain);
            s.spawn(move || {
                for block in branch {
                    chain.submit_block(block.clone()).unwrap();
                }
            });
        }
    });

    // The longest branch wins regardless of interleaving
    let longest = branches.last().unwrap();
    assert_eq!(h.tip(), longest.last().unwrap().block_hash());
    assert_eq!(h.chain.snapshot().height, longest.len() as u64);
    h.chain.verify_utxo_set().unwrap();

    // Replaying the event stream reproduces the final best chain
    let mut chain = vec![g.block_hash()];
    for event in events.try_iter() {
        match event {
            ChainEvent::BlockConnected(node) => {
                assert_eq!(node.parent, chain.last().copied());
                chain.push(node.hash);
            }
            ChainEvent::BlockDisconnected(node) => {
                assert_eq!(chain.pop(), Some(node.hash));
            }
            ChainEvent::TransactionAccepted(_) => {}
        }
    }
    assert_eq!(chain, h.chain.best_chain().unwrap());
}
