//! Shared helpers for integration tests
//!
//! Blocks are built against regtest parameters: 60 seconds apart, minimum
//! difficulty, and mined by a nonce search (about two tries per block at the
//! regtest limit).

#![allow(dead_code)]

use blvm_chainstate::chain::ChainSelector;
use blvm_chainstate::chain_params::ChainParams;
use blvm_chainstate::config::ChainConfig;
use blvm_chainstate::constants::SATOSHIS_PER_BTC;
use blvm_chainstate::crypto::calculate_tx_id;
use blvm_chainstate::economic::get_block_subsidy;
use blvm_chainstate::merkle::calculate_merkle_root;
use blvm_chainstate::notify::ChainEvent;
use blvm_chainstate::pow::check_proof_of_work;
use blvm_chainstate::script::{AcceptAllScripts, ScriptVerifier};
use blvm_chainstate::storage::MemoryStore;
use blvm_chainstate::time::FixedClock;
use blvm_chainstate::types::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const COIN: i64 = SATOSHIS_PER_BTC;
pub const BLOCK_SPACING: u32 = 60;

/// Route engine logs to the test harness; `RUST_LOG=blvm_chainstate=debug` shows them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn params_with_maturity(maturity: u64) -> ChainParams {
    let mut params = ChainParams::regtest();
    params.coinbase_maturity = maturity;
    params
}

pub struct Harness {
    pub chain: Arc<ChainSelector<MemoryStore>>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub params: Arc<ChainParams>,
}

impl Harness {
    pub fn new(params: ChainParams) -> Self {
        Self::build(
            Arc::new(params),
            ChainConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(AcceptAllScripts),
        )
    }

    pub fn with_config(params: ChainParams, config: ChainConfig) -> Self {
        Self::build(
            Arc::new(params),
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(AcceptAllScripts),
        )
    }

    pub fn with_verifier(params: ChainParams, verifier: Arc<dyn ScriptVerifier>) -> Self {
        Self::build(
            Arc::new(params),
            ChainConfig::default(),
            Arc::new(MemoryStore::new()),
            verifier,
        )
    }

    /// Open (or reopen) a chain over an existing store
    pub fn build(
        params: Arc<ChainParams>,
        config: ChainConfig,
        store: Arc<MemoryStore>,
        verifier: Arc<dyn ScriptVerifier>,
    ) -> Self {
        init_tracing();
        let clock = Arc::new(FixedClock::new(
            params.genesis_block.header.timestamp as u64 + 1_000_000,
        ));
        let chain = ChainSelector::open(
            Arc::clone(&params),
            config,
            Arc::clone(&store),
            verifier,
            clock.clone(),
        )
        .expect("open chain");
        Harness {
            chain: Arc::new(chain),
            store,
            clock,
            params,
        }
    }

    pub fn genesis(&self) -> Block {
        self.params.genesis_block.clone()
    }

    pub fn tip(&self) -> BlockHash {
        self.chain.snapshot().tip
    }
}

/// Outpoint of the genesis coinbase's only output (50 coins)
pub fn genesis_coinbase_outpoint(params: &ChainParams) -> OutPoint {
    OutPoint::new(calculate_tx_id(&params.genesis_block.transactions[0]), 0)
}

/// Coinbase for `height`; `tag` keeps competing branches' coinbases distinct
pub fn coinbase(height: u64, tag: u8, value: i64) -> Transaction {
    let mut script_sig = height.to_le_bytes().to_vec();
    script_sig.push(tag);
    Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout: OutPoint::null(),
            script_sig,
            sequence: u32::MAX,
        }],
        outputs: vec![TransactionOutput {
            value,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

pub fn spend(prevout: OutPoint, value: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout,
            script_sig: vec![0x51],
            sequence: u32::MAX,
        }],
        outputs: vec![TransactionOutput {
            value,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

pub fn mine(block: &mut Block) {
    let limit = ChainParams::regtest().pow_limit();
    while check_proof_of_work(&block.header, &block.block_hash(), &limit).is_err() {
        block.header.nonce += 1;
    }
}

/// Block with explicit header fields; the coinbase pays the full subsidy
pub fn make_block_with(
    parent: &BlockHeader,
    parent_height: u64,
    tag: u8,
    txs: Vec<Transaction>,
    timestamp: u32,
    bits: u32,
) -> Block {
    let height = parent_height + 1;
    let subsidy = get_block_subsidy(height, &ChainParams::regtest());
    let mut transactions = vec![coinbase(height, tag, subsidy)];
    transactions.extend(txs);
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: parent.block_hash(),
            merkle_root: calculate_merkle_root(&transactions).root,
            timestamp,
            bits,
            nonce: 0,
        },
        transactions,
    };
    mine(&mut block);
    block
}

pub fn make_block(parent: &BlockHeader, parent_height: u64, tag: u8, txs: Vec<Transaction>) -> Block {
    make_block_with(
        parent,
        parent_height,
        tag,
        txs,
        parent.timestamp + BLOCK_SPACING,
        ChainParams::regtest().pow_limit_bits,
    )
}

/// `count` empty blocks on top of `parent`
pub fn make_chain(parent: &BlockHeader, parent_height: u64, tag: u8, count: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count);
    let mut header = parent.clone();
    for i in 0..count as u64 {
        let block = make_block(&header, parent_height + i, tag, vec![]);
        header = block.header.clone();
        blocks.push(block);
    }
    blocks
}

/// Outpoint of a transaction's first output
pub fn first_output(tx: &Transaction) -> OutPoint {
    OutPoint::new(calculate_tx_id(tx), 0)
}

/// (kind, block hash) pairs for block events, in delivery order
pub fn block_events(events: impl IntoIterator<Item = ChainEvent>) -> Vec<(&'static str, BlockHash)> {
    events
        .into_iter()
        .filter_map(|e| match e {
            ChainEvent::BlockConnected(n) => Some(("connected", n.hash)),
            ChainEvent::BlockDisconnected(n) => Some(("disconnected", n.hash)),
            ChainEvent::TransactionAccepted(_) => None,
        })
        .collect()
}

pub fn coins(n: i64) -> i64 {
    n * COIN
}
