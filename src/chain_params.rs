//! Per-network consensus parameters
//!
//! One [`ChainParams`] is selected at startup and handed to the engine behind
//! an `Arc`; nothing reads network constants from globals, so several
//! networks (or test variants) can run side by side in one process.

use crate::constants::INITIAL_SUBSIDY;
use crate::merkle::calculate_merkle_root;
use crate::pow::{expand_target, U256};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Simnet,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Simnet => "simnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Mainnet),
            "test" | "testnet" | "testnet3" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            "simnet" => Ok(Network::Simnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// A block the chain must contain at `height`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u64,
    pub hash: BlockHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub network: Network,
    pub genesis_block: Block,
    /// Computed from `genesis_block.header`
    pub genesis_hash: BlockHash,
    /// Easiest allowed target, in compact form
    pub pow_limit_bits: u32,
    /// Seconds one retarget period should take
    pub target_timespan: u64,
    /// Seconds between blocks
    pub target_spacing: u64,
    /// Bound on how far one retarget may move the target, in either direction
    pub retarget_adjustment_factor: u64,
    /// Test networks: allow minimum difficulty after a long gap
    pub reduce_min_difficulty: bool,
    pub min_diff_reduction_time: u64,
    /// Confirmations before a coinbase output may be spent
    pub coinbase_maturity: u64,
    pub subsidy_halving_interval: u64,
    pub base_subsidy: i64,
    /// Ascending by height
    pub checkpoints: Vec<Checkpoint>,
}

const GENESIS_SIG_SCRIPT: &[u8] = &[
    46, 46, 46, 46, 46, 46, 46, 84, 105, 109, 101, 115, 32, 50, 48, 47, 78, 111, 118, 47, 50, 48,
    49, 57, 32, 73, 116, 32, 109, 97, 107, 101, 115, 32, 116, 104, 101, 32, 97, 117, 116, 104,
    111, 114, 32, 117, 110, 104, 97, 112, 112, 121, 32, 116, 104, 97, 116, 32, 116, 104, 101, 32,
    99, 117, 114, 114, 101, 110, 116, 32, 119, 111, 114, 107, 105, 110, 103, 33,
];

const GENESIS_PK_SCRIPT: &[u8] = &[
    84, 104, 101, 114, 101, 32, 119, 105, 108, 108, 32, 97, 108, 119, 97, 121, 115, 32, 98, 101,
    32, 111, 112, 112, 111, 114, 116, 117, 110, 105, 116, 105, 101, 115, 32, 97, 110, 100, 32, 121,
    111, 117, 32, 110, 101, 101, 100, 32, 116, 111, 32, 98, 101, 32, 112, 114, 101, 112, 97, 114,
    101, 100,
];

/// Coinbase shared by every network's genesis block
pub fn genesis_coinbase() -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout: OutPoint::null(),
            script_sig: GENESIS_SIG_SCRIPT.to_vec(),
            sequence: 0xffff_ffff,
        }],
        outputs: vec![TransactionOutput {
            value: 0x1_2a05_f200,
            script_pubkey: GENESIS_PK_SCRIPT.to_vec(),
        }],
        lock_time: 0,
    }
}

fn genesis_block(timestamp: u32, bits: u32, nonce: u32) -> Block {
    let transactions = vec![genesis_coinbase()];
    let merkle_root = calculate_merkle_root(&transactions).root;
    Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: BlockHash::ZERO,
            merkle_root,
            timestamp,
            bits,
            nonce,
        },
        transactions,
    }
}

const TWO_WEEKS: u64 = 14 * 24 * 60 * 60;
const TEN_MINUTES: u64 = 10 * 60;
const TWENTY_MINUTES: u64 = 20 * 60;

impl ChainParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
            Network::Simnet => Self::simnet(),
        }
    }

    pub fn mainnet() -> Self {
        Self::build(
            Network::Mainnet,
            genesis_block(0x5dd4_d572, 0x1d00_ffff, 0x7c2b_ac1d),
            0x1d00_ffff,
            false,
            210_000,
        )
    }

    pub fn testnet() -> Self {
        Self::build(
            Network::Testnet,
            genesis_block(1_296_688_602, 0x1d00_ffff, 0x18ae_a41a),
            0x1d00_ffff,
            true,
            210_000,
        )
    }

    pub fn regtest() -> Self {
        Self::build(
            Network::Regtest,
            genesis_block(1_296_688_602, 0x207f_ffff, 2),
            0x207f_ffff,
            true,
            150,
        )
    }

    pub fn simnet() -> Self {
        Self::build(
            Network::Simnet,
            genesis_block(1_401_292_357, 0x207f_ffff, 2),
            0x207f_ffff,
            true,
            210_000,
        )
    }

    fn build(
        network: Network,
        genesis_block: Block,
        pow_limit_bits: u32,
        reduce_min_difficulty: bool,
        subsidy_halving_interval: u64,
    ) -> Self {
        let genesis_hash = genesis_block.block_hash();
        ChainParams {
            network,
            genesis_block,
            genesis_hash,
            pow_limit_bits,
            target_timespan: TWO_WEEKS,
            target_spacing: TEN_MINUTES,
            retarget_adjustment_factor: 4,
            reduce_min_difficulty,
            min_diff_reduction_time: if reduce_min_difficulty { TWENTY_MINUTES } else { 0 },
            coinbase_maturity: 100,
            subsidy_halving_interval,
            base_subsidy: INITIAL_SUBSIDY,
            checkpoints: Vec::new(),
        }
    }

    /// Replace the genesis block and recompute its hash (for derived test networks)
    pub fn with_genesis(mut self, genesis_block: Block) -> Self {
        self.genesis_hash = genesis_block.block_hash();
        self.genesis_block = genesis_block;
        self
    }

    pub fn blocks_per_retarget(&self) -> u64 {
        if self.target_spacing == 0 {
            0
        } else {
            self.target_timespan / self.target_spacing
        }
    }

    pub fn pow_limit(&self) -> U256 {
        expand_target(self.pow_limit_bits).target
    }

    pub fn checkpoint_at(&self, height: u64) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.height == height)
    }

    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().max_by_key(|c| c.height)
    }
}
