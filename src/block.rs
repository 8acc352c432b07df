//! Block validation
//!
//! Two phases, each stopping at the first failure:
//!
//! 1. [`check_block_sanity`]: context-free. Needs nothing but the block and
//!    the chain parameters, so it runs before the chain lock is taken and in
//!    parallel across peers.
//! 2. [`check_block_header_context`] and [`connect_block`]: against the
//!    parent's position in the block index and a [`UtxoViewpoint`] holding the
//!    parent's UTXO state.

use crate::block_index::{BlockIndex, BlockNode};
use crate::chain_params::ChainParams;
use crate::constants::MAX_BLOCK_SERIALIZED_SIZE;
use crate::crypto::calculate_tx_id;
use crate::economic::get_block_subsidy;
use crate::error::{reject, Result, RuleKind};
use crate::merkle::calculate_merkle_root;
use crate::pow::{check_proof_of_work, next_required_bits};
use crate::script::{verify_scripts, ScriptCheck, ScriptVerifier};
use crate::serialization::serialized_block_size;
use crate::transaction::{check_transaction, check_tx_inputs, is_coinbase, is_final_tx};
use crate::types::*;
use crate::utxo::UtxoViewpoint;
use std::collections::HashSet;

/// Context-free block checks
///
/// Proof of work against the header's own target, at least one transaction,
/// serialized size, a single leading coinbase, per-transaction sanity, merkle
/// root (including the duplicate-subtree mutation) and unique transaction ids.
pub fn check_block_sanity(block: &Block, params: &ChainParams) -> Result<()> {
    let hash = block.block_hash();
    check_proof_of_work(&block.header, &hash, &params.pow_limit())?;

    if block.transactions.is_empty() {
        return reject(RuleKind::NoTransactions, "block has no transactions");
    }

    let size = serialized_block_size(block);
    if size > MAX_BLOCK_SERIALIZED_SIZE {
        return reject(
            RuleKind::BlockTooLarge,
            format!("block is {size} bytes, limit {MAX_BLOCK_SERIALIZED_SIZE}"),
        );
    }

    if !is_coinbase(&block.transactions[0]) {
        return reject(RuleKind::FirstTxNotCoinbase, "first transaction is not a coinbase");
    }
    if let Some(i) = block.transactions[1..].iter().position(is_coinbase) {
        return reject(
            RuleKind::MultipleCoinbases,
            format!("transaction {} is a second coinbase", i + 1),
        );
    }

    for tx in &block.transactions {
        check_transaction(tx)?;
    }

    let merkle = calculate_merkle_root(&block.transactions);
    if merkle.root != block.header.merkle_root {
        return reject(
            RuleKind::BadMerkleRoot,
            format!(
                "header merkle root {} does not match computed {}",
                hex::encode(block.header.merkle_root),
                hex::encode(merkle.root)
            ),
        );
    }
    if merkle.mutated {
        return reject(RuleKind::MutatedMerkleTree, "merkle tree contains duplicate siblings");
    }

    let mut seen = HashSet::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        let txid = calculate_tx_id(tx);
        if !seen.insert(txid) {
            return reject(
                RuleKind::DuplicateTransaction,
                format!("transaction {} appears twice", hex::encode(txid)),
            );
        }
    }

    Ok(())
}

/// Header checks that need the parent's place in the block index
///
/// - bits must equal the retarget schedule's value for this height
/// - timestamp strictly after the parent's median time past
/// - timestamp at most `max_future_secs` ahead of `now`
/// - a checkpoint at this height must match, and no fork may start below the
///   latest checkpoint already on the main chain
pub fn check_block_header_context(
    header: &BlockHeader,
    hash: &BlockHash,
    parent: &BlockNode,
    index: &BlockIndex,
    params: &ChainParams,
    now: u64,
    max_future_secs: u64,
) -> Result<()> {
    let expected = next_required_bits(index, parent, header.timestamp, params)?;
    if header.bits != expected {
        return reject(
            RuleKind::UnexpectedDifficulty,
            format!("bits {:#010x}, expected {expected:#010x}", header.bits),
        );
    }

    let median = index.median_time_past(&parent.hash).unwrap_or(0);
    if header.timestamp <= median {
        return reject(
            RuleKind::TimeTooOld,
            format!("timestamp {} is not after median time past {median}", header.timestamp),
        );
    }

    let limit = now.saturating_add(max_future_secs);
    if header.timestamp as u64 > limit {
        return reject(
            RuleKind::TimeTooNew,
            format!("timestamp {} is more than {max_future_secs}s ahead of {now}", header.timestamp),
        );
    }

    let height = parent.height + 1;
    if let Some(checkpoint) = params.checkpoint_at(height) {
        if checkpoint.hash != *hash {
            return reject(
                RuleKind::CheckpointMismatch,
                format!("block at height {height} is {hash}, checkpoint is {}", checkpoint.hash),
            );
        }
    }

    let passed = params
        .checkpoints
        .iter()
        .rev()
        .find(|c| index.lookup(&c.hash).is_some_and(|n| n.in_main_chain));
    if let Some(checkpoint) = passed {
        if height < checkpoint.height {
            return reject(
                RuleKind::ForkTooOld,
                format!("fork at height {height} is below checkpoint {}", checkpoint.height),
            );
        }
    }

    Ok(())
}

/// Everything [`connect_block`] needs beyond the block and the view
pub struct ConnectContext<'a> {
    pub params: &'a ChainParams,
    pub verifier: &'a dyn ScriptVerifier,
    pub parallel_scripts: bool,
    /// Median time past of the parent, the cutoff for time-based lock times
    pub median_time_past: u32,
}

/// Apply `block` at `height` to `view`, checking every contextual input rule
///
/// Transactions are processed in list order so a later transaction can spend
/// an output created earlier in the block. Each input's locking script is
/// captured as it is resolved; the scripts are then verified together (in
/// parallel when enabled) after every other rule has passed. Returns the
/// fees collected. On error the view holds partial edits and must be
/// discarded by the caller.
pub fn connect_block(
    block: &Block,
    height: Natural,
    view: &mut UtxoViewpoint<'_>,
    ctx: &ConnectContext<'_>,
) -> Result<i64> {
    let mut checks: Vec<ScriptCheck<'_>> = Vec::new();
    let mut fees: i64 = 0;

    for (tx_index, tx) in block.transactions.iter().enumerate() {
        let txid = calculate_tx_id(tx);

        if !is_final_tx(tx, height, ctx.median_time_past) {
            return reject(
                RuleKind::NonFinalTransaction,
                format!("transaction {tx_index} is not final at height {height}"),
            );
        }

        if tx_index > 0 {
            let resolved = check_tx_inputs(tx, &*view, height, ctx.params)?;
            fees = match fees.checked_add(resolved.fee) {
                Some(total) => total,
                None => return reject(RuleKind::InputValueOutOfRange, "block fees overflow"),
            };
            for (input_index, (input, entry)) in
                tx.inputs.iter().zip(resolved.spent).enumerate()
            {
                view.spend(&input.prevout)?;
                checks.push(ScriptCheck {
                    tx_index,
                    tx,
                    input_index,
                    locking_script: entry.script_pubkey,
                    amount: entry.amount,
                });
            }
        }

        for index in 0..tx.outputs.len() {
            let outpoint = OutPoint::new(txid, index as u32);
            if view.get(&outpoint)?.is_some() {
                return reject(
                    RuleKind::OverwriteUnspent,
                    format!(
                        "transaction {} would overwrite unspent output {index}",
                        hex::encode(txid)
                    ),
                );
            }
        }
        view.add_transaction_outputs(tx, txid, height);
    }

    let subsidy = get_block_subsidy(height, ctx.params);
    let allowed = subsidy.saturating_add(fees);
    let claimed: i64 = block
        .transactions
        .first()
        .map_or(0, |coinbase| coinbase.outputs.iter().map(|o| o.value).sum());
    if claimed > allowed {
        return reject(
            RuleKind::BadCoinbaseValue,
            format!("coinbase pays {claimed}, subsidy {subsidy} plus fees {fees} allow {allowed}"),
        );
    }

    verify_scripts(&checks, ctx.verifier, height, ctx.parallel_scripts)?;

    Ok(fees)
}
