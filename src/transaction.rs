//! Transaction validation: context-free sanity rules and input checks against a UTXO view

use crate::chain_params::ChainParams;
use crate::constants::*;
use crate::error::{reject, Result, RuleKind};
use crate::types::*;
use crate::utxo::{UtxoEntry, UtxoLookup};
use std::collections::HashSet;

/// Exactly one input, and it references the null outpoint
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.len() == 1 && tx.inputs[0].prevout.is_null()
}

/// Context-free checks
///
/// 1. At least one input and one output
/// 2. Each output amount within [0, MAX_MONEY]; their sum as well
/// 3. No two inputs spend the same outpoint
/// 4. Coinbase: unlocking script of 2..=100 bytes. Otherwise: no null prevouts
pub fn check_transaction(tx: &Transaction) -> Result<()> {
    if tx.inputs.is_empty() {
        return reject(RuleKind::NoInputs, "transaction has no inputs");
    }
    if tx.outputs.is_empty() {
        return reject(RuleKind::NoOutputs, "transaction has no outputs");
    }

    let mut total: i64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 {
            return reject(
                RuleKind::BadOutputValue,
                format!("output {i} has negative value {}", output.value),
            );
        }
        if output.value > MAX_MONEY {
            return reject(
                RuleKind::BadOutputValue,
                format!("output {i} value {} exceeds max money", output.value),
            );
        }
        total = match total.checked_add(output.value) {
            Some(sum) if sum <= MAX_MONEY => sum,
            _ => {
                return reject(
                    RuleKind::OutputSumTooLarge,
                    "total output value exceeds max money",
                )
            }
        };
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return reject(
                RuleKind::DuplicateInput,
                format!(
                    "outpoint {}:{} spent twice",
                    hex::encode(input.prevout.hash),
                    input.prevout.index
                ),
            );
        }
    }

    if is_coinbase(tx) {
        let len = tx.inputs[0].script_sig.len();
        if !(MIN_COINBASE_SCRIPT_LEN..=MAX_COINBASE_SCRIPT_LEN).contains(&len) {
            return reject(
                RuleKind::BadCoinbaseScriptLength,
                format!("coinbase script is {len} bytes"),
            );
        }
    } else if let Some(i) = tx.inputs.iter().position(|input| input.prevout.is_null()) {
        return reject(
            RuleKind::NullPrevout,
            format!("non-coinbase input {i} references the null outpoint"),
        );
    }

    Ok(())
}

/// Result of resolving a transaction's inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInputs {
    /// Entry each input spends, in input order
    pub spent: Vec<UtxoEntry>,
    pub fee: i64,
}

/// Check a non-coinbase transaction's inputs against `view` for inclusion at `height`
///
/// Every input must resolve to an unspent entry (InputNotFound); coinbase
/// outputs need `coinbase_maturity` confirmations, counted as
/// `height - creation height` (PrematureSpend); input amounts must be in
/// range and cover the outputs. Reads only; the caller applies the spend.
pub fn check_tx_inputs(
    tx: &Transaction,
    view: &dyn UtxoLookup,
    height: Natural,
    params: &ChainParams,
) -> Result<ResolvedInputs> {
    let mut spent = Vec::with_capacity(tx.inputs.len());
    let mut total_in: i64 = 0;

    for (i, input) in tx.inputs.iter().enumerate() {
        let Some(entry) = view.lookup(&input.prevout)? else {
            return reject(
                RuleKind::InputNotFound,
                format!(
                    "input {i} spends missing or spent output {}:{}",
                    hex::encode(input.prevout.hash),
                    input.prevout.index
                ),
            );
        };

        if entry.is_coinbase {
            let confirmations = height.saturating_sub(entry.height);
            if confirmations < params.coinbase_maturity {
                return reject(
                    RuleKind::PrematureSpend,
                    format!(
                        "input {i} spends a coinbase from height {} at height {height}: \
                         {confirmations} of {} confirmations",
                        entry.height, params.coinbase_maturity
                    ),
                );
            }
        }

        if !(0..=MAX_MONEY).contains(&entry.amount) {
            return reject(
                RuleKind::InputValueOutOfRange,
                format!("input {i} amount {} out of range", entry.amount),
            );
        }
        total_in = match total_in.checked_add(entry.amount) {
            Some(sum) if sum <= MAX_MONEY => sum,
            _ => {
                return reject(
                    RuleKind::InputValueOutOfRange,
                    "total input value exceeds max money",
                )
            }
        };
        spent.push(entry);
    }

    // Output sum is bounded by check_transaction, so this cannot overflow
    let total_out: i64 = tx.outputs.iter().map(|o| o.value).sum();
    if total_in < total_out {
        return reject(
            RuleKind::InsufficientInputValue,
            format!("inputs {total_in} are less than outputs {total_out}"),
        );
    }

    Ok(ResolvedInputs {
        spent,
        fee: total_in - total_out,
    })
}

/// Lock-time finality
///
/// A zero lock time is always final. Otherwise the lock time is compared to
/// the height (below [`LOCKTIME_THRESHOLD`]) or to `block_time`; if it has not
/// passed, the transaction is still final when every input opts out with
/// [`SEQUENCE_FINAL`].
pub fn is_final_tx(tx: &Transaction, height: Natural, block_time: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let threshold = if tx.lock_time < LOCKTIME_THRESHOLD {
        height
    } else {
        block_time as u64
    };
    if (tx.lock_time as u64) < threshold {
        return true;
    }
    tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}
