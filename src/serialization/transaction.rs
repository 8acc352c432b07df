//! Transaction wire format
//!
//! - Version (4 bytes, signed)
//! - Input count (VarInt), then per input: prevout hash (32), prevout index (4),
//!   script length (VarInt), script, sequence (4)
//! - Output count (VarInt), then per output: value (8, signed), script length
//!   (VarInt), script
//! - Lock time (4 bytes)

use super::varint::{varint_len, write_varint};
use super::Reader;
use crate::error::{ChainError, Result};
use crate::types::*;

/// Serialize a transaction to wire format
pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(serialized_tx_size(tx));
    write_transaction(&mut out, tx);
    out
}

pub(crate) fn write_transaction(out: &mut Vec<u8>, tx: &Transaction) {
    out.extend_from_slice(&tx.version.to_le_bytes());

    write_varint(out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        out.extend_from_slice(&input.prevout.hash);
        out.extend_from_slice(&input.prevout.index.to_le_bytes());
        write_varint(out, input.script_sig.len() as u64);
        out.extend_from_slice(&input.script_sig);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }

    write_varint(out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        out.extend_from_slice(&output.value.to_le_bytes());
        write_varint(out, output.script_pubkey.len() as u64);
        out.extend_from_slice(&output.script_pubkey);
    }

    out.extend_from_slice(&tx.lock_time.to_le_bytes());
}

/// Exact encoded size without allocating
pub fn serialized_tx_size(tx: &Transaction) -> usize {
    let inputs: usize = tx
        .inputs
        .iter()
        .map(|i| 32 + 4 + varint_len(i.script_sig.len() as u64) + i.script_sig.len() + 4)
        .sum();
    let outputs: usize = tx
        .outputs
        .iter()
        .map(|o| 8 + varint_len(o.script_pubkey.len() as u64) + o.script_pubkey.len())
        .sum();
    4 + varint_len(tx.inputs.len() as u64)
        + inputs
        + varint_len(tx.outputs.len() as u64)
        + outputs
        + 4
}

/// Deserialize exactly one transaction; trailing bytes are an error
pub fn deserialize_transaction(data: &[u8]) -> Result<Transaction> {
    let mut reader = Reader::new(data);
    let tx = read_transaction(&mut reader)?;
    if !reader.is_empty() {
        return Err(ChainError::Serialization(
            format!("{} trailing bytes after transaction", data.len() - reader.position()).into(),
        ));
    }
    Ok(tx)
}

pub(crate) fn read_transaction(reader: &mut Reader<'_>) -> Result<Transaction> {
    let version = reader.i32_le()?;

    // Smallest input: 32 + 4 + 1 + 4
    let input_count = reader.count(41)?;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        let hash = reader.array::<32>()?;
        let index = reader.u32_le()?;
        let script_sig = reader.var_bytes()?;
        let sequence = reader.u32_le()?;
        inputs.push(TransactionInput {
            prevout: OutPoint { hash, index },
            script_sig,
            sequence,
        });
    }

    // Smallest output: 8 + 1
    let output_count = reader.count(9)?;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        let value = reader.i64_le()?;
        let script_pubkey = reader.var_bytes()?;
        outputs.push(TransactionOutput {
            value,
            script_pubkey,
        });
    }

    let lock_time = reader.u32_le()?;

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
    })
}
