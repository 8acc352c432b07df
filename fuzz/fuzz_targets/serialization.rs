#![no_main]
use blvm_chainstate::serialization::block::{
    deserialize_block, deserialize_block_header, serialize_block, serialize_block_header,
};
use blvm_chainstate::serialization::transaction::{deserialize_transaction, serialize_transaction};
use blvm_chainstate::serialization::varint::{decode_varint, encode_varint};
use blvm_chainstate::utxo::{UtxoDiff, UtxoEntry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must re-encode to a value that decodes identically
    if let Ok(tx) = deserialize_transaction(data) {
        let bytes = serialize_transaction(&tx);
        assert_eq!(deserialize_transaction(&bytes).ok(), Some(tx));
    }

    if let Ok(header) = deserialize_block_header(data) {
        assert_eq!(&serialize_block_header(&header)[..], &data[..80]);
    }

    if let Ok(block) = deserialize_block(data) {
        let bytes = serialize_block(&block);
        assert_eq!(deserialize_block(&bytes).ok(), Some(block));
    }

    if let Ok((value, used)) = decode_varint(data) {
        assert!(used <= data.len());
        assert_eq!(decode_varint(&encode_varint(value)).ok().map(|(v, _)| v), Some(value));
    }

    // Storage records: corrupt bytes are errors, not panics
    if let Ok(entry) = UtxoEntry::decode(data) {
        assert_eq!(UtxoEntry::decode(&entry.encode()).ok(), Some(entry));
    }
    let _ = UtxoDiff::decode(data);
});
