//! Transaction types.

use crate::encode::{put_bytes, put_compact_size, put_i32, put_i64, put_u32};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to an output of a previous transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the transaction holding the output.
    pub hash: Hash,
    /// Output index within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// Create a new outpoint.
    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        Self {
            hash: Hash::ZERO,
            index: u32::MAX,
        }
    }

    /// True for the coinbase null reference.
    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// Transaction input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Output being spent.
    pub previous_output: OutPoint,
    /// Unlocking script.
    pub script_sig: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

/// Transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Amount in the smallest unit.
    pub value: i64,
    /// Locking script.
    pub script_pubkey: Vec<u8>,
}

/// A transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction format version.
    pub version: i32,
    /// Inputs.
    pub inputs: Vec<TxIn>,
    /// Outputs.
    pub outputs: Vec<TxOut>,
    /// Earliest time or height the transaction may be mined.
    pub lock_time: u32,
}

impl Transaction {
    /// Compute the transaction id.
    pub fn hash(&self) -> Hash {
        Hash::hash256(&self.serialize())
    }

    /// True if this is the block-subsidy transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        self.serialize().len()
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        put_i32(&mut buf, self.version);
        put_compact_size(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(input.previous_output.hash.as_slice());
            put_u32(&mut buf, input.previous_output.index);
            put_bytes(&mut buf, &input.script_sig);
            put_u32(&mut buf, input.sequence);
        }
        put_compact_size(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            put_i64(&mut buf, output.value);
            put_bytes(&mut buf, &output.script_pubkey);
        }
        put_u32(&mut buf, self.lock_time);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::new(Hash::compute(b"prev"), 0),
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: 5_000_000_000,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn test_hash_changes_with_content() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.outputs[0].value += 1;
        assert_ne!(tx.hash(), other.hash());
    }

    #[test]
    fn test_coinbase_detection() {
        let mut tx = sample_tx();
        assert!(!tx.is_coinbase());
        tx.inputs[0].previous_output = OutPoint::null();
        assert!(tx.is_coinbase());
    }
}
