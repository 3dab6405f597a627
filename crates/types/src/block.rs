//! Block and block header types.

use crate::encode::put_u32;
use crate::hash::Hash;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Sparse list of block hashes identifying a chain position to a remote peer.
///
/// Ordered newest-first; the receiving peer replies with headers following
/// the first hash it recognizes.
pub type BlockLocator = Vec<Hash>;

/// Block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block format version.
    pub version: i32,
    /// Hash of the predecessor block.
    pub prev_block: Hash,
    /// Merkle root of the block's transactions.
    pub merkle_root: Hash,
    /// Block timestamp (seconds since the epoch).
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Compute the block hash: double SHA-256 of the 80-byte header.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(80);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(self.prev_block.as_slice());
        buf.extend_from_slice(self.merkle_root.as_slice());
        put_u32(&mut buf, self.time);
        put_u32(&mut buf, self.bits);
        put_u32(&mut buf, self.nonce);
        Hash::hash256(&buf)
    }
}

/// A block: header plus ordered transactions, coinbase first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions, coinbase first.
    pub txs: Vec<Transaction>,
}

impl Block {
    /// The block hash (hash of the header).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Number of transactions.
    pub fn tx_count(&self) -> usize {
        self.txs.len()
    }
}
