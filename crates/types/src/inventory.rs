//! Inventory vectors announced and requested between peers.

use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of inventory vectors in a single inv/getdata message.
pub const MAX_INV_PER_MSG: usize = 50_000;

/// Maximum number of block headers in a single headers message.
pub const MAX_BLOCK_HEADERS_PER_MSG: usize = 2_000;

/// Kind of object an inventory vector refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvType {
    /// Invalid/unknown entry.
    Error,
    /// A transaction.
    Tx,
    /// A block.
    Block,
    /// A block with bloom-filtered transactions.
    FilteredBlock,
}

/// An inventory vector: typed reference to a block or transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvVect {
    /// Referenced object kind.
    pub inv_type: InvType,
    /// Referenced object hash.
    pub hash: Hash,
}

impl InvVect {
    /// Inventory vector for a block.
    pub fn block(hash: Hash) -> Self {
        Self {
            inv_type: InvType::Block,
            hash,
        }
    }

    /// Inventory vector for a transaction.
    pub fn tx(hash: Hash) -> Self {
        Self {
            inv_type: InvType::Tx,
            hash,
        }
    }
}

impl fmt::Display for InvVect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.inv_type, self.hash)
    }
}
