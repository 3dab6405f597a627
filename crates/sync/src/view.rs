//! Read-only views over the chain index, mempool and UTXO set.
//!
//! The sync manager never owns chain state; it consults these interfaces,
//! which are injected at construction and must be thread-safe since the
//! stores behind them are also queried by peer I/O tasks.

use ferrum_types::{BlockLocator, Hash, OutPoint, Transaction};

/// Cumulative proof-of-work, totally ordered.
pub type ChainWork = u128;

/// Snapshot of one block-index node.
///
/// Carries exactly the fields the download scheduler consults; values are
/// copied out of the index so no reference is held across handler steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockIndexEntry {
    /// Block hash.
    pub hash: Hash,
    /// Predecessor hash, `None` for genesis.
    pub prev: Option<Hash>,
    /// Height in the tree.
    pub height: i32,
    /// Cumulative work up to and including this block.
    pub work: ChainWork,
    /// Whether the block body is stored locally.
    pub has_data: bool,
    /// Whether the header tree up to this block is valid.
    pub valid_tree: bool,
}

/// Read access to the block index and active chain.
pub trait ChainView: Send + Sync {
    /// Tip of the active chain.
    fn tip(&self) -> BlockIndexEntry;

    /// Best known header, which may be ahead of the tip.
    fn best_header(&self) -> Option<BlockIndexEntry>;

    /// Look up a block in the index (active chain or side chain).
    fn find_block_index(&self, hash: &Hash) -> Option<BlockIndexEntry>;

    /// Look up a block in the active chain only.
    fn find_hash_in_active(&self, hash: &Hash) -> Option<BlockIndexEntry>;

    /// Whether the active chain contains the block.
    fn contains(&self, hash: &Hash) -> bool;

    /// Fork point between the given block and the active chain.
    fn find_fork(&self, hash: &Hash) -> Option<BlockIndexEntry>;

    /// Ancestor of the given block at the given height.
    fn ancestor(&self, hash: &Hash, height: i32) -> Option<BlockIndexEntry>;

    /// Build a locator anchored at the given block.
    fn locator(&self, from: &Hash) -> BlockLocator;

    /// Height of the active chain tip.
    fn height(&self) -> i32;

    /// Whether the chain believes it is caught up with the network.
    fn is_current(&self) -> bool;

    /// Whether the node is still in initial block download.
    fn is_initial_block_download(&self) -> bool;

    /// Whether block bodies may be fetched directly after header validation.
    fn can_direct_fetch(&self) -> bool;

    /// Minimum cumulative work a chain must have to be taken seriously.
    fn min_chain_work(&self) -> ChainWork;
}

/// A transaction resident in the mempool.
#[derive(Clone, Debug)]
pub struct TxEntry {
    /// The transaction.
    pub tx: Transaction,
    /// Fee paid, in the smallest unit.
    pub fee: i64,
    /// Serialized size in bytes.
    pub size: usize,
    /// Chain height when the entry was admitted.
    pub height: i32,
}

/// Access to the transaction memory pool.
pub trait MempoolView: Send + Sync {
    /// Look up a mempool entry by transaction hash.
    fn entry(&self, hash: &Hash) -> Option<TxEntry>;

    /// Whether the main pool contains the transaction.
    fn contains(&self, hash: &Hash) -> bool;

    /// Whether the orphan pool contains the transaction.
    fn contains_orphan(&self, hash: &Hash) -> bool;

    /// Remove the given confirmed transactions and anything they double-spend.
    fn remove_confirmed(&self, txs: &[Transaction]);

    /// Try to promote orphans that spend outputs of the given transaction.
    fn promote_orphans(&self, tx: &Transaction, height: i32);
}

/// Access to the UTXO cache.
pub trait UtxoView: Send + Sync {
    /// Whether an unspent coin exists for the outpoint.
    fn have_coin(&self, out: &OutPoint) -> bool;
}
