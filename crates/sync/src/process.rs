//! Processing callbacks consumed by the sync manager.
//!
//! Validation itself lives outside this crate; each concern is injected as a
//! single-method trait so tests can substitute it.

use crate::error::ProcessError;
use crate::message::TipUpdatedEvent;
use crate::peer::PeerId;
use crate::view::{BlockIndexEntry, TxEntry};
use ferrum_types::{Block, BlockHeader, Hash, InvVect, Transaction};
use std::collections::HashSet;

/// Everything a transaction-processing call reports back.
///
/// The four channels of information are deliberately one struct: reject
/// hashes and missing parents are consumed even when `error` is set.
#[derive(Debug, Default)]
pub struct TxProcessOutcome {
    /// Transactions accepted into the mempool (the submitted transaction
    /// plus any orphans it unblocked).
    pub accepted: Vec<Transaction>,
    /// Parents the mempool is missing; the sender is solicited for them.
    pub missing_parents: Vec<Hash>,
    /// Hashes to remember as permanently rejected until the next block.
    pub rejected: Vec<Hash>,
    /// Validation failure, if any.
    pub error: Option<ProcessError>,
}

/// Validates a transaction and applies it to the mempool.
pub trait TransactionProcessor: Send + Sync {
    /// Process one transaction received from `from_peer`.
    ///
    /// `rejected` is the manager's rejection memory, provided so processing
    /// can skip known-bad ancestry.
    fn process_transaction(
        &self,
        tx: &Transaction,
        rejected: &HashSet<Hash>,
        from_peer: i64,
    ) -> TxProcessOutcome;
}

/// Validates a block and connects it to the chain.
pub trait BlockProcessor: Send + Sync {
    /// Process one block; returns whether it was stored as an orphan.
    ///
    /// `force_processing` bypasses anti-DoS ordering checks and is set for
    /// blocks that were explicitly requested or came from a whitelisted peer.
    fn process_block(&self, block: &Block, force_processing: bool) -> Result<bool, ProcessError>;
}

/// Validates a batch of headers and extends the block index.
pub trait HeaderProcessor: Send + Sync {
    /// Process a contiguous header batch; returns the index entry of the
    /// last header on success.
    fn process_headers(&self, headers: &[BlockHeader]) -> Result<BlockIndexEntry, ProcessError>;
}

/// Records misbehavior against a peer address.
pub trait BanScoreSink: Send + Sync {
    /// Add `persistent` and `transient` ban score with a reason.
    fn add_ban_score(&self, addr: &str, persistent: u32, transient: u32, reason: &str);
}

/// Notifications the sync manager pushes to the rest of the node.
pub trait PeerNotifier: Send + Sync {
    /// Relay newly accepted transactions to interested peers.
    fn announce_new_transactions(&self, txns: &[TxEntry]);

    /// Broadcast updated peer heights after a block from `update_source`.
    fn update_peer_heights(&self, latest_hash: &Hash, latest_height: i32, update_source: PeerId);

    /// Relay an inventory announcement carrying the given header.
    fn relay_inventory(&self, inv: &InvVect, header: &BlockHeader);

    /// Relay a chain tip update.
    fn relay_updated_tip_blocks(&self, event: &TipUpdatedEvent);

    /// A transaction was confirmed by a connected block.
    fn transaction_confirmed(&self, tx: &Transaction);
}
