//! Transaction ingress: validation, rejection memory, parent solicitation.

use crate::inventory::have_inventory;
use crate::manager::{SyncWorker, MAX_REJECTED_TXNS};
use crate::message::PeerMessage;
use crate::metrics;
use crate::peer::{limit_hash_set, PeerId};
use ferrum_types::{Hash, InvVect, Transaction};
use tracing::{debug, trace, warn};

impl SyncWorker {
    /// Whether the transaction is already rejected or otherwise known.
    ///
    /// No reject message is sent for a previously rejected hash: if it was
    /// rejected before, this announcement is unsolicited.
    pub(crate) fn already_have_tx(&self, tx_hash: &Hash) -> bool {
        if self.rejected_txns.contains(tx_hash) {
            debug!(tx = %tx_hash, "ignoring previously rejected transaction");
            return true;
        }
        have_inventory(
            &*self.chain,
            &*self.mempool,
            &*self.utxo,
            &InvVect::tx(*tx_hash),
        )
    }

    /// Handle a transaction message from a peer.
    pub(crate) fn handle_tx(&mut self, peer_id: PeerId, tx: Transaction) {
        let Some(state) = self.peer_states.get(&peer_id) else {
            warn!(peer = peer_id, "received tx message from unknown peer");
            return;
        };
        let peer = state.peer.clone();
        let tx_hash = tx.hash();

        if self.already_have_tx(&tx_hash) {
            trace!(peer = %peer.addr(), "ignoring already processed transaction");
            return;
        }

        // Validation, mempool insertion and orphan handling all happen
        // downstream; every channel of the outcome is consumed here.
        let outcome =
            self.tx_processor
                .process_transaction(&tx, &self.rejected_txns, i64::from(peer_id));

        // Drop the hash from the request maps. Either the mempool now knows
        // it, or insertion failed and the next inv retries it.
        if let Some(state) = self.peer_states.get_mut(&peer_id) {
            state.requested_txns.remove(&tx_hash);
        }
        self.requested_txns.remove(&tx_hash);

        // Remember rejections until the next block is processed.
        for rejected in &outcome.rejected {
            self.rejected_txns.insert(*rejected);
            limit_hash_set(&mut self.rejected_txns, MAX_REJECTED_TXNS);
        }
        metrics::set_tx_requests_in_flight(self.requested_txns.len());
        metrics::set_rejected_tx_cache(self.rejected_txns.len());

        // Advertise missing parents back at the sender; it answers with a
        // getdata supplying them.
        if !outcome.missing_parents.is_empty() {
            let invs = outcome
                .missing_parents
                .iter()
                .map(|hash| InvVect::tx(*hash))
                .collect();
            peer.queue_message(PeerMessage::Inv(invs));
        }

        if let Some(err) = &outcome.error {
            if let Some((code, reason)) = err.reject() {
                peer.push_reject("tx", code, reason, &tx_hash, false);
                debug!(tx = %tx_hash, peer = %peer.addr(), error = %err, "rejecting transaction");
                return;
            }
            warn!(tx = %tx_hash, error = %err, "failed to process transaction");
            return;
        }

        let mut entries = Vec::with_capacity(outcome.accepted.len());
        for accepted in &outcome.accepted {
            let hash = accepted.hash();
            match self.mempool.entry(&hash) {
                Some(entry) => entries.push(entry),
                None => panic!("accepted transaction {hash} missing from mempool"),
            }
        }
        self.notifier.announce_new_transactions(&entries);
    }
}
