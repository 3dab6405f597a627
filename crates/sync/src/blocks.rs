//! Block ingress: provenance checks, processing, window refill.

use crate::config::Network;
use crate::error::ProcessError;
use crate::manager::SyncWorker;
use crate::metrics;
use crate::peer::PeerId;
use ferrum_types::Block;
use tracing::{debug, error, trace, warn};

impl SyncWorker {
    /// Handle a block message from a peer.
    pub(crate) fn handle_block(&mut self, peer_id: PeerId, block: Block, raw_len: usize) {
        let Some(state) = self.peer_states.get(&peer_id) else {
            warn!(peer = peer_id, "received block message from unknown peer");
            return;
        };
        let peer = state.peer.clone();
        let block_hash = block.hash();

        if !state.requested_blocks.contains(&block_hash) {
            // The regression test deliberately sends duplicate blocks to
            // exercise duplicate insertion, so the chain code must still see
            // them there.
            if self.params.network != Network::Regtest {
                warn!(
                    block = %block_hash,
                    peer = %peer.addr(),
                    "got unrequested block, disconnecting"
                );
                peer.disconnect();
                return;
            }
        }

        // Blocks from whitelisted peers are processed even when unrequested,
        // once we are no longer bulk-syncing.
        let from_whitelist = peer.is_whitelisted() && !self.chain.is_initial_block_download();
        let requested = self.requested_blocks.contains_key(&block_hash);

        // Drop the hash from the request maps either way: the chain will
        // know the block, or the insert fails and the next inv retries it.
        if let Some(state) = self.peer_states.get_mut(&peer_id) {
            state.requested_blocks.remove(&block_hash);
        }
        self.requested_blocks.remove(&block_hash);
        metrics::set_blocks_in_flight(self.requested_blocks.len());
        peer.set_stalling_since(0);

        trace!(block = %block_hash, bytes = raw_len, peer = peer_id, "processing block");
        if let Err(err) = self
            .block_processor
            .process_block(&block, requested || from_whitelist)
        {
            if let Some((code, reason)) = err.reject() {
                peer.push_reject("block", code, reason, &block_hash, false);
                debug!(block = %block_hash, error = %err, "block rejected");
            } else {
                error!(block = %block_hash, error = %err, "block processing failed");
            }

            let idle = self
                .peer_states
                .get(&peer_id)
                .is_some_and(|state| state.requested_blocks.is_empty());
            if idle {
                self.fetch_blocks_from(peer_id);
            }
            return;
        }

        let best = self.chain.tip();
        self.progress.log_block(&block, best.height);
        metrics::inc_blocks_processed();

        // A processed block invalidates the rejection memory: conflicts that
        // made transactions unacceptable may be gone now.
        self.rejected_txns.clear();
        metrics::set_rejected_tx_cache(0);

        // Refresh this peer's height for future sync-peer candidacy, and
        // only fan the update out when it will not be spammy.
        if best.height != 0 {
            peer.update_last_block_height(best.height);
            if self.current() && self.sync_peer == Some(peer_id) {
                self.notifier
                    .update_peer_heights(&best.hash, best.height, peer_id);
                debug!("requesting mempool after accepted block");
                peer.request_mempool();
            }
        }

        self.fetch_blocks_from(peer_id);
    }

    /// Process a locally mined block submitted through the node.
    pub(crate) fn handle_mined_block(&mut self, block: Block) -> Result<(), ProcessError> {
        let block_hash = block.hash();
        match self.block_processor.process_block(&block, true) {
            Ok(_) => {
                debug!(block = %block_hash, "processed locally mined block");
                Ok(())
            }
            Err(err) => {
                error!(block = %block_hash, error = %err, "failed to process mined block");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectCode;
    use crate::mock::{MockNode, MockPeer, SentMessage};
    use crate::peer::SyncPeer;
    use ferrum_types::{BlockHeader, Hash, InvVect};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn worker(node: &MockNode, network: Network) -> SyncWorker {
        SyncWorker::new(node.config(network), Arc::new(AtomicBool::new(false)))
    }

    fn block_with_parent(parent: Hash) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                prev_block: parent,
                merkle_root: Hash::compute(b"merkle"),
                time: 1_600_000_000,
                bits: 0x1d00ffff,
                nonce: 7,
            },
            txs: Vec::new(),
        }
    }

    #[test]
    fn test_unrequested_block_disconnects_peer() {
        let node = MockNode::new();
        let mut worker = worker(&node, Network::Mainnet);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());

        worker.handle_block(1, block_with_parent(node.chain.genesis_hash()), 100);

        assert!(peer.is_disconnected());
        assert!(node.block_processor.processed().is_empty());
    }

    #[test]
    fn test_unrequested_block_tolerated_on_regtest() {
        let node = MockNode::new();
        let mut worker = worker(&node, Network::Regtest);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());

        worker.handle_block(1, block_with_parent(node.chain.genesis_hash()), 100);

        assert!(!peer.is_disconnected());
        assert_eq!(node.block_processor.processed().len(), 1);
        // Unrequested and not whitelisted: processing is not forced.
        assert!(!node.block_processor.processed()[0].1);
    }

    #[test]
    fn test_accepted_block_clears_reject_cache_and_refills() {
        // S6: a processed block empties the rejection memory, and a
        // re-announce of the previously rejected tx is requested again.
        let node = MockNode::new();
        let mut worker = worker(&node, Network::Mainnet);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());

        let rejected_tx = Hash::compute(b"rejected-tx");
        worker.rejected_txns.insert(rejected_tx);

        // Suppressed while the rejection memory holds the hash.
        peer.clear_sent();
        worker.handle_inv(1, vec![InvVect::tx(rejected_tx)]);
        assert!(peer.requested_data().is_empty());

        let block = block_with_parent(node.chain.genesis_hash());
        let block_hash = block.hash();
        worker.requested_blocks.insert(block_hash, 1);
        if let Some(state) = worker.peer_states.get_mut(&1) {
            state.requested_blocks.insert(block_hash);
        }

        worker.handle_block(1, block, 100);
        worker.assert_invariants();

        assert!(worker.rejected_txns.is_empty());
        assert!(!worker.requested_blocks.contains_key(&block_hash));
        // Forced: the block was requested.
        assert_eq!(node.block_processor.processed(), vec![(block_hash, true)]);

        // The same tx announced again is now fetched.
        peer.clear_sent();
        worker.handle_inv(1, vec![InvVect::tx(rejected_tx)]);
        assert_eq!(peer.requested_data(), vec![InvVect::tx(rejected_tx)]);
    }

    #[test]
    fn test_block_arrival_clears_stall_clock() {
        let node = MockNode::new();
        let mut worker = worker(&node, Network::Mainnet);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());

        let block = block_with_parent(node.chain.genesis_hash());
        let block_hash = block.hash();
        worker.requested_blocks.insert(block_hash, 1);
        if let Some(state) = worker.peer_states.get_mut(&1) {
            state.requested_blocks.insert(block_hash);
        }
        peer.set_stalling_since(123_456);

        worker.handle_block(1, block, 100);
        assert_eq!(peer.stalling_since(), 0);
    }

    #[test]
    fn test_rejected_block_pushes_reject_and_refills_idle_peer() {
        let node = MockNode::new();
        let mut worker = worker(&node, Network::Mainnet);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        let block = block_with_parent(node.chain.genesis_hash());
        let block_hash = block.hash();
        worker.requested_blocks.insert(block_hash, 1);
        if let Some(state) = worker.peer_states.get_mut(&1) {
            state.requested_blocks.insert(block_hash);
        }
        node.block_processor
            .push_result(Err(ProcessError::rejected(RejectCode::Invalid, "bad-txns")));

        worker.handle_block(1, block, 100);
        worker.assert_invariants();

        let reject = peer.sent().into_iter().find_map(|m| match m {
            SentMessage::Reject { command, code, .. } => Some((command, code)),
            _ => None,
        });
        let (command, code) = reject.expect("reject pushed");
        assert_eq!(command, "block");
        assert_eq!(code, RejectCode::Invalid);
        // The rejection memory is only cleared on success.
        assert!(!peer.is_disconnected());
    }

    #[test]
    fn test_mined_block_forces_processing() {
        let node = MockNode::new();
        let mut worker = worker(&node, Network::Mainnet);

        let block = block_with_parent(node.chain.genesis_hash());
        let block_hash = block.hash();
        assert!(worker.handle_mined_block(block).is_ok());
        assert_eq!(node.block_processor.processed(), vec![(block_hash, true)]);
    }

    #[test]
    fn test_mined_block_propagates_error() {
        let node = MockNode::new();
        let mut worker = worker(&node, Network::Mainnet);
        node.block_processor
            .push_result(Err(ProcessError::internal("disk full")));

        let block = block_with_parent(node.chain.genesis_hash());
        assert!(worker.handle_mined_block(block).is_err());
    }

    #[test]
    fn test_sync_peer_block_when_current_updates_heights() {
        let node = MockNode::new();
        // Active chain needs nonzero height for the update fan-out.
        let genesis = node.chain.genesis_hash();
        let active = node.chain.add_index_chain(&genesis, 1);
        node.chain.connect_to_active(&active[0]);
        node.chain.set_current(true);

        let mut worker = worker(&node, Network::Mainnet);
        let peer = MockPeer::new(1, 1);
        worker.handle_new_peer(peer.clone());
        assert_eq!(worker.sync_peer, Some(1));

        let block = block_with_parent(active[0]);
        let block_hash = block.hash();
        worker.requested_blocks.insert(block_hash, 1);
        if let Some(state) = worker.peer_states.get_mut(&1) {
            state.requested_blocks.insert(block_hash);
        }

        worker.handle_block(1, block, 100);

        assert_eq!(peer.last_block(), 1);
        assert_eq!(node.notifier.height_updates().len(), 1);
        assert_eq!(peer.mempool_requests(), 2);
    }
}
