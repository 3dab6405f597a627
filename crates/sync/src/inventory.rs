//! Inventory classification and inv message handling.

use crate::manager::{SyncWorker, MAX_REQUESTED_TXNS};
use crate::message::PeerMessage;
use crate::metrics;
use crate::peer::{limit_hash_set, PeerId};
use crate::view::{ChainView, MempoolView, UtxoView};
use ferrum_types::{InvType, InvVect, OutPoint, MAX_INV_PER_MSG};
use tracing::{debug, info, trace, warn};

/// Whether the inventory is already known locally.
///
/// Blocks count as known once their data is stored. Transactions count as
/// known when in the mempool or orphan pool, or when either of their first
/// two outputs is unspent; probing only indices 0 and 1 is an intentional
/// fast heuristic. Unsupported types claim known so they are never requested.
pub(crate) fn have_inventory(
    chain: &dyn ChainView,
    mempool: &dyn MempoolView,
    utxo: &dyn UtxoView,
    inv: &InvVect,
) -> bool {
    match inv.inv_type {
        InvType::Block => chain
            .find_block_index(&inv.hash)
            .is_some_and(|entry| entry.has_data),
        InvType::Tx => {
            if mempool.contains(&inv.hash) {
                return true;
            }
            if utxo.have_coin(&OutPoint::new(inv.hash, 0)) {
                return true;
            }
            if utxo.have_coin(&OutPoint::new(inv.hash, 1)) {
                return true;
            }
            mempool.contains_orphan(&inv.hash)
        }
        _ => true,
    }
}

impl SyncWorker {
    /// Examine the inventory a peer advertised and request what we lack.
    pub(crate) fn handle_inv(&mut self, peer_id: PeerId, invs: Vec<InvVect>) {
        let Some(state) = self.peer_states.get(&peer_id) else {
            warn!(peer = peer_id, "received inv message from unknown peer");
            return;
        };
        let peer = state.peer.clone();
        trace!(
            count = invs.len(),
            ibd = self.chain.is_initial_block_download(),
            "received inv message"
        );

        // Find the final block announcement in the list, if there is one.
        let last_block = invs.iter().rposition(|inv| inv.inv_type == InvType::Block);
        if let Some(idx) = last_block {
            peer.check_revert_to_inv(&invs[idx].hash, true);
        }

        let current = self.current();
        if let Some(idx) = last_block {
            // Remember the announcement unless it came from the sync peer
            // while we are still behind; it feeds later height updates.
            if self.sync_peer != Some(peer_id) || current {
                peer.update_last_announced_block(&invs[idx].hash);
            }
            if current {
                if let Some(entry) = self.chain.find_hash_in_active(&invs[idx].hash) {
                    peer.update_last_block_height(entry.height);
                }
            }
        }

        let mut inv_block_count = 0usize;
        let mut to_queue: Vec<InvVect> = Vec::new();
        for inv in &invs {
            match inv.inv_type {
                InvType::Block => inv_block_count += 1,
                InvType::Tx => {}
                _ => continue,
            }

            peer.add_known_inventory(inv);

            if !have_inventory(&*self.chain, &*self.mempool, &*self.utxo, inv) {
                if inv.inv_type == InvType::Tx && self.rejected_txns.contains(&inv.hash) {
                    continue;
                }
                to_queue.push(*inv);
            }
        }
        debug!(
            blocks = inv_block_count,
            total = invs.len(),
            peer = %peer.addr(),
            "classified advertised inventory"
        );

        // Request as much as fits; the remainder of the queue is drained on
        // the next inv message.
        let mut getdata: Vec<InvVect> = Vec::new();
        let mut num_requested = 0usize;
        if let Some(state) = self.peer_states.get_mut(&peer_id) {
            state.request_queue.extend(to_queue);
            while let Some(inv) = state.request_queue.pop_front() {
                match inv.inv_type {
                    InvType::Block => {
                        if !self.requested_blocks.contains_key(&inv.hash) {
                            // Headers-first: solicit the path to the block
                            // rather than the block itself.
                            let best = self
                                .chain
                                .best_header()
                                .unwrap_or_else(|| self.chain.tip());
                            info!(
                                height = peer.last_block(),
                                peer = %peer.addr(),
                                "requesting headers toward announced block"
                            );
                            peer.push_get_headers(self.chain.locator(&best.hash), inv.hash);
                        }
                    }
                    InvType::Tx => {
                        if !self.requested_txns.contains(&inv.hash) {
                            self.requested_txns.insert(inv.hash);
                            limit_hash_set(&mut self.requested_txns, MAX_REQUESTED_TXNS);
                            state.requested_txns.insert(inv.hash);
                            getdata.push(inv);
                            num_requested += 1;
                        }
                    }
                    _ => {}
                }

                if num_requested >= MAX_INV_PER_MSG {
                    break;
                }
            }
        }
        metrics::set_tx_requests_in_flight(self.requested_txns.len());

        if !getdata.is_empty() {
            peer.queue_message(PeerMessage::GetData(getdata));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::mock::{MockNode, MockPeer, SentMessage};
    use crate::peer::SyncPeer;
    use ferrum_types::Hash;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn worker(node: &MockNode) -> SyncWorker {
        SyncWorker::new(node.config(Network::Mainnet), Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_have_inventory_block_requires_data() {
        let node = MockNode::new();
        let genesis = node.chain.genesis_hash();
        let headers = node.chain.add_index_chain(&genesis, 1);

        assert!(have_inventory(
            &*node.chain,
            &*node.mempool,
            &*node.utxo,
            &InvVect::block(genesis)
        ));
        // Known header without data is not "have".
        assert!(!have_inventory(
            &*node.chain,
            &*node.mempool,
            &*node.utxo,
            &InvVect::block(headers[0])
        ));
        assert!(!have_inventory(
            &*node.chain,
            &*node.mempool,
            &*node.utxo,
            &InvVect::block(Hash::compute(b"unknown"))
        ));
    }

    #[test]
    fn test_have_inventory_tx_probes_first_two_outputs() {
        let node = MockNode::new();
        let tx_hash = Hash::compute(b"spent-tx");

        assert!(!have_inventory(
            &*node.chain,
            &*node.mempool,
            &*node.utxo,
            &InvVect::tx(tx_hash)
        ));

        node.utxo.add_coin(OutPoint::new(tx_hash, 1));
        assert!(have_inventory(
            &*node.chain,
            &*node.mempool,
            &*node.utxo,
            &InvVect::tx(tx_hash)
        ));

        // A coin at index 2 alone is invisible to the heuristic.
        let other = Hash::compute(b"deep-output-tx");
        node.utxo.add_coin(OutPoint::new(other, 2));
        assert!(!have_inventory(
            &*node.chain,
            &*node.mempool,
            &*node.utxo,
            &InvVect::tx(other)
        ));
    }

    #[test]
    fn test_have_inventory_orphan_pool_counts() {
        let node = MockNode::new();
        let tx_hash = Hash::compute(b"orphan");
        node.mempool.add_orphan(tx_hash);
        assert!(have_inventory(
            &*node.chain,
            &*node.mempool,
            &*node.utxo,
            &InvVect::tx(tx_hash)
        ));
    }

    #[test]
    fn test_have_inventory_unsupported_types_claim_known() {
        let node = MockNode::new();
        let inv = InvVect {
            inv_type: InvType::FilteredBlock,
            hash: Hash::compute(b"whatever"),
        };
        assert!(have_inventory(&*node.chain, &*node.mempool, &*node.utxo, &inv));
    }

    #[test]
    fn test_block_inv_triggers_getheaders_not_getdata() {
        let node = MockNode::new();
        let mut worker = worker(&node);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        let announced = Hash::compute(b"new-block");
        worker.handle_inv(1, vec![InvVect::block(announced)]);
        worker.assert_invariants();

        assert!(peer.requested_data().is_empty());
        let get_headers = peer.sent().into_iter().find_map(|m| match m {
            SentMessage::GetHeaders { stop_hash, .. } => Some(stop_hash),
            _ => None,
        });
        assert_eq!(get_headers, Some(announced));
    }

    #[test]
    fn test_tx_inv_requests_getdata_once() {
        let node = MockNode::new();
        let mut worker = worker(&node);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        let tx_hash = Hash::compute(b"announced-tx");
        worker.handle_inv(1, vec![InvVect::tx(tx_hash)]);
        worker.assert_invariants();

        assert_eq!(peer.requested_data(), vec![InvVect::tx(tx_hash)]);
        assert!(worker.requested_txns.contains(&tx_hash));
        assert!(peer.knows_inventory(&InvVect::tx(tx_hash)));
    }

    #[test]
    fn test_rejected_tx_inv_is_suppressed() {
        // Second half of S5: a rejected hash is never requested again.
        let node = MockNode::new();
        let mut worker = worker(&node);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        let tx_hash = Hash::compute(b"bad-tx");
        worker.rejected_txns.insert(tx_hash);

        worker.handle_inv(1, vec![InvVect::tx(tx_hash)]);
        worker.assert_invariants();

        assert!(peer.requested_data().is_empty());
        assert!(worker.requested_txns.is_empty());
    }

    #[test]
    fn test_known_tx_inv_not_requested() {
        let node = MockNode::new();
        let mut worker = worker(&node);
        let peer = MockPeer::new(1, 10);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        let tx = ferrum_types::Transaction {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        };
        let tx_hash = tx.hash();
        node.mempool.insert(tx);

        worker.handle_inv(1, vec![InvVect::tx(tx_hash)]);
        assert!(peer.requested_data().is_empty());
    }

    #[test]
    fn test_inv_updates_height_when_current() {
        let node = MockNode::new();
        let genesis = node.chain.genesis_hash();
        let blocks = node.chain.add_index_chain(&genesis, 2);
        for hash in &blocks {
            node.chain.connect_to_active(hash);
        }
        node.chain.set_current(true);

        let mut worker = worker(&node);
        let peer = MockPeer::new(1, 0);
        worker.handle_new_peer(peer.clone());

        worker.handle_inv(1, vec![InvVect::block(blocks[1])]);
        assert_eq!(peer.last_block(), 2);
    }
}
