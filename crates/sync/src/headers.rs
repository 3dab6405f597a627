//! Headers-first synchronization pipeline.

use crate::fetch::MAX_BLOCKS_IN_TRANSIT_PER_PEER;
use crate::manager::SyncWorker;
use crate::message::PeerMessage;
use crate::metrics;
use crate::peer::{PeerId, SyncPeer};
use crate::view::BlockIndexEntry;
use ferrum_types::{BlockHeader, Hash, InvVect, MAX_BLOCK_HEADERS_PER_MSG};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of unconnecting header messages tolerated before each misbehavior
/// report.
pub const MAX_UNCONNECTING_HEADERS: u32 = 10;

/// Whether each header's previous-block hash matches its predecessor's hash.
fn is_continuous(headers: &[BlockHeader]) -> bool {
    headers
        .windows(2)
        .all(|pair| pair[1].prev_block == pair[0].hash())
}

impl SyncWorker {
    /// Handle a headers message from a peer.
    pub(crate) fn handle_headers(&mut self, peer_id: PeerId, headers: Vec<BlockHeader>) {
        let Some(state) = self.peer_states.get(&peer_id) else {
            warn!(peer = peer_id, "received headers from unknown peer");
            return;
        };
        let peer = state.peer.clone();
        info!(count = headers.len(), peer = %peer.addr(), "received block headers");

        if headers.is_empty() {
            self.fetch_blocks_from(peer_id);
            return;
        }

        if self.chain.find_block_index(&headers[0].prev_block).is_none() {
            self.handle_unconnected_headers(peer_id, &peer);
            return;
        }

        if !is_continuous(&headers) {
            warn!(peer = %peer.addr(), "received non-continuous headers, disconnecting");
            peer.disconnect();
            return;
        }

        let current = self.current();
        let peer_tip = self.note_announced_headers(&peer, &headers, current);

        let last_index = match self.header_processor.process_headers(&headers) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    begin = %headers[0].hash(),
                    end = %peer_tip,
                    error = %err,
                    "header processing failed"
                );
                return;
            }
        };
        metrics::add_headers_processed(headers.len());

        if let Some(state) = self.peer_states.get_mut(&peer_id) {
            if state.unconnecting_headers > 0 {
                info!(
                    peer = peer_id,
                    from = state.unconnecting_headers,
                    "resetting unconnecting headers counter"
                );
                state.unconnecting_headers = 0;
            }
        }

        let has_more = headers.len() == MAX_BLOCK_HEADERS_PER_MSG;
        if has_more && self.sync_peer == Some(peer_id) {
            if let Some(entry) = self.chain.find_block_index(&peer_tip) {
                info!(height = entry.height, peer = %peer.addr(), "requesting next headers batch");
                peer.push_get_headers(self.chain.locator(&entry.hash), Hash::ZERO);
            }
        }

        // Download as much as possible only when the batch is valid and ends
        // in a block with at least as much work as our tip.
        if !last_index.valid_tree {
            info!(block = %last_index.hash, "last header not tree-valid, not fetching");
            return;
        }
        if self.chain.tip().work > last_index.work {
            info!("headers do not improve on tip work, not fetching");
            return;
        }

        if self.chain.can_direct_fetch() {
            let (to_fetch, large_reorg) = self.blocks_to_fetch(&last_index);
            if large_reorg {
                info!(
                    target = %last_index.hash,
                    height = last_index.height,
                    "reorg too deep, falling back to windowed fetch"
                );
                self.fetch_blocks_from(peer_id);
                return;
            }
            self.fetch_direct(peer_id, &peer, to_fetch);
            return;
        }

        if self.peer_states.len() <= 2 {
            self.fetch_blocks_from(peer_id);
        }
    }

    /// A headers message whose first header does not connect to our index.
    ///
    /// Solicit headers from our best known header instead; repeated
    /// unconnecting batches earn the peer ban score.
    fn handle_unconnected_headers(&mut self, peer_id: PeerId, peer: &Arc<dyn SyncPeer>) {
        let ibd = self.chain.is_initial_block_download();

        // A functional-test peer can report height -1 and never win sync-peer
        // election; adopt the header source if nothing is elected yet.
        if ibd && self.sync_peer.is_none() {
            if self
                .peer_states
                .get(&peer_id)
                .is_some_and(|state| state.sync_candidate)
            {
                self.sync_peer = Some(peer_id);
            }
        }

        if ibd && self.sync_peer != Some(peer_id) {
            debug!(
                peer = %peer.addr(),
                "unconnected headers from non-sync peer during initial download, trying blocks instead"
            );
            self.fetch_blocks_from(peer_id);
            return;
        }

        let Some(state) = self.peer_states.get_mut(&peer_id) else {
            return;
        };
        state.unconnecting_headers += 1;
        let unconnecting = state.unconnecting_headers;

        let best = self.best_header_or_tip();
        peer.push_get_headers(self.chain.locator(&best.hash), Hash::ZERO);
        debug!(
            height = best.height,
            peer = %peer.addr(),
            ibd,
            unconnecting,
            "headers cannot connect, requesting from best header"
        );

        if unconnecting % MAX_UNCONNECTING_HEADERS == 0 {
            self.misbehaving(&peer.addr(), 20, "too-many-unconnected-headers");
        }
    }

    /// Record the batch in the peer's known inventory and update its
    /// announced block; returns the batch's final hash.
    fn note_announced_headers(
        &self,
        peer: &Arc<dyn SyncPeer>,
        headers: &[BlockHeader],
        current: bool,
    ) -> Hash {
        for header in headers {
            peer.add_known_inventory(&InvVect::block(header.hash()));
        }

        let peer_tip = headers[headers.len() - 1].hash();
        peer.update_last_announced_block(&peer_tip);
        if current {
            if let Some(entry) = self.chain.find_hash_in_active(&peer_tip) {
                peer.update_last_block_height(entry.height);
            }
        }
        peer_tip
    }

    /// Blocks needed to switch to `last`, ancestor-first, walking back until
    /// the active chain is reached or the per-peer transit cap is exceeded.
    ///
    /// The second value is true when the walk failed to reach the active
    /// chain, i.e. switching would be a large reorganization.
    pub(crate) fn blocks_to_fetch(&self, last: &BlockIndexEntry) -> (Vec<BlockIndexEntry>, bool) {
        let mut to_fetch: VecDeque<BlockIndexEntry> = VecDeque::new();
        let mut walk = Some(*last);

        loop {
            match walk {
                Some(entry)
                    if !self.chain.contains(&entry.hash)
                        && to_fetch.len() <= MAX_BLOCKS_IN_TRANSIT_PER_PEER =>
                {
                    if !entry.has_data && !self.requested_blocks.contains_key(&entry.hash) {
                        to_fetch.push_front(entry);
                    }
                    walk = entry.prev.and_then(|hash| self.chain.find_block_index(&hash));
                }
                _ => break,
            }
        }

        let large_reorg = !walk.is_some_and(|entry| self.chain.contains(&entry.hash));
        (to_fetch.into(), large_reorg)
    }

    /// Issue a direct getdata for blocks discovered through headers,
    /// earliest first, up to the per-peer transit cap.
    pub(crate) fn fetch_direct(
        &mut self,
        peer_id: PeerId,
        peer: &Arc<dyn SyncPeer>,
        to_fetch: Vec<BlockIndexEntry>,
    ) {
        let mut invs = Vec::new();
        if let Some(state) = self.peer_states.get_mut(&peer_id) {
            for entry in &to_fetch {
                if state.requested_blocks.len() >= MAX_BLOCKS_IN_TRANSIT_PER_PEER {
                    break;
                }
                state.requested_blocks.insert(entry.hash);
                invs.push(InvVect::block(entry.hash));
                debug!(block = %entry.hash, peer = peer_id, "requesting block");
            }
        }
        for inv in &invs {
            self.requested_blocks.insert(inv.hash, peer_id);
        }

        if !invs.is_empty() {
            debug!(toward = %invs[0].hash, "downloading blocks via headers direct fetch");
            metrics::set_blocks_in_flight(self.requested_blocks.len());
            peer.queue_message(PeerMessage::GetData(invs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::error::ProcessError;
    use crate::mock::{MockNode, MockPeer, SentMessage};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn worker(node: &MockNode) -> SyncWorker {
        SyncWorker::new(node.config(Network::Mainnet), Arc::new(AtomicBool::new(false)))
    }

    /// Contiguous headers chained onto `parent`.
    fn make_headers(parent: Hash, count: usize) -> Vec<BlockHeader> {
        let mut headers = Vec::with_capacity(count);
        let mut prev = parent;
        for i in 0..count {
            let header = BlockHeader {
                version: 1,
                prev_block: prev,
                merkle_root: Hash::compute(&(i as u64).to_le_bytes()),
                time: 1_600_000_000 + i as u32,
                bits: 0x1d00ffff,
                nonce: i as u32,
            };
            prev = header.hash();
            headers.push(header);
        }
        headers
    }

    #[test]
    fn test_headers_direct_fetch_deduplicates_across_peers() {
        // S2: two peers deliver the same header; only the first schedules
        // the block, the second's walk skips the in-flight hash.
        let node = MockNode::new();
        node.chain.set_direct_fetch(true);
        let mut worker = worker(&node);

        let peer_a = MockPeer::new(1, 1);
        let peer_b = MockPeer::new(2, 1);
        worker.handle_new_peer(peer_a.clone());
        worker.handle_new_peer(peer_b.clone());
        peer_a.clear_sent();
        peer_b.clear_sent();

        let headers = make_headers(node.chain.genesis_hash(), 1);
        let block_hash = headers[0].hash();

        worker.handle_headers(1, headers.clone());
        worker.assert_invariants();
        assert_eq!(peer_a.requested_data(), vec![InvVect::block(block_hash)]);
        assert_eq!(worker.requested_blocks.get(&block_hash), Some(&1));

        worker.handle_headers(2, headers);
        worker.assert_invariants();
        assert!(peer_b.requested_data().is_empty());
        assert_eq!(worker.requested_blocks.get(&block_hash), Some(&1));
        let b_state = worker.peer_states.get(&2).expect("peer b state");
        assert!(b_state.requested_blocks.is_empty());
    }

    #[test]
    fn test_unconnecting_headers_ban_threshold() {
        // S4: ten unconnecting batches earn exactly one misbehavior report.
        let node = MockNode::new();
        node.chain.set_ibd(false);
        let mut worker = worker(&node);

        let peer = MockPeer::new(1, 100);
        worker.handle_new_peer(peer.clone());

        let orphan_parent = Hash::compute(b"unknown-parent");
        for _ in 0..MAX_UNCONNECTING_HEADERS {
            worker.handle_headers(1, make_headers(orphan_parent, 1));
            worker.assert_invariants();
        }

        let state = worker.peer_states.get(&1).expect("peer state");
        assert_eq!(state.unconnecting_headers, MAX_UNCONNECTING_HEADERS);

        let reports = node.ban_score.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, peer.addr());
        assert_eq!(reports[0].1, 20);
        assert_eq!(reports[0].2, "too-many-unconnected-headers");
    }

    #[test]
    fn test_connecting_batch_resets_unconnecting_counter() {
        let node = MockNode::new();
        node.chain.set_ibd(false);
        let mut worker = worker(&node);
        worker.handle_new_peer(MockPeer::new(1, 100));

        worker.handle_headers(1, make_headers(Hash::compute(b"unknown"), 1));
        assert_eq!(
            worker.peer_states.get(&1).expect("state").unconnecting_headers,
            1
        );

        worker.handle_headers(1, make_headers(node.chain.genesis_hash(), 2));
        assert_eq!(
            worker.peer_states.get(&1).expect("state").unconnecting_headers,
            0
        );
    }

    #[test]
    fn test_non_continuous_headers_disconnect() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        let peer = MockPeer::new(1, 100);
        worker.handle_new_peer(peer.clone());

        let mut headers = make_headers(node.chain.genesis_hash(), 3);
        headers[2].prev_block = Hash::compute(b"severed");
        worker.handle_headers(1, headers);

        assert!(peer.is_disconnected());
    }

    #[test]
    fn test_header_processing_failure_stops_pipeline() {
        let node = MockNode::new();
        node.chain.set_direct_fetch(true);
        let mut worker = worker(&node);

        let peer = MockPeer::new(1, 100);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        node.header_processor
            .fail_next(ProcessError::internal("bad header"));
        worker.handle_headers(1, make_headers(node.chain.genesis_hash(), 1));

        assert!(peer.requested_data().is_empty());
        assert_eq!(
            worker.peer_states.get(&1).expect("state").unconnecting_headers,
            0
        );
    }

    #[test]
    fn test_large_reorg_falls_back_to_windowed_fetch() {
        let node = MockNode::new();
        node.chain.set_direct_fetch(true);
        let mut worker = worker(&node);

        let peer = MockPeer::new(1, 100);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        // A batch longer than the transit cap whose walk cannot reach the
        // active chain within the cap.
        let headers = make_headers(
            node.chain.genesis_hash(),
            MAX_BLOCKS_IN_TRANSIT_PER_PEER + 3,
        );
        worker.handle_headers(1, headers.clone());
        worker.assert_invariants();

        // Direct fetch was abandoned; the windowed scheduler took over and
        // scheduled from the start of the window instead.
        let requested = peer.requested_data();
        assert_eq!(requested.len(), MAX_BLOCKS_IN_TRANSIT_PER_PEER);
        assert_eq!(requested[0].hash, headers[0].hash());
    }

    #[test]
    fn test_full_batch_requests_continuation_from_sync_peer() {
        let node = MockNode::new();
        node.chain.set_ibd(true);
        let mut worker = worker(&node);

        let peer = MockPeer::new(1, 5_000);
        worker.handle_new_peer(peer.clone());
        assert_eq!(worker.sync_peer, Some(1));
        peer.clear_sent();

        let headers = make_headers(node.chain.genesis_hash(), MAX_BLOCK_HEADERS_PER_MSG);
        let tip_hash = headers[headers.len() - 1].hash();
        worker.handle_headers(1, headers);

        let continuation = peer.sent().into_iter().find_map(|m| match m {
            SentMessage::GetHeaders { locator, stop_hash } => Some((locator, stop_hash)),
            _ => None,
        });
        let (locator, stop_hash) = continuation.expect("continuation getheaders");
        assert_eq!(locator, vec![tip_hash]);
        assert_eq!(stop_hash, Hash::ZERO);
    }

    #[test]
    fn test_empty_headers_triggers_block_fetch_only() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        let peer = MockPeer::new(1, 0);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        worker.handle_headers(1, Vec::new());
        // No announced block known: the scheduler solicits headers.
        assert_eq!(peer.get_headers_count(), 1);
    }
}
