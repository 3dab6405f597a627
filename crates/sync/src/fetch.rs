//! Parallel block-download scheduling and stall detection.

use crate::manager::SyncWorker;
use crate::metrics;
use crate::peer::{PeerId, SyncPeer};
use crate::view::BlockIndexEntry;
use ferrum_types::{Hash, InvVect};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, trace};

/// Number of blocks that can be requested from a single peer at once.
pub const MAX_BLOCKS_IN_TRANSIT_PER_PEER: usize = 16;

/// Size of the block download window: how far ahead of the last block we
/// have in common with a peer we are willing to fetch. Larger windows
/// tolerate larger speed differences between peers at the cost of more
/// disordered blocks on disk.
pub const BLOCK_DOWNLOAD_WINDOW: i32 = 1024;

/// Microseconds a peer may stall the download window before disconnection.
pub const BLOCK_STALLING_TIMEOUT_MICROS: i64 = 2_000_000;

/// Reserved request timeout for a higher-level timeout layer; the core only
/// enforces the stall window.
pub const BLOCK_REQUEST_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Ancestor-walk slab size; fetching this many index entries at a time
/// amortizes the cost of `ChainView::ancestor`.
const ANCESTOR_SLAB: i32 = 128;

pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

impl SyncWorker {
    /// Periodic pass over all candidate peers: disconnect the ones stalling
    /// the download window, top up everyone else.
    pub(crate) fn scan_for_fetch(&mut self) {
        let now = now_micros();
        let candidates: Vec<PeerId> = self
            .peer_states
            .iter()
            .filter(|(_, state)| state.sync_candidate)
            .map(|(id, _)| *id)
            .collect();

        for peer_id in candidates {
            let mut wants_fetch = false;
            if let Some(state) = self.peer_states.get(&peer_id) {
                let peer = &state.peer;
                let stalling_since = peer.stalling_since();
                if stalling_since != 0 && stalling_since < now - BLOCK_STALLING_TIMEOUT_MICROS {
                    // The window should normally dwarf the in-flight set, so
                    // this only triggers during initial block download.
                    info!(
                        peer = peer_id,
                        addr = %peer.addr(),
                        "peer is stalling block download, disconnecting"
                    );
                    peer.disconnect();
                    metrics::inc_stall_disconnects();
                    continue;
                }
                wants_fetch = state.requested_blocks.len() < MAX_BLOCKS_IN_TRANSIT_PER_PEER;
            }
            if wants_fetch {
                self.fetch_blocks_from(peer_id);
            }
        }
    }

    /// Request the next blocks to download from this peer, walking its
    /// best-known chain forward within the download window.
    pub(crate) fn fetch_blocks_from(&mut self, peer_id: PeerId) {
        let in_flight = self.requested_blocks.len();
        if in_flight != 0 {
            debug!(in_flight, "blocks currently requested");
        }

        let Some(state) = self.peer_states.get(&peer_id) else {
            error!(peer = peer_id, "block fetch attempted for peer without state");
            return;
        };
        let peer = state.peer.clone();
        let peer_in_flight = state.requested_blocks.len();

        if !self.is_sync_candidate(&*peer) {
            info!(peer = peer_id, addr = %peer.addr(), "peer is not a sync candidate, skipping fetch");
            return;
        }
        if !peer.ver_ack_received() {
            info!(peer = peer_id, addr = %peer.addr(), "peer handshake incomplete, skipping fetch");
            return;
        }
        if peer_in_flight == MAX_BLOCKS_IN_TRANSIT_PER_PEER {
            debug!(peer = peer_id, "peer request window full");
            return;
        }

        let min_work = self.chain.min_chain_work();
        if self.best_header_or_tip().work < min_work {
            info!(peer = peer_id, "best header below minimum chain work, waiting for header download");
            return;
        }

        let Some((start, best_known)) = self.sync_points(&peer) else {
            debug!(peer = peer_id, "no block hashes to fetch from peer");
            return;
        };

        if best_known.work < min_work {
            info!(peer = peer_id, "peer chain below minimum chain work, not using it");
            return;
        }
        if best_known.work < self.chain.tip().work {
            info!(peer = peer_id, "peer chain has nothing interesting");
            return;
        }

        // Never fetch past the best block we know the peer has, nor more than
        // BLOCK_DOWNLOAD_WINDOW + 1 beyond the last linked block we have in
        // common. The +1 lets us detect stalling: the next block would be
        // downloadable if the window were one larger.
        let window_end = start.height + BLOCK_DOWNLOAD_WINDOW;
        let max_height = best_known.height.min(window_end + 1);

        let mut walk = start;
        let mut waiting_for: Option<PeerId> = None;
        let mut to_request: Vec<Hash> = Vec::new();
        let mut hit_window_end = false;

        'walk: while walk.height < max_height {
            let to_fetch = (max_height - walk.height).min(ANCESTOR_SLAB);
            let Some(slab_top) = self.chain.ancestor(&best_known.hash, walk.height + to_fetch)
            else {
                break;
            };

            let mut slab: VecDeque<BlockIndexEntry> = VecDeque::with_capacity(to_fetch as usize);
            slab.push_front(slab_top);
            let mut cursor = slab_top;
            for _ in 1..to_fetch {
                let Some(prev) = cursor
                    .prev
                    .and_then(|hash| self.chain.find_block_index(&hash))
                else {
                    break;
                };
                slab.push_front(prev);
                cursor = prev;
            }
            walk = slab_top;

            for entry in slab {
                if !entry.valid_tree {
                    // The chain this peer is on is invalid.
                    break 'walk;
                }
                if entry.has_data {
                    continue;
                }
                if let Some(owner) = self.requested_blocks.get(&entry.hash) {
                    if waiting_for.is_none() {
                        waiting_for = Some(*owner);
                    }
                    continue;
                }
                if entry.height > window_end {
                    hit_window_end = true;
                    break 'walk;
                }
                to_request.push(entry.hash);
                if peer_in_flight + to_request.len() == MAX_BLOCKS_IN_TRANSIT_PER_PEER {
                    break 'walk;
                }
            }
        }

        if hit_window_end && to_request.is_empty() {
            if let Some(stalling_peer) = waiting_for.filter(|w| *w != peer_id) {
                self.note_window_stalled(stalling_peer, peer_in_flight == 0);
            }
        }

        if to_request.is_empty() {
            return;
        }

        trace!(count = to_request.len(), peer = peer_id, "sending getdata for blocks");
        if let Some(state) = self.peer_states.get_mut(&peer_id) {
            for hash in &to_request {
                state.requested_blocks.insert(*hash);
            }
        }
        for hash in &to_request {
            self.requested_blocks.insert(*hash, peer_id);
        }
        metrics::set_blocks_in_flight(self.requested_blocks.len());

        let invs = to_request.iter().map(|hash| InvVect::block(*hash)).collect();
        peer.queue_message(crate::message::PeerMessage::GetData(invs));
    }

    /// The window cannot advance because `stalling_peer` holds its leading
    /// block; start its stall clock if this peer has nothing else to do.
    fn note_window_stalled(&self, stalling_peer: PeerId, requester_idle: bool) {
        let Some(state) = self.peer_states.get(&stalling_peer) else {
            return;
        };
        info!(
            peer = stalling_peer,
            addr = %state.peer.addr(),
            "download window stalled by peer"
        );
        if !requester_idle {
            return;
        }
        if state.peer.stalling_since() == 0 {
            state.peer.set_stalling_since(now_micros());
            info!(peer = stalling_peer, "stall clock started");
        }
    }

    /// Where to start walking for this peer, and the peer's best known block.
    ///
    /// Returns `None` when the peer's announced best is unknown (headers are
    /// solicited instead) or when its chain offers nothing past ours.
    fn sync_points(&self, peer: &Arc<dyn SyncPeer>) -> Option<(BlockIndexEntry, BlockIndexEntry)> {
        let best_known = match self.last_announced_index(peer) {
            Some(entry) => entry,
            None => {
                // Learn the peer's best block before scheduling from it.
                let locator = self.pre_best_header_locator();
                peer.push_get_headers(locator, Hash::ZERO);
                return None;
            }
        };

        if self.chain.is_initial_block_download() {
            let tip = self.chain.tip();
            if tip.height > best_known.height || tip.work > best_known.work {
                return None;
            }
            return Some((tip, best_known));
        }

        let fork = self.chain.find_fork(&best_known.hash)?;
        Some((fork, best_known))
    }

    fn last_announced_index(&self, peer: &Arc<dyn SyncPeer>) -> Option<BlockIndexEntry> {
        let Some(best_known_hash) = peer.last_announced_block() else {
            info!(peer = peer.id(), "peer best known block not yet learned");
            return None;
        };
        let entry = self.chain.find_block_index(&best_known_hash);
        if entry.is_none() {
            debug!(peer = peer.id(), block = %best_known_hash, "peer best known block missing from index");
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::manager::SyncWorker;
    use crate::mock::{MockNode, MockPeer};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn worker(node: &MockNode) -> SyncWorker {
        SyncWorker::new(node.config(Network::Mainnet), Arc::new(AtomicBool::new(false)))
    }

    /// Chain of headers on top of genesis, best-header marker on the last.
    fn seed_headers(node: &MockNode, count: usize) -> Vec<Hash> {
        let genesis = node.chain.genesis_hash();
        let hashes = node.chain.add_index_chain(&genesis, count);
        node.chain.set_best_header(hashes.last().expect("nonempty"));
        hashes
    }

    #[test]
    fn test_fetch_requests_window_of_blocks() {
        let node = MockNode::new();
        node.chain.set_ibd(true);
        let mut worker = worker(&node);

        let hashes = seed_headers(&node, 40);
        let peer = MockPeer::new(1, 40);
        peer.set_last_announced(*hashes.last().expect("nonempty"));
        worker.handle_new_peer(peer.clone());
        worker.fetch_blocks_from(1);
        worker.assert_invariants();

        let requested = peer.requested_data();
        assert_eq!(requested.len(), MAX_BLOCKS_IN_TRANSIT_PER_PEER);
        // Ancestor-first order starting just past the tip.
        assert_eq!(requested[0].hash, hashes[0]);
        assert_eq!(requested[15].hash, hashes[15]);
        assert_eq!(worker.requested_blocks.len(), MAX_BLOCKS_IN_TRANSIT_PER_PEER);
    }

    #[test]
    fn test_fetch_skips_blocks_in_flight_elsewhere() {
        let node = MockNode::new();
        node.chain.set_ibd(true);
        let mut worker = worker(&node);

        let hashes = seed_headers(&node, 20);
        let tip_hash = *hashes.last().expect("nonempty");

        let peer_a = MockPeer::new(1, 20);
        peer_a.set_last_announced(tip_hash);
        worker.handle_new_peer(peer_a.clone());
        worker.fetch_blocks_from(1);
        let first_batch = peer_a.requested_data();
        assert_eq!(first_batch.len(), MAX_BLOCKS_IN_TRANSIT_PER_PEER);

        let peer_b = MockPeer::new(2, 20);
        peer_b.set_last_announced(tip_hash);
        worker.handle_new_peer(peer_b.clone());
        worker.assert_invariants();

        // B picks up where A's window left off; no hash is double-assigned.
        let second_batch = peer_b.requested_data();
        assert_eq!(second_batch.len(), 4);
        for inv in &second_batch {
            assert!(!first_batch.contains(inv));
        }
    }

    #[test]
    fn test_fetch_respects_min_chain_work() {
        let node = MockNode::new();
        node.chain.set_ibd(true);
        node.chain.set_min_chain_work(10_000);
        let mut worker = worker(&node);

        let hashes = seed_headers(&node, 20);
        let peer = MockPeer::new(1, 20);
        peer.set_last_announced(*hashes.last().expect("nonempty"));
        worker.handle_new_peer(peer.clone());
        worker.fetch_blocks_from(1);

        assert!(peer.requested_data().is_empty());
    }

    #[test]
    fn test_fetch_solicits_headers_for_unknown_best() {
        let node = MockNode::new();
        node.chain.set_ibd(true);
        let mut worker = worker(&node);

        let peer = MockPeer::new(1, 50);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        worker.fetch_blocks_from(1);
        assert_eq!(peer.get_headers_count(), 1);
        assert!(peer.requested_data().is_empty());
    }

    #[test]
    fn test_stall_clock_starts_and_disconnects() {
        // S3: the window's leading block is held by peer A; peer B has no
        // other work, so A's stall clock starts, and after the timeout the
        // periodic scan disconnects A.
        let node = MockNode::new();
        node.chain.set_ibd(true);
        let mut worker = worker(&node);

        let window = BLOCK_DOWNLOAD_WINDOW as usize;
        let hashes = seed_headers(&node, window + 6);
        let tip_hash = *hashes.last().expect("nonempty");

        // Every block inside the window is already stored except the first,
        // which peer A holds in flight.
        for hash in hashes.iter().take(window) {
            node.chain.set_has_data(hash, true);
        }
        node.chain.set_has_data(&hashes[0], false);

        let peer_a = MockPeer::new(1, hashes.len() as i32);
        peer_a.set_last_announced(tip_hash);
        worker.handle_new_peer(peer_a.clone());
        worker.fetch_blocks_from(1);
        assert_eq!(peer_a.requested_data().len(), 1);
        worker.assert_invariants();

        let peer_b = MockPeer::new(2, hashes.len() as i32);
        peer_b.set_last_announced(tip_hash);
        worker.handle_new_peer(peer_b.clone());
        worker.assert_invariants();

        assert!(peer_b.requested_data().is_empty());
        assert_ne!(peer_a.stalling_since(), 0);
        assert!(!peer_a.is_disconnected());

        // Not yet past the timeout: scan keeps the peer.
        worker.scan_for_fetch();
        assert!(!peer_a.is_disconnected());

        // Backdate the stall clock past the timeout.
        peer_a.set_stalling_since(now_micros() - BLOCK_STALLING_TIMEOUT_MICROS - 1);
        worker.scan_for_fetch();
        assert!(peer_a.is_disconnected());
    }

    #[test]
    fn test_invalid_tree_aborts_walk() {
        let node = MockNode::new();
        node.chain.set_ibd(true);
        let mut worker = worker(&node);

        let hashes = seed_headers(&node, 10);
        node.chain.set_valid_tree(&hashes[2], false);

        let peer = MockPeer::new(1, 10);
        peer.set_last_announced(*hashes.last().expect("nonempty"));
        worker.handle_new_peer(peer.clone());
        worker.fetch_blocks_from(1);

        let requested = peer.requested_data();
        assert_eq!(requested.len(), 2, "walk stops at the invalid entry");
    }

    #[test]
    fn test_fetch_nothing_when_peer_behind() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        // Active chain at height 3; peer's best known is height 1 on it.
        let genesis = node.chain.genesis_hash();
        let hashes = node.chain.add_index_chain(&genesis, 3);
        for hash in &hashes {
            node.chain.connect_to_active(hash);
        }
        node.chain.set_best_header(&hashes[2]);
        node.chain.set_ibd(false);

        let peer = MockPeer::new(1, 1);
        peer.set_last_announced(hashes[0]);
        worker.handle_new_peer(peer.clone());
        peer.clear_sent();

        worker.fetch_blocks_from(1);
        assert!(peer.requested_data().is_empty());
    }
}
