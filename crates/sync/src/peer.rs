//! The peer contract and per-peer sync state.

use crate::error::RejectCode;
use crate::message::PeerMessage;
use ferrum_types::{BlockLocator, Hash, InvVect, ServiceFlags};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Stable numeric id of a connected peer, assigned by the connection manager.
pub type PeerId = i32;

/// Handle to a connected peer.
///
/// The sync manager holds these handles instead of sharing peer lifetimes;
/// the peer object itself lives in the connection manager. All methods are
/// fire-and-forget: outbound messages go onto the peer's own send queue and
/// handlers never wait on peer I/O.
pub trait SyncPeer: Send + Sync {
    /// Stable peer id, strictly positive.
    fn id(&self) -> PeerId;

    /// Remote address as `host:port`.
    fn addr(&self) -> String;

    /// Height of the last block the peer is known to have.
    fn last_block(&self) -> i32;

    /// Height the peer reported in its version message.
    fn starting_height(&self) -> i32;

    /// The peer's user agent string.
    fn user_agent(&self) -> String;

    /// Services the peer advertises.
    fn services(&self) -> ServiceFlags;

    /// Whether the version handshake completed.
    fn ver_ack_received(&self) -> bool;

    /// Whether the peer is exempt from ban scoring.
    fn is_whitelisted(&self) -> bool;

    /// Hash of the last block the peer announced, if any.
    fn last_announced_block(&self) -> Option<Hash>;

    /// Record the last block the peer announced.
    fn update_last_announced_block(&self, hash: &Hash);

    /// Record a newly learned height for the peer.
    fn update_last_block_height(&self, height: i32);

    /// Add an inventory vector to the peer's known-inventory cache.
    fn add_known_inventory(&self, inv: &InvVect);

    /// Consider falling back from header announcements to inv for this hash.
    fn check_revert_to_inv(&self, hash: &Hash, is_block: bool);

    /// Send a `getheaders` with the given locator and stop hash.
    fn push_get_headers(&self, locator: BlockLocator, stop_hash: Hash);

    /// Send a `reject` for the named command and object.
    fn push_reject(&self, command: &str, code: RejectCode, reason: &str, hash: &Hash, disconnect: bool);

    /// Queue a data message onto the peer's send path.
    fn queue_message(&self, msg: PeerMessage);

    /// Ask the peer for its mempool contents.
    fn request_mempool(&self);

    /// Disconnect the peer.
    fn disconnect(&self);

    /// Microsecond timestamp since the peer started stalling the download
    /// window, zero when not stalling.
    fn stalling_since(&self) -> i64;

    /// Set or clear the stall timestamp.
    fn set_stalling_since(&self, micros: i64);
}

/// Per-peer state owned by the sync manager.
///
/// Created on peer admission, destroyed on departure; the request sets are
/// mirrored in the manager's global indices.
pub(crate) struct PeerSyncState {
    /// Handle to the peer itself.
    pub peer: Arc<dyn SyncPeer>,
    /// Whether the peer qualifies as a sync source, fixed at admission.
    pub sync_candidate: bool,
    /// Announced inventory awaiting request issuance, drained FIFO.
    pub request_queue: VecDeque<InvVect>,
    /// Outstanding transaction requests attributed to this peer.
    pub requested_txns: HashSet<Hash>,
    /// Outstanding block requests attributed to this peer.
    pub requested_blocks: HashSet<Hash>,
    /// Consecutive header messages whose first header did not connect.
    pub unconnecting_headers: u32,
}

impl PeerSyncState {
    pub(crate) fn new(peer: Arc<dyn SyncPeer>, sync_candidate: bool) -> Self {
        Self {
            peer,
            sync_candidate,
            request_queue: VecDeque::new(),
            requested_txns: HashSet::new(),
            requested_blocks: HashSet::new(),
            unconnecting_headers: 0,
        }
    }
}

/// Evict an arbitrary element when the set would exceed `limit`.
///
/// Eviction order is the set's iteration order, which for hashed keys is
/// effectively pseudo-random; targeting a specific victim would require a
/// preimage attack on the hash function, so the order does not matter.
pub(crate) fn limit_hash_set(set: &mut HashSet<Hash>, limit: usize) {
    if set.len() + 1 > limit {
        if let Some(victim) = set.iter().next().copied() {
            set.remove(&victim);
        }
    }
}
