//! Messages flowing through the sync manager's inbound queue, outbound data
//! messages, and chain notifications.

use crate::error::ProcessError;
use crate::peer::{PeerId, SyncPeer};
use crate::view::BlockIndexEntry;
use ferrum_types::{Block, BlockHeader, BlockLocator, Hash, InvVect, Transaction};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Data message queued onto a peer's send path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerMessage {
    /// Request the referenced objects.
    GetData(Vec<InvVect>),
    /// Advertise the referenced objects.
    Inv(Vec<InvVect>),
}

/// A `getblocks` request relayed through the manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBlocksRequest {
    /// Locator identifying the requester's chain position.
    pub locator: BlockLocator,
    /// Hash to stop at, zero for "as many as allowed".
    pub stop_hash: Hash,
}

/// Payload of a chain tip update notification.
#[derive(Clone, Debug)]
pub struct TipUpdatedEvent {
    /// The new tip.
    pub tip: BlockIndexEntry,
    /// Fork point with the previous tip, if the update was a reorg.
    pub fork: Option<BlockIndexEntry>,
    /// Whether the node was still in initial block download.
    pub is_initial_download: bool,
}

/// Chain events the sync manager subscribes to.
#[derive(Clone, Debug)]
pub enum ChainNotification {
    /// The active chain tip changed.
    TipUpdated(TipUpdatedEvent),
    /// A block with valid proof of work was accepted.
    NewPoWValidBlock(Block),
    /// A block was connected to the active chain.
    BlockConnected(Block),
    /// A block was disconnected from the active chain.
    BlockDisconnected(Block),
}

/// Tagged message consumed by the sync worker loop.
///
/// Variants carrying a reply channel are signalled after handling, even on
/// error paths.
pub(crate) enum SyncMessage {
    /// A peer completed its handshake.
    NewPeer(Arc<dyn SyncPeer>),
    /// A peer disconnected.
    DonePeer(PeerId),
    /// Transaction received from a peer.
    Tx {
        tx: Transaction,
        peer: PeerId,
        reply: oneshot::Sender<()>,
    },
    /// Block received from a peer.
    Block {
        block: Block,
        raw: Vec<u8>,
        peer: PeerId,
        reply: oneshot::Sender<()>,
    },
    /// Locally mined block submitted for processing.
    MinedBlock {
        block: Block,
        reply: oneshot::Sender<Result<(), ProcessError>>,
    },
    /// Inventory announcement from a peer.
    Inv { invs: Vec<InvVect>, peer: PeerId },
    /// Header batch from a peer.
    Headers {
        headers: Vec<BlockHeader>,
        peer: PeerId,
    },
    /// Mempool request from a peer.
    MemPool {
        peer: PeerId,
        reply: oneshot::Sender<()>,
    },
    /// Getblocks request from a peer.
    GetBlocks {
        request: GetBlocksRequest,
        peer: PeerId,
        reply: oneshot::Sender<()>,
    },
    /// Ping from a peer.
    Ping {
        nonce: u64,
        peer: PeerId,
        reply: oneshot::Sender<()>,
    },
    /// Query the elected sync peer id.
    GetSyncPeer { reply: oneshot::Sender<PeerId> },
    /// Query whether the manager believes it is synced.
    IsCurrent { reply: oneshot::Sender<bool> },
    /// Block the loop until the release channel resolves.
    Pause { release: oneshot::Receiver<()> },
    /// Notification from the chain.
    ChainEvent(ChainNotification),
}

impl SyncMessage {
    /// Release any embedded reply channel with its zero value.
    ///
    /// Used when a message cannot be enqueued (shutdown, closed queue) so
    /// producers never block on a reply that will not come.
    pub(crate) fn release_reply(self) {
        match self {
            SyncMessage::Tx { reply, .. }
            | SyncMessage::Block { reply, .. }
            | SyncMessage::MemPool { reply, .. }
            | SyncMessage::GetBlocks { reply, .. }
            | SyncMessage::Ping { reply, .. } => {
                let _ = reply.send(());
            }
            SyncMessage::MinedBlock { reply, .. } => {
                let _ = reply.send(Ok(()));
            }
            SyncMessage::GetSyncPeer { reply } => {
                let _ = reply.send(0);
            }
            SyncMessage::IsCurrent { reply } => {
                let _ = reply.send(false);
            }
            SyncMessage::NewPeer(_)
            | SyncMessage::DonePeer(_)
            | SyncMessage::Inv { .. }
            | SyncMessage::Headers { .. }
            | SyncMessage::Pause { .. }
            | SyncMessage::ChainEvent(_) => {}
        }
    }
}
