//! Chain parameters and sync manager configuration.

use crate::message::GetBlocksRequest;
use crate::peer::SyncPeer;
use crate::process::{
    BanScoreSink, BlockProcessor, HeaderProcessor, PeerNotifier, TransactionProcessor,
};
use crate::view::{ChainView, MempoolView, UtxoView};
use ferrum_types::Hash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which chain the node runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
}

/// A hard-coded known-good block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Height of the checkpointed block.
    pub height: i32,
    /// Hash of the checkpointed block.
    pub hash: Hash,
}

/// Per-network chain parameters consulted by the sync manager.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// The network these parameters describe.
    pub network: Network,
    /// Checkpoints in ascending height order.
    pub checkpoints: Vec<Checkpoint>,
}

impl ChainParams {
    /// Parameters for the given network.
    pub fn new(network: Network) -> Self {
        let checkpoints = match network {
            Network::Mainnet => vec![
                checkpoint(11_111, "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d"),
                checkpoint(33_333, "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6"),
                checkpoint(74_000, "0000000000573993a3c9e41ce34471c079dcf5f52a0e824a81e7f953b8661a20"),
                checkpoint(105_000, "00000000000291ce28027faea320c8d2b054b2e0fe44a773f3eefb151d6bdc97"),
                checkpoint(134_444, "00000000000005b12ffd4cd315cd34ffd4a594f430ac814c91184a0d42d2b0fe"),
            ],
            Network::Testnet => vec![checkpoint(
                546,
                "000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70",
            )],
            Network::Regtest => Vec::new(),
        };
        Self {
            network,
            checkpoints,
        }
    }

    /// The first checkpoint strictly past the given height.
    ///
    /// Returns `None` when the height is at or past the final checkpoint, or
    /// when no checkpoints are configured.
    pub fn next_checkpoint(&self, height: i32) -> Option<&Checkpoint> {
        let final_checkpoint = self.checkpoints.last()?;
        if height >= final_checkpoint.height {
            return None;
        }

        let mut next = final_checkpoint;
        for candidate in self.checkpoints.iter().rev().skip(1) {
            if height >= candidate.height {
                break;
            }
            next = candidate;
        }
        Some(next)
    }
}

/// Parse a checkpoint hash given in display (byte-reversed) hex order.
fn checkpoint(height: i32, hex_hash: &str) -> Checkpoint {
    let mut bytes: [u8; 32] = hex::decode(hex_hash)
        .ok()
        .and_then(|v| v.try_into().ok())
        .expect("valid checkpoint hash literal");
    bytes.reverse();
    Checkpoint {
        height,
        hash: Hash::from_bytes(bytes),
    }
}

/// Optional callbacks for peer messages the manager serializes but does not
/// interpret itself.
#[derive(Default)]
pub struct MessageListeners {
    /// Invoked for each `mempool` request.
    pub on_mempool: Option<Box<dyn Fn(&Arc<dyn SyncPeer>) + Send>>,
    /// Invoked for each `getblocks` request.
    pub on_get_blocks: Option<Box<dyn Fn(&Arc<dyn SyncPeer>, &GetBlocksRequest) + Send>>,
    /// Invoked for each `ping`.
    pub on_ping: Option<Box<dyn Fn(&Arc<dyn SyncPeer>, u64) + Send>>,
}

/// Everything needed to construct a [`crate::SyncManager`].
///
/// All collaborators are injected here; the manager holds no global state.
pub struct SyncConfig {
    /// Chain parameters.
    pub chain_params: ChainParams,
    /// Maximum simultaneously connected peers; sizes the inbound queue.
    pub max_peers: usize,
    /// Chain index view.
    pub chain: Arc<dyn ChainView>,
    /// Mempool view.
    pub mempool: Arc<dyn MempoolView>,
    /// UTXO cache view.
    pub utxo: Arc<dyn UtxoView>,
    /// Outbound notification sink.
    pub peer_notifier: Arc<dyn PeerNotifier>,
    /// Transaction validation callback.
    pub transaction_processor: Arc<dyn TransactionProcessor>,
    /// Block validation callback.
    pub block_processor: Arc<dyn BlockProcessor>,
    /// Header validation callback.
    pub header_processor: Arc<dyn HeaderProcessor>,
    /// Misbehavior sink.
    pub ban_score: Arc<dyn BanScoreSink>,
    /// Pass-through message listeners.
    pub listeners: MessageListeners,
}
