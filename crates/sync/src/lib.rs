//! Block synchronization manager for the Ferrum full node.
//!
//! The sync manager elects a peer to fetch headers from, drives the parallel
//! block-download window across all connected peers during initial block
//! download, deduplicates in-flight requests, tracks per-peer misbehavior,
//! and once the chain is current relays block and transaction announcements.
//!
//! All mutable state lives on one worker task fed by a bounded message
//! queue; see [`SyncManager`] for the inbound API and [`SyncPeer`] for the
//! contract a connected peer must offer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod mock;
pub mod peer;
pub mod process;
pub mod view;

mod blocks;
mod fetch;
mod headers;
mod inventory;
mod manager;
mod notifications;
mod progress;
mod transactions;

pub use config::{ChainParams, Checkpoint, MessageListeners, Network, SyncConfig};
pub use error::{ProcessError, RejectCode, Result, SyncError};
pub use fetch::{
    BLOCK_DOWNLOAD_WINDOW, BLOCK_REQUEST_TIMEOUT, BLOCK_STALLING_TIMEOUT_MICROS,
    MAX_BLOCKS_IN_TRANSIT_PER_PEER,
};
pub use headers::MAX_UNCONNECTING_HEADERS;
pub use manager::{
    SyncManager, FETCH_INTERVAL, MAX_REJECTED_TXNS, MAX_REQUESTED_BLOCKS, MAX_REQUESTED_TXNS,
};
pub use message::{ChainNotification, GetBlocksRequest, PeerMessage, TipUpdatedEvent};
pub use peer::{PeerId, SyncPeer};
pub use process::{
    BanScoreSink, BlockProcessor, HeaderProcessor, PeerNotifier, TransactionProcessor,
    TxProcessOutcome,
};
pub use view::{BlockIndexEntry, ChainView, ChainWork, MempoolView, TxEntry, UtxoView};
