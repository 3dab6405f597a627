//! The sync manager: public handle and single-consumer worker loop.
//!
//! All mutation of sync state happens on one worker task that drains a
//! bounded queue of tagged messages. Producers enqueue and, where the
//! message carries a reply channel, await it; the worker signals every reply
//! after handling, even on error paths.

use crate::config::{MessageListeners, Network, SyncConfig};
use crate::error::{ProcessError, SyncError};
use crate::message::{ChainNotification, GetBlocksRequest, SyncMessage};
use crate::metrics;
use crate::peer::{PeerId, PeerSyncState, SyncPeer};
use crate::process::{
    BanScoreSink, BlockProcessor, HeaderProcessor, PeerNotifier, TransactionProcessor,
};
use crate::progress::BlockProgressLogger;
use crate::view::{BlockIndexEntry, ChainView, MempoolView, UtxoView};
use ferrum_types::{Block, BlockHeader, BlockLocator, Hash, InvVect, ServiceFlags, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Maximum number of rejected transaction hashes remembered.
pub const MAX_REJECTED_TXNS: usize = 1_000;

/// Maximum number of requested block hashes tracked globally.
pub const MAX_REQUESTED_BLOCKS: usize = ferrum_types::MAX_INV_PER_MSG;

/// Maximum number of requested transaction hashes tracked globally.
pub const MAX_REQUESTED_TXNS: usize = ferrum_types::MAX_INV_PER_MSG;

/// Interval of the periodic fetch scan across all peers.
pub const FETCH_INTERVAL: Duration = Duration::from_secs(1);

/// Communicates block-related messages with peers.
///
/// Constructed with [`SyncManager::new`], started with [`SyncManager::start`].
/// Once started it elects a peer to sync headers from, drives initial block
/// download, and afterwards relays announcements of new blocks and
/// transactions.
pub struct SyncManager {
    queue: mpsc::Sender<SyncMessage>,
    shutdown: Arc<AtomicBool>,
    quit: Arc<Notify>,
    worker: Mutex<Option<(SyncWorker, mpsc::Receiver<SyncMessage>)>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    /// Construct a sync manager from its configuration.
    pub fn new(config: SyncConfig) -> Self {
        let capacity = (config.max_peers * 3).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = SyncWorker::new(config, shutdown.clone());
        Self {
            queue: tx,
            shutdown,
            quit: Arc::new(Notify::new()),
            worker: Mutex::new(Some((worker, rx))),
            join: Mutex::new(None),
        }
    }

    /// Spawn the worker task. Subsequent calls are no-ops.
    pub fn start(&self) {
        let Some((worker, rx)) = self.worker.lock().expect("worker lock").take() else {
            warn!("sync manager already started");
            return;
        };
        trace!("starting sync manager");
        let quit = self.quit.clone();
        let handle = tokio::spawn(worker.run(rx, quit));
        *self.join.lock().expect("join lock") = Some(handle);
    }

    /// Gracefully shut the manager down and wait for the worker to finish.
    pub async fn stop(&self) -> Result<(), SyncError> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            warn!("sync manager is already in the process of shutting down");
            return Ok(());
        }
        info!("sync manager shutting down");
        // notify_one stores a permit, so the signal is not lost when the
        // worker is mid-handler rather than parked on the select.
        self.quit.notify_one();
        let handle = self.join.lock().expect("join lock").take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| SyncError::Worker(e.to_string()))?;
        }
        Ok(())
    }

    /// Inform the manager of a newly active peer.
    pub async fn new_peer(&self, peer: Arc<dyn SyncPeer>) {
        if self.is_shut_down() {
            return;
        }
        self.enqueue(SyncMessage::NewPeer(peer)).await;
    }

    /// Inform the manager that a peer disconnected.
    pub async fn done_peer(&self, peer: PeerId) {
        if self.is_shut_down() {
            return;
        }
        self.enqueue(SyncMessage::DonePeer(peer)).await;
    }

    /// Queue a transaction received from a peer; `reply` is signalled after
    /// the message is fully handled.
    pub async fn queue_tx(&self, tx: Transaction, peer: PeerId, reply: oneshot::Sender<()>) {
        if self.is_shut_down() {
            let _ = reply.send(());
            return;
        }
        self.enqueue(SyncMessage::Tx { tx, peer, reply }).await;
    }

    /// Queue a block received from a peer; `reply` is signalled after the
    /// message is fully handled.
    pub async fn queue_block(
        &self,
        block: Block,
        raw: Vec<u8>,
        peer: PeerId,
        reply: oneshot::Sender<()>,
    ) {
        if self.is_shut_down() {
            let _ = reply.send(());
            return;
        }
        self.enqueue(SyncMessage::Block {
            block,
            raw,
            peer,
            reply,
        })
        .await;
    }

    /// Submit a locally mined block; the reply carries the processing result.
    pub async fn queue_mined_block(
        &self,
        block: Block,
        reply: oneshot::Sender<Result<(), ProcessError>>,
    ) {
        if self.is_shut_down() {
            let _ = reply.send(Ok(()));
            return;
        }
        self.enqueue(SyncMessage::MinedBlock { block, reply }).await;
    }

    /// Queue an inventory announcement. Peers do not block on inv handling,
    /// so there is no reply channel.
    pub async fn queue_inv(&self, invs: Vec<InvVect>, peer: PeerId) {
        if self.is_shut_down() {
            return;
        }
        self.enqueue(SyncMessage::Inv { invs, peer }).await;
    }

    /// Queue a header batch. Peers do not block on headers handling either.
    pub async fn queue_headers(&self, headers: Vec<BlockHeader>, peer: PeerId) {
        if self.is_shut_down() {
            return;
        }
        self.enqueue(SyncMessage::Headers { headers, peer }).await;
    }

    /// Queue a mempool request from a peer.
    pub async fn queue_mempool(&self, peer: PeerId, reply: oneshot::Sender<()>) {
        if self.is_shut_down() {
            let _ = reply.send(());
            return;
        }
        self.enqueue(SyncMessage::MemPool { peer, reply }).await;
    }

    /// Queue a getblocks request from a peer.
    pub async fn queue_get_blocks(
        &self,
        request: GetBlocksRequest,
        peer: PeerId,
        reply: oneshot::Sender<()>,
    ) {
        if self.is_shut_down() {
            let _ = reply.send(());
            return;
        }
        self.enqueue(SyncMessage::GetBlocks {
            request,
            peer,
            reply,
        })
        .await;
    }

    /// Queue a ping from a peer.
    pub async fn queue_ping(&self, nonce: u64, peer: PeerId, reply: oneshot::Sender<()>) {
        if self.is_shut_down() {
            let _ = reply.send(());
            return;
        }
        self.enqueue(SyncMessage::Ping { nonce, peer, reply }).await;
    }

    /// Deliver a chain notification to the worker.
    pub async fn notify_chain_event(&self, event: ChainNotification) {
        if self.is_shut_down() {
            return;
        }
        self.enqueue(SyncMessage::ChainEvent(event)).await;
    }

    /// Id of the current sync peer, zero when none is elected.
    pub async fn sync_peer_id(&self) -> PeerId {
        if self.is_shut_down() {
            return 0;
        }
        let (tx, rx) = oneshot::channel();
        self.enqueue(SyncMessage::GetSyncPeer { reply: tx }).await;
        rx.await.unwrap_or(0)
    }

    /// Whether the manager believes it is synced with its peers.
    pub async fn is_current(&self) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let (tx, rx) = oneshot::channel();
        self.enqueue(SyncMessage::IsCurrent { reply: tx }).await;
        rx.await.unwrap_or(false)
    }

    /// Pause the manager; all message processing halts until the returned
    /// handle is signalled or dropped. Callers should not hold it for long.
    pub async fn pause(&self) -> oneshot::Sender<()> {
        let (release, paused) = oneshot::channel();
        if !self.is_shut_down() {
            self.enqueue(SyncMessage::Pause { release: paused }).await;
        }
        release
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    async fn enqueue(&self, msg: SyncMessage) {
        if let Err(send_err) = self.queue.send(msg).await {
            send_err.0.release_reply();
        }
    }
}

/// Owns every piece of mutable sync state; runs on the worker task only.
pub(crate) struct SyncWorker {
    pub(crate) params: crate::config::ChainParams,
    pub(crate) chain: Arc<dyn ChainView>,
    pub(crate) mempool: Arc<dyn MempoolView>,
    pub(crate) utxo: Arc<dyn UtxoView>,
    pub(crate) notifier: Arc<dyn PeerNotifier>,
    pub(crate) tx_processor: Arc<dyn TransactionProcessor>,
    pub(crate) block_processor: Arc<dyn BlockProcessor>,
    pub(crate) header_processor: Arc<dyn HeaderProcessor>,
    pub(crate) ban_score: Arc<dyn BanScoreSink>,
    pub(crate) listeners: MessageListeners,
    pub(crate) shutdown: Arc<AtomicBool>,

    pub(crate) rejected_txns: HashSet<Hash>,
    pub(crate) requested_txns: HashSet<Hash>,
    pub(crate) requested_blocks: HashMap<Hash, PeerId>,
    pub(crate) sync_peer: Option<PeerId>,
    pub(crate) peer_states: HashMap<PeerId, PeerSyncState>,
    pub(crate) progress: BlockProgressLogger,
}

impl SyncWorker {
    pub(crate) fn new(config: SyncConfig, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            params: config.chain_params,
            chain: config.chain,
            mempool: config.mempool,
            utxo: config.utxo,
            notifier: config.peer_notifier,
            tx_processor: config.transaction_processor,
            block_processor: config.block_processor,
            header_processor: config.header_processor,
            ban_score: config.ban_score,
            listeners: config.listeners,
            shutdown,
            rejected_txns: HashSet::new(),
            requested_txns: HashSet::new(),
            requested_blocks: HashMap::new(),
            sync_peer: None,
            peer_states: HashMap::new(),
            progress: BlockProgressLogger::new("Processed"),
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<SyncMessage>, quit: Arc<Notify>) {
        let mut fetch_ticker = tokio::time::interval(FETCH_INTERVAL);
        fetch_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = fetch_ticker.tick() => self.scan_for_fetch(),
                _ = quit.notified() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => break,
                },
            }
        }

        trace!("sync message handler done");
    }

    async fn handle_message(&mut self, msg: SyncMessage) {
        match msg {
            SyncMessage::NewPeer(peer) => self.handle_new_peer(peer),
            SyncMessage::DonePeer(peer) => self.handle_done_peer(peer),
            SyncMessage::Tx { tx, peer, reply } => {
                self.handle_tx(peer, tx);
                let _ = reply.send(());
            }
            SyncMessage::Block {
                block,
                raw,
                peer,
                reply,
            } => {
                self.handle_block(peer, block, raw.len());
                let _ = reply.send(());
            }
            SyncMessage::MinedBlock { block, reply } => {
                let result = self.handle_mined_block(block);
                let _ = reply.send(result);
            }
            SyncMessage::Inv { invs, peer } => self.handle_inv(peer, invs),
            SyncMessage::Headers { headers, peer } => self.handle_headers(peer, headers),
            SyncMessage::MemPool { peer, reply } => {
                if let Some(state) = self.peer_states.get(&peer) {
                    if let Some(on_mempool) = &self.listeners.on_mempool {
                        on_mempool(&state.peer);
                    }
                }
                let _ = reply.send(());
            }
            SyncMessage::GetBlocks {
                request,
                peer,
                reply,
            } => {
                if let Some(state) = self.peer_states.get(&peer) {
                    if let Some(on_get_blocks) = &self.listeners.on_get_blocks {
                        on_get_blocks(&state.peer, &request);
                    }
                }
                let _ = reply.send(());
            }
            SyncMessage::Ping { nonce, peer, reply } => {
                if let Some(state) = self.peer_states.get(&peer) {
                    if let Some(on_ping) = &self.listeners.on_ping {
                        on_ping(&state.peer, nonce);
                    }
                }
                let _ = reply.send(());
            }
            SyncMessage::GetSyncPeer { reply } => {
                let _ = reply.send(self.sync_peer.unwrap_or(0));
            }
            SyncMessage::IsCurrent { reply } => {
                let _ = reply.send(self.current());
            }
            SyncMessage::Pause { release } => {
                // The sender holds exclusive access until it releases us.
                let _ = release.await;
            }
            SyncMessage::ChainEvent(event) => self.handle_chain_notification(event),
        }
    }

    /// Deal with a peer that completed its handshake: record its state, ask
    /// it for headers, and start or re-elect syncing as needed.
    pub(crate) fn handle_new_peer(&mut self, peer: Arc<dyn SyncPeer>) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        info!(
            peer = %peer.addr(),
            agent = %peer.user_agent(),
            start_height = peer.starting_height(),
            "new valid peer"
        );

        let candidate = self.is_sync_candidate(&*peer);
        let peer_id = peer.id();
        self.peer_states
            .insert(peer_id, PeerSyncState::new(peer.clone(), candidate));
        metrics::set_peer_count(self.peer_states.len());

        if !self.chain.is_initial_block_download() && peer.ver_ack_received() {
            let locator = self.pre_best_header_locator();
            peer.push_get_headers(locator, Hash::ZERO);
        }

        if candidate && self.sync_peer.is_none() {
            self.start_sync();
            return;
        }

        if candidate && self.current() {
            let sync_last = self
                .sync_peer
                .and_then(|id| self.peer_states.get(&id))
                .map(|state| state.peer.last_block());
            if sync_last.is_some_and(|last| peer.last_block() > last) {
                self.sync_peer = None;
                self.start_sync();
                return;
            }
        }

        self.fetch_blocks_from(peer_id);
    }

    /// Deal with a departed peer: purge its request attributions and, if it
    /// was the sync peer, elect a replacement.
    pub(crate) fn handle_done_peer(&mut self, peer_id: PeerId) {
        let Some(state) = self.peer_states.remove(&peer_id) else {
            warn!(peer = peer_id, "received done peer message for unknown peer");
            return;
        };

        info!(peer = %state.peer.addr(), "lost peer");

        // Drop request attributions so the objects are fetched from elsewhere
        // on the next inv.
        for tx_hash in &state.requested_txns {
            self.requested_txns.remove(tx_hash);
        }
        for block_hash in &state.requested_blocks {
            self.requested_blocks.remove(block_hash);
        }
        metrics::set_peer_count(self.peer_states.len());
        metrics::set_blocks_in_flight(self.requested_blocks.len());

        if self.sync_peer == Some(peer_id) {
            self.sync_peer = None;
            self.start_sync();
        }
    }

    /// Elect the best candidate whose chain reaches past ours and solicit
    /// headers from it. No-op while a sync peer is set.
    pub(crate) fn start_sync(&mut self) {
        if self.sync_peer.is_some() {
            return;
        }

        let best = self.chain.tip();
        let mut best_peer: Option<(PeerId, Arc<dyn SyncPeer>)> = None;
        for (id, state) in &self.peer_states {
            if !state.sync_candidate {
                continue;
            }
            // The strict < keeps peers at exactly our height in the running:
            // they will likely have a later block soon, and it covers both
            // sides being at zero during regression tests.
            if state.peer.last_block() < best.height {
                continue;
            }
            best_peer = Some((*id, state.peer.clone()));
        }

        match best_peer {
            Some((peer_id, peer)) => {
                let locator = self.pre_best_header_locator();
                info!(
                    height = peer.last_block(),
                    peer = %peer.addr(),
                    "syncing to block height from peer"
                );
                peer.push_get_headers(locator, Hash::ZERO);
                self.sync_peer = Some(peer_id);
                if self.current() {
                    debug!("requesting mempool from newly elected sync peer");
                    peer.request_mempool();
                }
            }
            None => warn!("no sync peer candidates available"),
        }
    }

    /// Whether the peer qualifies as a source to sync the chain from.
    pub(crate) fn is_sync_candidate(&self, peer: &dyn SyncPeer) -> bool {
        if self.params.network == Network::Regtest {
            // The regression-test harness is not a full node but still must
            // be considered; accept only localhost peers there.
            let addr = peer.addr();
            let Some((host, _)) = addr.rsplit_once(':') else {
                return false;
            };
            let host = host.trim_start_matches('[').trim_end_matches(']');
            host == "127.0.0.1" || host == "localhost"
        } else {
            peer.services().has(ServiceFlags::NETWORK)
        }
    }

    /// Whether we believe we are synced with our peers.
    pub(crate) fn current(&self) -> bool {
        if !self.chain.is_current() {
            return false;
        }

        // If the chain thinks we are current and we have no sync peer it is
        // probably right.
        let Some(sync_peer) = self.sync_peer else {
            return true;
        };
        match self.peer_states.get(&sync_peer) {
            Some(state) => self.chain.tip().height >= state.peer.last_block(),
            None => true,
        }
    }

    /// Best known header, falling back to the tip before headers sync began.
    pub(crate) fn best_header_or_tip(&self) -> BlockIndexEntry {
        self.chain.best_header().unwrap_or_else(|| self.chain.tip())
    }

    /// Locator anchored at the predecessor of the best known header.
    ///
    /// Starting one block early guarantees a non-empty headers response from
    /// an up-to-date peer, which lets us initialise its known best block; a
    /// locator at the best header itself could legitimately return nothing.
    pub(crate) fn pre_best_header_locator(&self) -> BlockLocator {
        let best = self.best_header_or_tip();
        let start = best
            .prev
            .and_then(|prev| self.chain.find_block_index(&prev))
            .unwrap_or(best);
        self.chain.locator(&start.hash)
    }

    pub(crate) fn misbehaving(&self, addr: &str, score: u32, reason: &str) {
        self.ban_score.add_ban_score(addr, score, 0, reason);
    }
}
