//! Mock implementations of the injected interfaces.
//!
//! Used by this crate's own tests and available to downstream integration
//! tests; none of these touch real chain state.

use crate::config::{ChainParams, MessageListeners, Network, SyncConfig};
use crate::error::{ProcessError, RejectCode};
use crate::message::{PeerMessage, TipUpdatedEvent};
use crate::peer::{PeerId, SyncPeer};
use crate::process::{
    BanScoreSink, BlockProcessor, HeaderProcessor, PeerNotifier, TransactionProcessor,
    TxProcessOutcome,
};
use crate::view::{BlockIndexEntry, ChainView, ChainWork, MempoolView, TxEntry, UtxoView};
use ferrum_types::{
    Block, BlockHeader, BlockLocator, Hash, InvVect, OutPoint, ServiceFlags, Transaction,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Message recorded on a [`MockPeer`]'s send path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMessage {
    /// A `getheaders` request.
    GetHeaders {
        /// Locator sent.
        locator: BlockLocator,
        /// Stop hash sent.
        stop_hash: Hash,
    },
    /// A `getdata` request.
    GetData(Vec<InvVect>),
    /// An `inv` announcement.
    Inv(Vec<InvVect>),
    /// A `reject` message.
    Reject {
        /// Rejected command.
        command: String,
        /// Reject code.
        code: RejectCode,
        /// Reject reason.
        reason: String,
        /// Rejected object hash.
        hash: Hash,
    },
}

/// In-memory peer recording everything pushed at it.
pub struct MockPeer {
    id: PeerId,
    addr: String,
    services: ServiceFlags,
    user_agent: String,
    starting_height: i32,
    ver_ack: AtomicBool,
    whitelisted: AtomicBool,
    last_block: AtomicI32,
    last_announced: Mutex<Option<Hash>>,
    known_inventory: Mutex<HashSet<InvVect>>,
    stalling_since: AtomicI64,
    disconnected: AtomicBool,
    mempool_requests: AtomicUsize,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockPeer {
    fn base(id: PeerId, last_block: i32) -> Self {
        Self {
            id,
            addr: format!("127.0.0.1:{}", 8333 + id as u16),
            services: ServiceFlags::NETWORK,
            user_agent: "/ferrum:0.1.0/".to_string(),
            starting_height: last_block,
            ver_ack: AtomicBool::new(true),
            whitelisted: AtomicBool::new(false),
            last_block: AtomicI32::new(last_block),
            last_announced: Mutex::new(None),
            known_inventory: Mutex::new(HashSet::new()),
            stalling_since: AtomicI64::new(0),
            disconnected: AtomicBool::new(false),
            mempool_requests: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// New full-node peer on localhost with the handshake complete.
    pub fn new(id: PeerId, last_block: i32) -> Arc<Self> {
        Arc::new(Self::base(id, last_block))
    }

    /// New peer with an explicit remote address.
    pub fn with_addr(id: PeerId, last_block: i32, addr: &str) -> Arc<Self> {
        let mut peer = Self::base(id, last_block);
        peer.addr = addr.to_string();
        Arc::new(peer)
    }

    /// New peer advertising the given services.
    pub fn with_services(id: PeerId, last_block: i32, services: ServiceFlags) -> Arc<Self> {
        let mut peer = Self::base(id, last_block);
        peer.services = services;
        Arc::new(peer)
    }

    /// Mark the peer whitelisted.
    pub fn set_whitelisted(&self, whitelisted: bool) {
        self.whitelisted.store(whitelisted, Ordering::Relaxed);
    }

    /// Mark the handshake incomplete.
    pub fn set_ver_ack(&self, received: bool) {
        self.ver_ack.store(received, Ordering::Relaxed);
    }

    /// Seed the last announced block.
    pub fn set_last_announced(&self, hash: Hash) {
        *self.last_announced.lock().expect("lock") = Some(hash);
    }

    /// Everything sent to this peer so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("lock").clone()
    }

    /// Drop the recorded messages.
    pub fn clear_sent(&self) {
        self.sent.lock().expect("lock").clear();
    }

    /// Number of recorded `getheaders` requests.
    pub fn get_headers_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|m| matches!(m, SentMessage::GetHeaders { .. }))
            .count()
    }

    /// All hashes requested through `getdata` so far.
    pub fn requested_data(&self) -> Vec<InvVect> {
        self.sent()
            .iter()
            .filter_map(|m| match m {
                SentMessage::GetData(invs) => Some(invs.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Whether `disconnect` was called.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }

    /// Number of mempool requests pushed at the peer.
    pub fn mempool_requests(&self) -> usize {
        self.mempool_requests.load(Ordering::Relaxed)
    }

    /// Whether the inventory cache holds the vector.
    pub fn knows_inventory(&self, inv: &InvVect) -> bool {
        self.known_inventory.lock().expect("lock").contains(inv)
    }
}

impl SyncPeer for MockPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn addr(&self) -> String {
        self.addr.clone()
    }

    fn last_block(&self) -> i32 {
        self.last_block.load(Ordering::Relaxed)
    }

    fn starting_height(&self) -> i32 {
        self.starting_height
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn services(&self) -> ServiceFlags {
        self.services
    }

    fn ver_ack_received(&self) -> bool {
        self.ver_ack.load(Ordering::Relaxed)
    }

    fn is_whitelisted(&self) -> bool {
        self.whitelisted.load(Ordering::Relaxed)
    }

    fn last_announced_block(&self) -> Option<Hash> {
        *self.last_announced.lock().expect("lock")
    }

    fn update_last_announced_block(&self, hash: &Hash) {
        *self.last_announced.lock().expect("lock") = Some(*hash);
    }

    fn update_last_block_height(&self, height: i32) {
        self.last_block.store(height, Ordering::Relaxed);
    }

    fn add_known_inventory(&self, inv: &InvVect) {
        self.known_inventory.lock().expect("lock").insert(*inv);
    }

    fn check_revert_to_inv(&self, _hash: &Hash, _is_block: bool) {}

    fn push_get_headers(&self, locator: BlockLocator, stop_hash: Hash) {
        self.sent
            .lock()
            .expect("lock")
            .push(SentMessage::GetHeaders { locator, stop_hash });
    }

    fn push_reject(&self, command: &str, code: RejectCode, reason: &str, hash: &Hash, _disconnect: bool) {
        self.sent.lock().expect("lock").push(SentMessage::Reject {
            command: command.to_string(),
            code,
            reason: reason.to_string(),
            hash: *hash,
        });
    }

    fn queue_message(&self, msg: PeerMessage) {
        let recorded = match msg {
            PeerMessage::GetData(invs) => SentMessage::GetData(invs),
            PeerMessage::Inv(invs) => SentMessage::Inv(invs),
        };
        self.sent.lock().expect("lock").push(recorded);
    }

    fn request_mempool(&self) {
        self.mempool_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Relaxed);
    }

    fn stalling_since(&self) -> i64 {
        self.stalling_since.load(Ordering::Relaxed)
    }

    fn set_stalling_since(&self, micros: i64) {
        self.stalling_since.store(micros, Ordering::Relaxed);
    }
}

struct ChainInner {
    entries: HashMap<Hash, BlockIndexEntry>,
    active: Vec<Hash>,
    best_header: Option<Hash>,
    min_work: ChainWork,
}

/// In-memory chain index with a controllable active chain.
pub struct MockChain {
    inner: Mutex<ChainInner>,
    current: AtomicBool,
    ibd: AtomicBool,
    direct_fetch: AtomicBool,
}

impl MockChain {
    /// Chain holding only a genesis block with data.
    pub fn new() -> Arc<Self> {
        let genesis = BlockIndexEntry {
            hash: Hash::compute(b"mock-genesis"),
            prev: None,
            height: 0,
            work: 1,
            has_data: true,
            valid_tree: true,
        };
        let mut entries = HashMap::new();
        entries.insert(genesis.hash, genesis);
        Arc::new(Self {
            inner: Mutex::new(ChainInner {
                entries,
                active: vec![genesis.hash],
                best_header: None,
                min_work: 0,
            }),
            current: AtomicBool::new(false),
            ibd: AtomicBool::new(false),
            direct_fetch: AtomicBool::new(false),
        })
    }

    /// The genesis hash.
    pub fn genesis_hash(&self) -> Hash {
        self.inner.lock().expect("lock").active[0]
    }

    /// Register `count` chained index entries on top of `parent`.
    ///
    /// The entries are headers only (`has_data = false`) and are not part of
    /// the active chain. Returns the new hashes, lowest first.
    pub fn add_index_chain(&self, parent: &Hash, count: usize) -> Vec<Hash> {
        let mut inner = self.inner.lock().expect("lock");
        let mut prev = *inner.entries.get(parent).expect("parent registered");
        let mut hashes = Vec::with_capacity(count);
        for i in 0..count {
            let mut seed = prev.hash.as_slice().to_vec();
            seed.extend_from_slice(&(i as u64).to_le_bytes());
            let entry = BlockIndexEntry {
                hash: Hash::compute(&seed),
                prev: Some(prev.hash),
                height: prev.height + 1,
                work: prev.work + 1,
                has_data: false,
                valid_tree: true,
            };
            inner.entries.insert(entry.hash, entry);
            hashes.push(entry.hash);
            prev = entry;
        }
        hashes
    }

    /// Insert or replace an index entry.
    pub fn register_entry(&self, entry: BlockIndexEntry) {
        self.inner
            .lock()
            .expect("lock")
            .entries
            .insert(entry.hash, entry);
    }

    /// Mark a registered block's body as stored (or not).
    pub fn set_has_data(&self, hash: &Hash, has_data: bool) {
        let mut inner = self.inner.lock().expect("lock");
        if let Some(entry) = inner.entries.get_mut(hash) {
            entry.has_data = has_data;
        }
    }

    /// Mark a registered block's header tree invalid.
    pub fn set_valid_tree(&self, hash: &Hash, valid: bool) {
        let mut inner = self.inner.lock().expect("lock");
        if let Some(entry) = inner.entries.get_mut(hash) {
            entry.valid_tree = valid;
        }
    }

    /// Extend the active chain with a registered block, storing its body.
    pub fn connect_to_active(&self, hash: &Hash) {
        let mut inner = self.inner.lock().expect("lock");
        if let Some(entry) = inner.entries.get_mut(hash) {
            entry.has_data = true;
        }
        inner.active.push(*hash);
    }

    /// Point the best-header marker at a registered block.
    pub fn set_best_header(&self, hash: &Hash) {
        self.inner.lock().expect("lock").best_header = Some(*hash);
    }

    /// Set whether the chain believes it is current.
    pub fn set_current(&self, current: bool) {
        self.current.store(current, Ordering::Relaxed);
    }

    /// Set the initial-block-download flag.
    pub fn set_ibd(&self, ibd: bool) {
        self.ibd.store(ibd, Ordering::Relaxed);
    }

    /// Allow or forbid direct fetch after header validation.
    pub fn set_direct_fetch(&self, allowed: bool) {
        self.direct_fetch.store(allowed, Ordering::Relaxed);
    }

    /// Set the minimum chain work threshold.
    pub fn set_min_chain_work(&self, work: ChainWork) {
        self.inner.lock().expect("lock").min_work = work;
    }

    /// Look up a registered entry.
    pub fn entry(&self, hash: &Hash) -> Option<BlockIndexEntry> {
        self.inner.lock().expect("lock").entries.get(hash).copied()
    }
}

impl ChainView for MockChain {
    fn tip(&self) -> BlockIndexEntry {
        let inner = self.inner.lock().expect("lock");
        let tip_hash = inner.active.last().expect("active chain never empty");
        inner.entries[tip_hash]
    }

    fn best_header(&self) -> Option<BlockIndexEntry> {
        let inner = self.inner.lock().expect("lock");
        inner
            .best_header
            .and_then(|h| inner.entries.get(&h).copied())
    }

    fn find_block_index(&self, hash: &Hash) -> Option<BlockIndexEntry> {
        self.inner.lock().expect("lock").entries.get(hash).copied()
    }

    fn find_hash_in_active(&self, hash: &Hash) -> Option<BlockIndexEntry> {
        let inner = self.inner.lock().expect("lock");
        if inner.active.contains(hash) {
            inner.entries.get(hash).copied()
        } else {
            None
        }
    }

    fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().expect("lock").active.contains(hash)
    }

    fn find_fork(&self, hash: &Hash) -> Option<BlockIndexEntry> {
        let inner = self.inner.lock().expect("lock");
        let mut cursor = inner.entries.get(hash).copied();
        while let Some(entry) = cursor {
            if inner.active.contains(&entry.hash) {
                return Some(entry);
            }
            cursor = entry.prev.and_then(|p| inner.entries.get(&p).copied());
        }
        None
    }

    fn ancestor(&self, hash: &Hash, height: i32) -> Option<BlockIndexEntry> {
        let inner = self.inner.lock().expect("lock");
        let mut cursor = inner.entries.get(hash).copied()?;
        if height > cursor.height {
            return None;
        }
        while cursor.height > height {
            cursor = inner.entries.get(&cursor.prev?).copied()?;
        }
        Some(cursor)
    }

    fn locator(&self, from: &Hash) -> BlockLocator {
        vec![*from]
    }

    fn height(&self) -> i32 {
        self.tip().height
    }

    fn is_current(&self) -> bool {
        self.current.load(Ordering::Relaxed)
    }

    fn is_initial_block_download(&self) -> bool {
        self.ibd.load(Ordering::Relaxed)
    }

    fn can_direct_fetch(&self) -> bool {
        self.direct_fetch.load(Ordering::Relaxed)
    }

    fn min_chain_work(&self) -> ChainWork {
        self.inner.lock().expect("lock").min_work
    }
}

/// In-memory mempool recording removals and orphan promotions.
#[derive(Default)]
pub struct MockMempool {
    entries: Mutex<HashMap<Hash, TxEntry>>,
    orphans: Mutex<HashSet<Hash>>,
    removed: Mutex<Vec<Hash>>,
    promoted: Mutex<Vec<Hash>>,
}

impl MockMempool {
    /// Empty mempool.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a transaction as a pool entry.
    pub fn insert(&self, tx: Transaction) {
        let hash = tx.hash();
        let size = tx.serialized_size();
        self.entries.lock().expect("lock").insert(
            hash,
            TxEntry {
                tx,
                fee: 1_000,
                size,
                height: 0,
            },
        );
    }

    /// Insert a hash into the orphan pool.
    pub fn add_orphan(&self, hash: Hash) {
        self.orphans.lock().expect("lock").insert(hash);
    }

    /// Hashes removed by `remove_confirmed` so far.
    pub fn removed(&self) -> Vec<Hash> {
        self.removed.lock().expect("lock").clone()
    }

    /// Hashes passed to `promote_orphans` so far.
    pub fn promoted(&self) -> Vec<Hash> {
        self.promoted.lock().expect("lock").clone()
    }
}

impl MempoolView for MockMempool {
    fn entry(&self, hash: &Hash) -> Option<TxEntry> {
        self.entries.lock().expect("lock").get(hash).cloned()
    }

    fn contains(&self, hash: &Hash) -> bool {
        self.entries.lock().expect("lock").contains_key(hash)
    }

    fn contains_orphan(&self, hash: &Hash) -> bool {
        self.orphans.lock().expect("lock").contains(hash)
    }

    fn remove_confirmed(&self, txs: &[Transaction]) {
        let mut entries = self.entries.lock().expect("lock");
        let mut removed = self.removed.lock().expect("lock");
        for tx in txs {
            let hash = tx.hash();
            entries.remove(&hash);
            removed.push(hash);
        }
    }

    fn promote_orphans(&self, tx: &Transaction, _height: i32) {
        self.promoted.lock().expect("lock").push(tx.hash());
    }
}

/// In-memory UTXO set.
#[derive(Default)]
pub struct MockUtxo {
    coins: Mutex<HashSet<OutPoint>>,
}

impl MockUtxo {
    /// Empty UTXO set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a spendable coin.
    pub fn add_coin(&self, out: OutPoint) {
        self.coins.lock().expect("lock").insert(out);
    }
}

impl UtxoView for MockUtxo {
    fn have_coin(&self, out: &OutPoint) -> bool {
        self.coins.lock().expect("lock").contains(out)
    }
}

/// Transaction processor returning scripted outcomes.
#[derive(Default)]
pub struct MockTransactionProcessor {
    outcomes: Mutex<VecDeque<TxProcessOutcome>>,
    calls: Mutex<Vec<(Hash, i64)>>,
    deposit_to: Mutex<Option<Arc<MockMempool>>>,
}

impl MockTransactionProcessor {
    /// Processor with no scripted outcomes; unscripted calls return an empty
    /// outcome.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the outcome of the next call.
    pub fn push_outcome(&self, outcome: TxProcessOutcome) {
        self.outcomes.lock().expect("lock").push_back(outcome);
    }

    /// Insert accepted transactions into the given mempool, as the real
    /// processing path would.
    pub fn deposit_accepted_into(&self, mempool: Arc<MockMempool>) {
        *self.deposit_to.lock().expect("lock") = Some(mempool);
    }

    /// `(tx hash, peer id)` per call so far.
    pub fn calls(&self) -> Vec<(Hash, i64)> {
        self.calls.lock().expect("lock").clone()
    }
}

impl TransactionProcessor for MockTransactionProcessor {
    fn process_transaction(
        &self,
        tx: &Transaction,
        _rejected: &HashSet<Hash>,
        from_peer: i64,
    ) -> TxProcessOutcome {
        self.calls.lock().expect("lock").push((tx.hash(), from_peer));
        let outcome = self
            .outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_default();
        if let Some(mempool) = &*self.deposit_to.lock().expect("lock") {
            for accepted in &outcome.accepted {
                mempool.insert(accepted.clone());
            }
        }
        outcome
    }
}

/// Block processor returning scripted results.
#[derive(Default)]
pub struct MockBlockProcessor {
    results: Mutex<VecDeque<Result<bool, ProcessError>>>,
    processed: Mutex<Vec<(Hash, bool)>>,
}

impl MockBlockProcessor {
    /// Processor whose unscripted calls accept the block.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the result of the next call.
    pub fn push_result(&self, result: Result<bool, ProcessError>) {
        self.results.lock().expect("lock").push_back(result);
    }

    /// `(block hash, force flag)` per call so far.
    pub fn processed(&self) -> Vec<(Hash, bool)> {
        self.processed.lock().expect("lock").clone()
    }
}

impl BlockProcessor for MockBlockProcessor {
    fn process_block(&self, block: &Block, force_processing: bool) -> Result<bool, ProcessError> {
        self.processed
            .lock()
            .expect("lock")
            .push((block.hash(), force_processing));
        self.results
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(false))
    }
}

/// Header processor that extends a [`MockChain`]'s index, as the real
/// validation path would.
pub struct MockHeaderProcessor {
    chain: Arc<MockChain>,
    fail_with: Mutex<Option<ProcessError>>,
}

impl MockHeaderProcessor {
    /// Processor registering headers into the given chain.
    pub fn new(chain: Arc<MockChain>) -> Arc<Self> {
        Arc::new(Self {
            chain,
            fail_with: Mutex::new(None),
        })
    }

    /// Fail the next call with the given error.
    pub fn fail_next(&self, err: ProcessError) {
        *self.fail_with.lock().expect("lock") = Some(err);
    }
}

impl HeaderProcessor for MockHeaderProcessor {
    fn process_headers(&self, headers: &[BlockHeader]) -> Result<BlockIndexEntry, ProcessError> {
        if let Some(err) = self.fail_with.lock().expect("lock").take() {
            return Err(err);
        }
        let mut last = None;
        for header in headers {
            let hash = header.hash();
            let parent = self
                .chain
                .entry(&header.prev_block)
                .ok_or_else(|| ProcessError::internal("header parent unknown"))?;
            let entry = self.chain.entry(&hash).unwrap_or(BlockIndexEntry {
                hash,
                prev: Some(header.prev_block),
                height: parent.height + 1,
                work: parent.work + 1,
                has_data: false,
                valid_tree: true,
            });
            self.chain.register_entry(entry);
            last = Some(entry);
        }
        let last = last.ok_or_else(|| ProcessError::internal("empty header batch"))?;
        self.chain.set_best_header(&last.hash);
        Ok(last)
    }
}

/// Ban-score sink recording reports.
#[derive(Default)]
pub struct MockBanScore {
    reports: Mutex<Vec<(String, u32, String)>>,
}

impl MockBanScore {
    /// Empty sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(addr, score, reason)` per report so far.
    pub fn reports(&self) -> Vec<(String, u32, String)> {
        self.reports.lock().expect("lock").clone()
    }
}

impl BanScoreSink for MockBanScore {
    fn add_ban_score(&self, addr: &str, persistent: u32, _transient: u32, reason: &str) {
        self.reports
            .lock()
            .expect("lock")
            .push((addr.to_string(), persistent, reason.to_string()));
    }
}

/// Peer notifier recording every call.
#[derive(Default)]
pub struct MockPeerNotifier {
    announced_batches: Mutex<Vec<usize>>,
    height_updates: Mutex<Vec<(Hash, i32, PeerId)>>,
    relayed_invs: Mutex<Vec<InvVect>>,
    tip_updates: AtomicUsize,
    confirmed: Mutex<Vec<Hash>>,
}

impl MockPeerNotifier {
    /// Empty notifier.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sizes of announced transaction batches so far.
    pub fn announced_batches(&self) -> Vec<usize> {
        self.announced_batches.lock().expect("lock").clone()
    }

    /// Height updates broadcast so far.
    pub fn height_updates(&self) -> Vec<(Hash, i32, PeerId)> {
        self.height_updates.lock().expect("lock").clone()
    }

    /// Inventory relayed so far.
    pub fn relayed_invs(&self) -> Vec<InvVect> {
        self.relayed_invs.lock().expect("lock").clone()
    }

    /// Number of tip updates relayed.
    pub fn tip_updates(&self) -> usize {
        self.tip_updates.load(Ordering::Relaxed)
    }

    /// Transactions reported confirmed so far.
    pub fn confirmed(&self) -> Vec<Hash> {
        self.confirmed.lock().expect("lock").clone()
    }
}

impl PeerNotifier for MockPeerNotifier {
    fn announce_new_transactions(&self, txns: &[TxEntry]) {
        self.announced_batches.lock().expect("lock").push(txns.len());
    }

    fn update_peer_heights(&self, latest_hash: &Hash, latest_height: i32, update_source: PeerId) {
        self.height_updates
            .lock()
            .expect("lock")
            .push((*latest_hash, latest_height, update_source));
    }

    fn relay_inventory(&self, inv: &InvVect, _header: &BlockHeader) {
        self.relayed_invs.lock().expect("lock").push(*inv);
    }

    fn relay_updated_tip_blocks(&self, _event: &TipUpdatedEvent) {
        self.tip_updates.fetch_add(1, Ordering::Relaxed);
    }

    fn transaction_confirmed(&self, tx: &Transaction) {
        self.confirmed.lock().expect("lock").push(tx.hash());
    }
}

/// Bundle of mock collaborators wired into a [`SyncConfig`].
pub struct MockNode {
    /// Mock chain index.
    pub chain: Arc<MockChain>,
    /// Mock mempool.
    pub mempool: Arc<MockMempool>,
    /// Mock UTXO set.
    pub utxo: Arc<MockUtxo>,
    /// Mock notifier.
    pub notifier: Arc<MockPeerNotifier>,
    /// Mock transaction processor.
    pub tx_processor: Arc<MockTransactionProcessor>,
    /// Mock block processor.
    pub block_processor: Arc<MockBlockProcessor>,
    /// Mock header processor.
    pub header_processor: Arc<MockHeaderProcessor>,
    /// Mock ban-score sink.
    pub ban_score: Arc<MockBanScore>,
}

impl MockNode {
    /// Fresh set of mock collaborators sharing one mock chain.
    pub fn new() -> Self {
        let chain = MockChain::new();
        Self {
            header_processor: MockHeaderProcessor::new(chain.clone()),
            chain,
            mempool: MockMempool::new(),
            utxo: MockUtxo::new(),
            notifier: MockPeerNotifier::new(),
            tx_processor: MockTransactionProcessor::new(),
            block_processor: MockBlockProcessor::new(),
            ban_score: MockBanScore::new(),
        }
    }

    /// Build a [`SyncConfig`] over these mocks.
    pub fn config(&self, network: Network) -> SyncConfig {
        SyncConfig {
            chain_params: ChainParams::new(network),
            max_peers: 8,
            chain: self.chain.clone(),
            mempool: self.mempool.clone(),
            utxo: self.utxo.clone(),
            peer_notifier: self.notifier.clone(),
            transaction_processor: self.tx_processor.clone(),
            block_processor: self.block_processor.clone(),
            header_processor: self.header_processor.clone(),
            ban_score: self.ban_score.clone(),
            listeners: MessageListeners::default(),
        }
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}
