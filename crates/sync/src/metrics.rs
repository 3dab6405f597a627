//! Sync manager metrics.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

/// Number of peers tracked by the sync manager
pub static SYNC_PEERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sync_peers", "Number of peers tracked by the sync manager")
        .expect("Failed to register sync_peers metric")
});

/// Blocks currently requested and not yet received
pub static SYNC_BLOCKS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sync_blocks_in_flight",
        "Blocks currently requested and not yet received"
    )
    .expect("Failed to register sync_blocks_in_flight metric")
});

/// Transactions currently requested and not yet received
pub static SYNC_TX_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sync_tx_requests_in_flight",
        "Transactions currently requested and not yet received"
    )
    .expect("Failed to register sync_tx_requests_in_flight metric")
});

/// Size of the rejected-transaction cache
pub static SYNC_REJECTED_TX_CACHE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sync_rejected_tx_cache",
        "Size of the rejected-transaction cache"
    )
    .expect("Failed to register sync_rejected_tx_cache metric")
});

/// Total blocks accepted through the sync manager
pub static SYNC_BLOCKS_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sync_blocks_processed_total",
        "Total blocks accepted through the sync manager"
    )
    .expect("Failed to register sync_blocks_processed_total metric")
});

/// Total headers accepted through the sync manager
pub static SYNC_HEADERS_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sync_headers_processed_total",
        "Total headers accepted through the sync manager"
    )
    .expect("Failed to register sync_headers_processed_total metric")
});

/// Total peers disconnected for stalling the download window
pub static SYNC_STALL_DISCONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sync_stall_disconnects_total",
        "Total peers disconnected for stalling the download window"
    )
    .expect("Failed to register sync_stall_disconnects_total metric")
});

/// Update the tracked peer count.
pub fn set_peer_count(count: usize) {
    SYNC_PEERS.set(count as i64);
}

/// Update the in-flight block count.
pub fn set_blocks_in_flight(count: usize) {
    SYNC_BLOCKS_IN_FLIGHT.set(count as i64);
}

/// Update the in-flight transaction request count.
pub fn set_tx_requests_in_flight(count: usize) {
    SYNC_TX_REQUESTS_IN_FLIGHT.set(count as i64);
}

/// Update the rejected-transaction cache size.
pub fn set_rejected_tx_cache(count: usize) {
    SYNC_REJECTED_TX_CACHE.set(count as i64);
}

/// Record an accepted block.
pub fn inc_blocks_processed() {
    SYNC_BLOCKS_PROCESSED.inc();
}

/// Record accepted headers.
pub fn add_headers_processed(count: usize) {
    SYNC_HEADERS_PROCESSED.inc_by(count as u64);
}

/// Record a stall disconnect.
pub fn inc_stall_disconnects() {
    SYNC_STALL_DISCONNECTS.inc();
}
