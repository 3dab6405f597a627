//! Periodic progress summary for processed blocks.

use ferrum_types::Block;
use std::time::{Duration, Instant};
use tracing::info;

const LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Aggregates processed blocks and emits one summary line at most every ten
/// seconds, so initial block download does not flood the log.
pub(crate) struct BlockProgressLogger {
    received_blocks: u64,
    received_txs: u64,
    last_log: Instant,
    action: &'static str,
}

impl BlockProgressLogger {
    pub(crate) fn new(action: &'static str) -> Self {
        Self {
            received_blocks: 0,
            received_txs: 0,
            last_log: Instant::now(),
            action,
        }
    }

    /// Account for one accepted block at the given tip height.
    pub(crate) fn log_block(&mut self, block: &Block, tip_height: i32) {
        self.received_blocks += 1;
        self.received_txs += block.tx_count() as u64;

        let elapsed = self.last_log.elapsed();
        if elapsed < LOG_INTERVAL {
            return;
        }

        info!(
            action = self.action,
            blocks = self.received_blocks,
            txs = self.received_txs,
            height = tip_height,
            elapsed_secs = elapsed.as_secs(),
            "block processing progress"
        );

        self.received_blocks = 0;
        self.received_txs = 0;
        self.last_log = Instant::now();
    }
}
