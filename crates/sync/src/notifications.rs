//! Bridge from chain events to mempool and relay actions.

use crate::manager::SyncWorker;
use crate::message::ChainNotification;
use ferrum_types::InvVect;

impl SyncWorker {
    /// Handle a notification from the chain.
    pub(crate) fn handle_chain_notification(&mut self, event: ChainNotification) {
        match event {
            ChainNotification::TipUpdated(event) => {
                self.notifier.relay_updated_tip_blocks(&event);
            }

            // A block gained valid proof of work; relay its announcement.
            ChainNotification::NewPoWValidBlock(block) => {
                let inv = InvVect::block(block.hash());
                self.notifier.relay_inventory(&inv, &block.header);
            }

            // A block joined the active chain. Remove its transactions from
            // the mempool along with anything they double-spend, then try to
            // promote orphans they unblocked. Descendants of confirmed
            // transactions stay: they are still valid.
            ChainNotification::BlockConnected(block) => {
                if block.txs.len() > 1 {
                    let confirmed = &block.txs[1..];
                    self.mempool.remove_confirmed(confirmed);
                    let height = self.chain.height();
                    for tx in confirmed {
                        self.notifier.transaction_confirmed(tx);
                        self.mempool.promote_orphans(tx, height);
                    }
                }
            }

            ChainNotification::BlockDisconnected(_block) => {
                // Hook point for fee-estimator rollback once one exists.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::message::TipUpdatedEvent;
    use crate::mock::MockNode;
    use crate::view::ChainView;
    use ferrum_types::{Block, BlockHeader, Hash, OutPoint, Transaction, TxIn, TxOut};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn worker(node: &MockNode) -> SyncWorker {
        SyncWorker::new(node.config(Network::Mainnet), Arc::new(AtomicBool::new(false)))
    }

    fn tx(tag: u8, coinbase: bool) -> Transaction {
        let previous_output = if coinbase {
            OutPoint::null()
        } else {
            OutPoint::new(Hash::compute(&[tag]), 0)
        };
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output,
                script_sig: vec![tag],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: 1,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn block(txs: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                prev_block: Hash::ZERO,
                merkle_root: Hash::ZERO,
                time: 0,
                bits: 0,
                nonce: 0,
            },
            txs,
        }
    }

    #[test]
    fn test_tip_update_relayed() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        worker.handle_chain_notification(ChainNotification::TipUpdated(TipUpdatedEvent {
            tip: node.chain.tip(),
            fork: None,
            is_initial_download: false,
        }));

        assert_eq!(node.notifier.tip_updates(), 1);
    }

    #[test]
    fn test_pow_valid_block_relays_inv() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        let block = block(vec![tx(0, true)]);
        let hash = block.hash();
        worker.handle_chain_notification(ChainNotification::NewPoWValidBlock(block));

        assert_eq!(node.notifier.relayed_invs(), vec![InvVect::block(hash)]);
    }

    #[test]
    fn test_block_connected_trims_mempool_and_promotes_orphans() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        let coinbase = tx(0, true);
        let spend_a = tx(1, false);
        let spend_b = tx(2, false);
        let hashes = vec![spend_a.hash(), spend_b.hash()];
        node.mempool.insert(spend_a.clone());
        node.mempool.insert(spend_b.clone());

        worker.handle_chain_notification(ChainNotification::BlockConnected(block(vec![
            coinbase.clone(),
            spend_a,
            spend_b,
        ])));

        // The coinbase is left alone; both spends are removed, confirmed and
        // probed for orphan promotion.
        assert_eq!(node.mempool.removed(), hashes);
        assert_eq!(node.mempool.promoted(), hashes);
        assert_eq!(node.notifier.confirmed(), hashes);
        assert!(!node.mempool.removed().contains(&coinbase.hash()));
    }

    #[test]
    fn test_coinbase_only_block_is_a_no_op() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        worker.handle_chain_notification(ChainNotification::BlockConnected(block(vec![tx(
            0, true,
        )])));

        assert!(node.mempool.removed().is_empty());
        assert!(node.mempool.promoted().is_empty());
    }

    #[test]
    fn test_block_disconnected_is_inert() {
        let node = MockNode::new();
        let mut worker = worker(&node);

        worker.handle_chain_notification(ChainNotification::BlockDisconnected(block(vec![tx(
            0, true,
        )])));

        assert!(node.mempool.removed().is_empty());
        assert_eq!(node.notifier.tip_updates(), 0);
    }
}
