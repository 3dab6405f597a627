//! Core value types for the Ferrum full node.
//!
//! This crate provides the chain-agnostic data structures shared by the node
//! subsystems: content hashes, block and transaction types, inventory
//! vectors, and service flags.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod block;
mod encode;
pub mod hash;
pub mod inventory;
pub mod service;
pub mod transaction;

pub use block::{Block, BlockHeader, BlockLocator};
pub use hash::Hash;
pub use inventory::{InvType, InvVect, MAX_BLOCK_HEADERS_PER_MSG, MAX_INV_PER_MSG};
pub use service::ServiceFlags;
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};
