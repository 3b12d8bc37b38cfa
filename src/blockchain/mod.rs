// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block structure and canonical hashing
// - The hash-linked chain and its integrity rules
// - The pending transaction pool
// - Proof-of-work mining and reward sampling
// - Balance replay
// - Snapshot persistence

pub mod balance;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod ledger;
pub mod miner;
pub mod pool;
pub mod reward;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use crypto::{Address, DigitalSignature};
pub use ledger::ChainError;
pub use miner::MiningLimits;
pub use transaction::Transaction;
