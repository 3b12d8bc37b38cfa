use std::path::Path;

use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use super::balance;
use super::block::Block;
use super::crypto::Address;
use super::ledger::{Chain, ChainError};
use super::miner::{Miner, MiningError, MiningLimits};
use super::pool::{PoolError, TransactionPool};
use super::storage::{SnapshotStore, StorageError};
use super::transaction::Transaction;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Chain and pending pool, always locked together
#[derive(Debug)]
struct LedgerState {
    chain: Chain,
    pool: TransactionPool,
    /// Bumped on every mutation that must reach the snapshot file
    revision: u64,
}

/// Copy of the ledger taken under the state lock and written after it is released
struct PendingSave {
    revision: u64,
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
}

/// The single authoritative ledger: chain, pending pool, miner and optional
/// snapshot file.
///
/// Mining cycles are serialised by their own lock. The state lock is held
/// to drain the pool and again to append, but never during the
/// proof-of-work search or while the snapshot file is written, so
/// submissions keep flowing while a block is mined and land in the
/// following block.
#[derive(Debug)]
pub struct Blockchain {
    state: Mutex<LedgerState>,
    mining: Mutex<()>,
    /// Revision of the newest snapshot on disk; also orders concurrent writes
    saved_revision: Mutex<u64>,
    miner: Miner,
    storage: Option<SnapshotStore>,
}

impl Blockchain {
    /// Creates an in-memory blockchain, mining a fresh genesis block
    ///
    /// # Arguments
    ///
    /// * `difficulty` - Leading zero hex digits required of every block hash
    /// * `genesis_limits` - Bounds on the genesis proof-of-work search
    pub fn new(difficulty: usize, genesis_limits: &MiningLimits) -> Result<Self, BlockchainError> {
        let miner = Miner::new(difficulty)?;
        let chain = Self::genesis_chain(&miner, genesis_limits)?;

        Ok(Self::from_parts(chain, TransactionPool::new(), miner, None))
    }

    /// Creates a blockchain backed by a snapshot file
    ///
    /// An existing snapshot is loaded and fully re-verified; otherwise a
    /// genesis block is mined and saved.
    pub fn with_storage<P: AsRef<Path>>(
        path: P,
        difficulty: usize,
        genesis_limits: &MiningLimits,
    ) -> Result<Self, BlockchainError> {
        let storage = SnapshotStore::new(path);
        let miner = Miner::new(difficulty)?;

        let (chain, pool) = match storage.load()? {
            Some(snapshot) => {
                let chain = Chain::from_blocks(snapshot.chain, difficulty)?;
                let pool = TransactionPool::from_pending(snapshot.pending_transactions);
                info!(
                    "Loaded {} blocks and {} pending transactions from {}",
                    chain.len(),
                    pool.len(),
                    storage.path().display()
                );
                (chain, pool)
            }
            None => {
                info!("No snapshot at {}, creating genesis block", storage.path().display());
                let chain = Self::genesis_chain(&miner, genesis_limits)?;
                storage.save(chain.blocks(), &[])?;
                (chain, TransactionPool::new())
            }
        };

        Ok(Self::from_parts(chain, pool, miner, Some(storage)))
    }

    fn genesis_chain(miner: &Miner, limits: &MiningLimits) -> Result<Chain, BlockchainError> {
        let genesis = miner.mine_genesis(limits)?;
        info!("Mined genesis block {}", genesis.hash);
        Ok(Chain::new(genesis, miner.difficulty())?)
    }

    fn from_parts(chain: Chain, pool: TransactionPool, miner: Miner, storage: Option<SnapshotStore>) -> Self {
        Blockchain {
            state: Mutex::new(LedgerState {
                chain,
                pool,
                revision: 0,
            }),
            mining: Mutex::new(()),
            saved_revision: Mutex::new(0),
            miner,
            storage,
        }
    }

    /// Adds a transaction to the pending pool
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction if it is
    /// mined next
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<u64, BlockchainError> {
        let (block_index, save) = {
            let mut state = self.state.lock();
            state.pool.submit(transaction)?;
            (state.chain.tip().index + 1, self.capture(&mut state))
        };
        self.persist(save);

        Ok(block_index)
    }

    /// Mines a new block from every pending transaction
    ///
    /// The pool is drained, and the drain saved, before the search starts.
    /// If the search or the append fails, the drained transactions are gone,
    /// from memory and from the snapshot file alike.
    ///
    /// # Arguments
    ///
    /// * `reward_address` - If present, receives a mining reward in the new block
    /// * `limits` - Bounds on the proof-of-work search
    pub fn mine_pending(
        &self,
        reward_address: Option<&Address>,
        limits: &MiningLimits,
    ) -> Result<Block, BlockchainError> {
        let _cycle = self.mining.lock();

        let (pending, tip, save) = {
            let mut state = self.state.lock();
            if state.pool.is_empty() {
                debug!("Mining with an empty pool");
            }
            let pending = state.pool.drain();
            let tip = state.chain.tip().clone();
            (pending, tip, self.capture(&mut state))
        };
        self.persist(save);
        let drained = pending.len();

        let block = self.miner.mine(pending, &tip, reward_address, limits)?;

        let save = {
            let mut state = self.state.lock();
            state.chain.append(block.clone())?;
            self.capture(&mut state)
        };
        self.persist(save);

        info!(
            "Appended block {} with {} transactions ({} from the pool)",
            block.index,
            block.transactions.len(),
            drained
        );
        Ok(block)
    }

    /// A point-in-time copy of the chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.state.lock().chain.snapshot()
    }

    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().pool.pending().to_vec()
    }

    /// Replays a snapshot of the chain; the lock is released before replay
    pub fn balance_of(&self, address: &Address) -> f64 {
        let blocks = self.get_chain();
        balance::balance_of(&blocks, address)
    }

    /// Re-validates every link and proof from genesis
    pub fn verify_full_chain(&self) -> Result<(), ChainError> {
        let chain = self.state.lock().chain.clone();
        chain.verify_full_chain()
    }

    pub fn is_valid(&self) -> bool {
        self.verify_full_chain().is_ok()
    }

    pub fn difficulty(&self) -> usize {
        self.miner.difficulty()
    }

    /// Copies the state for saving, if a snapshot file is configured
    fn capture(&self, state: &mut LedgerState) -> Option<PendingSave> {
        self.storage.as_ref()?;

        state.revision += 1;
        Some(PendingSave {
            revision: state.revision,
            blocks: state.chain.snapshot(),
            pending: state.pool.pending().to_vec(),
        })
    }

    /// Writes a captured state unless a newer one is already on disk. The
    /// in-memory state stays canonical when this fails.
    fn persist(&self, save: Option<PendingSave>) {
        let (storage, save) = match (&self.storage, save) {
            (Some(storage), Some(save)) => (storage, save),
            _ => return,
        };

        let mut saved_revision = self.saved_revision.lock();
        if save.revision <= *saved_revision {
            debug!("Snapshot revision {} superseded by {}", save.revision, *saved_revision);
            return;
        }

        match storage.save(&save.blocks, &save.pending) {
            Ok(()) => *saved_revision = save.revision,
            Err(err) => warn!("Failed to save snapshot: {}", err),
        }
    }
}
