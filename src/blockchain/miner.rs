use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::debug;
use rand::Rng;
use thiserror::Error;

use super::block::{hash_meets_difficulty, Block, NonceHasher, GENESIS_PREVIOUS_HASH, MAX_DIFFICULTY};
use super::crypto::Address;
use super::reward::sample_reward;
use super::transaction::Transaction;

/// How many attempts pass between deadline/cancel checks
const CHECK_INTERVAL: u64 = 4096;

/// Errors that can occur while searching for a proof of work
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("Proof-of-work search exhausted after {attempts} attempts")]
    Exhausted { attempts: u64 },

    #[error("Difficulty must be between 1 and {max}, got {difficulty}", max = MAX_DIFFICULTY)]
    UnsupportedDifficulty { difficulty: usize },
}

/// Bounds on a single proof-of-work search. The default is unbounded.
#[derive(Debug, Clone, Default)]
pub struct MiningLimits {
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl MiningLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u64) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }
}

/// Proof-of-work block producer
#[derive(Debug, Clone)]
pub struct Miner {
    difficulty: usize,
}

impl Miner {
    /// Fails for a difficulty no SHA-256 hex digest can meet
    pub fn new(difficulty: usize) -> Result<Self, MiningError> {
        if !(1..=MAX_DIFFICULTY).contains(&difficulty) {
            return Err(MiningError::UnsupportedDifficulty { difficulty });
        }
        Ok(Miner { difficulty })
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Mines the genesis block: index 0, previous hash `"0"`, no transactions
    pub fn mine_genesis(&self, limits: &MiningLimits) -> Result<Block, MiningError> {
        self.search(0, Utc::now(), Vec::new(), GENESIS_PREVIOUS_HASH.to_string(), limits)
    }

    /// Mines the block that follows `tip`
    ///
    /// # Arguments
    ///
    /// * `pending` - Transactions to include, in order
    /// * `tip` - The current last block of the chain
    /// * `reward_address` - If present, a reward transaction is appended for it
    /// * `limits` - Attempt, time and cancellation bounds for the search
    pub fn mine(
        &self,
        pending: Vec<Transaction>,
        tip: &Block,
        reward_address: Option<&Address>,
        limits: &MiningLimits,
    ) -> Result<Block, MiningError> {
        self.mine_with_rng(pending, tip, reward_address, limits, &mut rand::thread_rng())
    }

    pub fn mine_with_rng<R: Rng + ?Sized>(
        &self,
        mut pending: Vec<Transaction>,
        tip: &Block,
        reward_address: Option<&Address>,
        limits: &MiningLimits,
        rng: &mut R,
    ) -> Result<Block, MiningError> {
        if let Some(address) = reward_address {
            let (band, amount) = sample_reward(rng);
            debug!("Reward of {} ({:?} band) for {}", amount, band, address);
            pending.push(Transaction::new_reward(address.clone(), amount));
        }

        self.search(tip.index + 1, Utc::now(), pending, tip.hash.clone(), limits)
    }

    /// Increments the nonce from zero until the hash meets the difficulty.
    /// The timestamp is fixed for the whole search.
    fn search(
        &self,
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
        limits: &MiningLimits,
    ) -> Result<Block, MiningError> {
        let hasher = NonceHasher::new(index, &timestamp, &transactions, &previous_hash);
        let deadline = limits.timeout.map(|timeout| Instant::now() + timeout);
        let mut nonce: u64 = 0;

        loop {
            if limits.max_attempts.map_or(false, |max| nonce >= max) {
                return Err(MiningError::Exhausted { attempts: nonce });
            }

            if nonce % CHECK_INTERVAL == 0 && nonce > 0 {
                let expired = deadline.map_or(false, |deadline| Instant::now() >= deadline);
                if expired || limits.is_cancelled() {
                    return Err(MiningError::Exhausted { attempts: nonce });
                }
            }

            let hash = hasher.hash(nonce);
            if hash_meets_difficulty(&hash, self.difficulty) {
                debug!("Found proof for block {} after {} attempts", index, nonce + 1);
                return Ok(Block {
                    index,
                    timestamp,
                    transactions,
                    previous_hash,
                    nonce,
                    hash,
                });
            }

            nonce = nonce
                .checked_add(1)
                .ok_or(MiningError::Exhausted { attempts: u64::MAX })?;
        }
    }
}
