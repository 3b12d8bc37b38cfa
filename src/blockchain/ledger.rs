use thiserror::Error;

use super::block::{Block, GENESIS_PREVIOUS_HASH};

/// Errors raised when a block violates the chain's integrity rules
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Block {index} does not link to the previous block's hash")]
    BrokenLink { index: u64 },

    #[error("Block {index} has an invalid proof of work")]
    InvalidProof { index: u64 },

    #[error("Block index mismatch: expected {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("Invalid genesis block: {0}")]
    InvalidGenesis(String),
}

/// The ordered, hash-linked sequence of blocks. Append-only after genesis.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    difficulty: usize,
}

impl Chain {
    /// Starts a chain from a mined genesis block
    pub fn new(genesis: Block, difficulty: usize) -> Result<Self, ChainError> {
        validate_genesis(&genesis, difficulty)?;

        Ok(Chain {
            blocks: vec![genesis],
            difficulty,
        })
    }

    /// Rebuilds a chain from exported blocks, re-validating every one
    pub fn from_blocks(blocks: Vec<Block>, difficulty: usize) -> Result<Self, ChainError> {
        let chain = Chain { blocks, difficulty };
        chain.verify_full_chain()?;
        Ok(chain)
    }

    /// Appends a block after the current tip
    ///
    /// This is the only way the chain grows.
    pub fn append(&mut self, candidate: Block) -> Result<(), ChainError> {
        validate_successor(self.tip(), &candidate, self.difficulty)?;
        self.blocks.push(candidate);
        Ok(())
    }

    /// The most recently appended block
    pub fn tip(&self) -> &Block {
        // Construction always goes through genesis validation.
        self.blocks.last().expect("chain always holds a genesis block")
    }

    /// A point-in-time copy of every block
    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Walks the chain from genesis, re-checking every link and every proof.
    /// Reports the first offending block.
    pub fn verify_full_chain(&self) -> Result<(), ChainError> {
        let genesis = self
            .blocks
            .first()
            .ok_or_else(|| ChainError::InvalidGenesis("chain is empty".to_string()))?;
        validate_genesis(genesis, self.difficulty)?;

        for pair in self.blocks.windows(2) {
            validate_successor(&pair[0], &pair[1], self.difficulty)?;
        }

        Ok(())
    }
}

fn validate_genesis(genesis: &Block, difficulty: usize) -> Result<(), ChainError> {
    if !genesis.is_genesis() {
        return Err(ChainError::InvalidGenesis(format!(
            "index is {}",
            genesis.index
        )));
    }
    if genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(ChainError::InvalidGenesis(format!(
            "previous hash is {:?}",
            genesis.previous_hash
        )));
    }
    if !genesis.transactions.is_empty() {
        return Err(ChainError::InvalidGenesis(
            "genesis carries transactions".to_string(),
        ));
    }
    validate_proof(genesis, difficulty)
}

fn validate_successor(previous: &Block, candidate: &Block, difficulty: usize) -> Result<(), ChainError> {
    if candidate.previous_hash != previous.hash {
        return Err(ChainError::BrokenLink {
            index: candidate.index,
        });
    }

    let expected = previous.index + 1;
    if candidate.index != expected {
        return Err(ChainError::IndexMismatch {
            expected,
            found: candidate.index,
        });
    }

    validate_proof(candidate, difficulty)
}

fn validate_proof(block: &Block, difficulty: usize) -> Result<(), ChainError> {
    if !block.meets_difficulty(difficulty) || !block.has_consistent_hash() {
        return Err(ChainError::InvalidProof { index: block.index });
    }
    Ok(())
}
