use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::crypto::sha256_hex;
use super::transaction::Transaction;

/// Number of leading `'0'` hex digits a block hash needs by default
pub const DEFAULT_DIFFICULTY: usize = 4;

/// A SHA-256 hex digest has 64 digits, so no higher difficulty can be met
pub const MAX_DIFFICULTY: usize = 64;

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Represents a block in the blockchain
///
/// Serialized field order matches the hashed contents followed by `hash`,
/// so an exported chain can be re-hashed byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Timestamp fixed when mining of the block started
    #[schema(value_type = String, example = "2024-01-01T12:00:00.000000000Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions included in this block, in inclusion order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work
    pub nonce: u64,

    /// SHA-256 of the other fields
    pub hash: String,
}

/// The hashed part of a block, borrowed
#[derive(Serialize)]
struct BlockContents<'a> {
    index: u64,
    timestamp: &'a DateTime<Utc>,
    transactions: &'a [Transaction],
    previous_hash: &'a str,
    nonce: u64,
}

impl<'a> BlockContents<'a> {
    fn to_canonical_json(&self) -> Vec<u8> {
        // Only strings, integers, floats and timestamps: serialization cannot fail.
        serde_json::to_vec(self).expect("block contents always serialize to JSON")
    }
}

impl Block {
    /// Creates a block and computes its hash. The hash is not checked
    /// against any difficulty; that is the miner's job.
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
        nonce: u64,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    fn contents(&self) -> BlockContents<'_> {
        BlockContents {
            index: self.index,
            timestamp: &self.timestamp,
            transactions: &self.transactions,
            previous_hash: &self.previous_hash,
            nonce: self.nonce,
        }
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the canonical JSON of
    /// `{index, timestamp, transactions, previous_hash, nonce}` as lowercase hex
    pub fn calculate_hash(&self) -> String {
        sha256_hex(&self.contents().to_canonical_json())
    }

    /// Whether the stored hash is the hash of the block's own fields
    pub fn has_consistent_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        hash_meets_difficulty(&self.hash, difficulty)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

pub fn hash_meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Hashes candidate blocks that differ only in their nonce.
///
/// `nonce` is the last hashed field, so everything before its digits is
/// absorbed into the hasher once and cloned per attempt.
#[derive(Clone)]
pub(crate) struct NonceHasher {
    prefix: Sha256,
}

impl NonceHasher {
    pub(crate) fn new(
        index: u64,
        timestamp: &DateTime<Utc>,
        transactions: &[Transaction],
        previous_hash: &str,
    ) -> Self {
        let json = BlockContents {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
        }
        .to_canonical_json();

        // Serialization ends in `0}`: the zero nonce and the closing brace.
        let mut prefix = Sha256::new();
        prefix.update(&json[..json.len() - 2]);

        NonceHasher { prefix }
    }

    pub(crate) fn hash(&self, nonce: u64) -> String {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(b"}");
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Address;

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::new(Address::from("A1"), Address::from("B2"), 1.0),
            Transaction::new_reward(Address::from("A1"), 0.3),
        ]
    }

    #[test]
    fn test_new_block() {
        let block = Block::new(1, Utc::now(), sample_transactions(), "previous_hash".to_string(), 100);

        assert_eq!(block.index, 1);
        assert_eq!(block.nonce, 100);
        assert_eq!(block.previous_hash, "previous_hash");
        assert_eq!(block.hash.len(), 64);
        assert!(block.has_consistent_hash());
    }

    #[test]
    fn test_hash_changes_with_every_field() {
        let block = Block::new(1, Utc::now(), sample_transactions(), "prev".to_string(), 7);

        let mut other = block.clone();
        other.nonce += 1;
        assert_ne!(other.calculate_hash(), block.hash);

        let mut other = block.clone();
        other.previous_hash = "prev2".to_string();
        assert_ne!(other.calculate_hash(), block.hash);

        let mut other = block.clone();
        other.transactions[0].amount = 2.0;
        assert_ne!(other.calculate_hash(), block.hash);
    }

    #[test]
    fn test_nonce_hasher_matches_calculate_hash() {
        let timestamp = Utc::now();
        let transactions = sample_transactions();
        let hasher = NonceHasher::new(3, &timestamp, &transactions, "abc");

        for nonce in [0, 1, 9, 10, 12345, u64::MAX] {
            let block = Block::new(3, timestamp, transactions.clone(), "abc".to_string(), nonce);
            assert_eq!(hasher.hash(nonce), block.hash);
        }
    }

    #[test]
    fn test_hash_survives_json_export() {
        let block = Block::new(2, Utc::now(), sample_transactions(), "prev".to_string(), 42);

        let exported = serde_json::to_string(&block).unwrap();
        let imported: Block = serde_json::from_str(&exported).unwrap();

        assert_eq!(imported, block);
        assert!(imported.has_consistent_hash());
        assert!(exported.starts_with(r#"{"index":2,"timestamp":"#));
    }

    #[test]
    fn test_difficulty_prefix() {
        assert!(hash_meets_difficulty("0000ab", 4));
        assert!(!hash_meets_difficulty("000ab0", 4));
        assert!(hash_meets_difficulty("abc", 0));
        assert!(!hash_meets_difficulty("00", 4));
    }
}
