use thiserror::Error;

use super::transaction::Transaction;

/// Errors that can occur when admitting a transaction to the pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Transaction amount must be positive: {amount}")]
    NonPositiveAmount { amount: f64 },
}

/// Transactions accepted but not yet mined, in submission order
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    pending: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a pool from previously pending transactions, dropping any
    /// that would not be admitted today
    pub fn from_pending(pending: Vec<Transaction>) -> Self {
        let mut pool = Self::new();
        for transaction in pending {
            let _ = pool.submit(transaction);
        }
        pool
    }

    /// Appends a transaction to the tail of the pool
    ///
    /// Signatures and sessions are checked before this is called; the pool
    /// only enforces a positive, finite amount.
    pub fn submit(&mut self, transaction: Transaction) -> Result<(), PoolError> {
        if !(transaction.amount > 0.0 && transaction.amount.is_finite()) {
            return Err(PoolError::NonPositiveAmount {
                amount: transaction.amount,
            });
        }

        self.pending.push(transaction);
        Ok(())
    }

    /// Removes and returns every pending transaction
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
