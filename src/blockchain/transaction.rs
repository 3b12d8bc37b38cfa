use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use ed25519_dalek::VerifyingKey;

use super::crypto::{self, Address, CryptoError, DigitalSignature, Wallet};

/// Sender used for mining reward transactions
pub const REWARD_SENDER: &str = "SYSTEM";

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Transaction not signed")]
    NotSigned,

    #[error("Signed transaction carries no timestamp")]
    MissingTimestamp,

    #[error("Wallet address {wallet} does not match sender {sender}")]
    SenderMismatch { wallet: Address, sender: Address },

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Represents a transfer of tokens between two addresses
///
/// Field order is part of the block hash, so it must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender: Address,

    /// Receiver's address
    pub receiver: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Signature over the canonical signing message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<DigitalSignature>,

    /// ISO 8601 timestamp, kept verbatim because it is part of the signed message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "2024-01-01T12:00:00Z")]
    pub timestamp: Option<String>,
}

impl Transaction {
    /// Creates a new unsigned transaction
    pub fn new(sender: Address, receiver: Address, amount: f64) -> Self {
        Transaction {
            sender,
            receiver,
            amount,
            signature: None,
            timestamp: None,
        }
    }

    /// Creates a mining reward paid by the `SYSTEM` sentinel
    pub fn new_reward(receiver: Address, amount: f64) -> Self {
        Self::new(Address::from(REWARD_SENDER), receiver, amount)
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// The message clients sign: `sender:receiver:amount:timestamp`, amount
    /// rendered with exactly one decimal place.
    pub fn signing_message(&self) -> Result<String, TransactionError> {
        let timestamp = self
            .timestamp
            .as_deref()
            .ok_or(TransactionError::MissingTimestamp)?;

        Ok(format!(
            "{}:{}:{:.1}:{}",
            self.sender, self.receiver, self.amount, timestamp
        ))
    }

    /// SHA-256 of the signing message; these 32 bytes are what gets signed
    pub fn signing_digest(&self) -> Result<[u8; 32], TransactionError> {
        Ok(crypto::sha256(self.signing_message()?.as_bytes()))
    }

    /// Signs the transaction with a wallet, stamping the current time first
    /// if the transaction has no timestamp yet
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.signature.is_some() {
            return Err(TransactionError::AlreadySigned);
        }

        if wallet.address() != &self.sender {
            return Err(TransactionError::SenderMismatch {
                wallet: wallet.address().clone(),
                sender: self.sender.clone(),
            });
        }

        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        }

        let digest = self.signing_digest()?;
        self.signature = Some(wallet.sign(&digest));

        Ok(())
    }

    /// Verifies the transaction's signature against `public_key`
    pub fn verify_signature(&self, public_key: &VerifyingKey) -> Result<bool, TransactionError> {
        let signature = self.signature.as_ref().ok_or(TransactionError::NotSigned)?;
        let digest = self.signing_digest()?;

        Ok(crypto::verify_signature(&digest, signature, public_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new(Address::from("A1"), Address::from("B2"), 1.0);

        assert_eq!(transaction.sender.as_str(), "A1");
        assert_eq!(transaction.receiver.as_str(), "B2");
        assert_eq!(transaction.amount, 1.0);
        assert!(transaction.signature.is_none());
        assert_ne!(transaction.sender.as_str(), REWARD_SENDER);
    }

    #[test]
    fn test_signing_message_format() {
        let transaction = Transaction::new(Address::from("A1"), Address::from("B2"), 2.0)
            .with_timestamp("2024-01-01T12:00:00");

        assert_eq!(
            transaction.signing_message().unwrap(),
            "A1:B2:2.0:2024-01-01T12:00:00"
        );

        let fractional = Transaction::new(Address::from("A1"), Address::from("B2"), 0.26)
            .with_timestamp("t");
        assert_eq!(fractional.signing_message().unwrap(), "A1:B2:0.3:t");
    }

    #[test]
    fn test_sign_transaction() {
        let sender_wallet = Wallet::new();
        let mut transaction = Transaction::new(
            sender_wallet.address().clone(),
            Address::from("B2"),
            10.5,
        );

        transaction.sign(&sender_wallet).unwrap();

        assert!(transaction.signature.is_some());
        assert!(transaction.timestamp.is_some());
        assert!(transaction.verify_signature(sender_wallet.public_key()).unwrap());

        assert!(matches!(
            transaction.sign(&sender_wallet),
            Err(TransactionError::AlreadySigned)
        ));
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let wallet = Wallet::new();
        let mut transaction =
            Transaction::new(wallet.address().clone(), Address::from("B2"), 3.0);
        transaction.sign(&wallet).unwrap();

        transaction.amount = 30.0;
        assert!(!transaction.verify_signature(wallet.public_key()).unwrap());
    }

    #[test]
    fn test_sign_with_foreign_wallet_is_rejected() {
        let owner = Wallet::new();
        let other = Wallet::new();
        let mut transaction = Transaction::new(owner.address().clone(), Address::from("B2"), 1.0);

        assert!(matches!(
            transaction.sign(&other),
            Err(TransactionError::SenderMismatch { .. })
        ));
    }

    #[test]
    fn test_reward_transaction() {
        let transaction = Transaction::new_reward(Address::from("miner"), 0.4);

        assert_eq!(transaction.sender.as_str(), REWARD_SENDER);
        assert!(transaction.signature.is_none());
    }

    #[test]
    fn test_unset_optionals_are_omitted_from_json() {
        let transaction = Transaction::new(Address::from("A1"), Address::from("B2"), 1.0);
        assert_eq!(
            serde_json::to_string(&transaction).unwrap(),
            r#"{"sender":"A1","receiver":"B2","amount":1.0}"#
        );
    }
}
