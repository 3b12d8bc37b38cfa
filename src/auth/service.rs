use std::time::{Duration, Instant};

use dashmap::DashMap;
use ed25519_dalek::VerifyingKey;
use log::{debug, info, warn};
use thiserror::Error;

use super::identity::{Identity, IdentityRegistry};
use crate::blockchain::crypto::{self, Address, DigitalSignature};
use crate::blockchain::Transaction;

/// Leading component of every challenge message
pub const CHALLENGE_PREFIX: &str = "codychain_login";

/// Bytes of randomness in challenge and session tokens
const TOKEN_BYTES: usize = 32;

/// Bytes of randomness in a challenge message
const CHALLENGE_NONCE_BYTES: usize = 16;

/// Errors surfaced to callers as authorization failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown or expired challenge")]
    UnknownChallenge,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Session belongs to {expected}, not {found}")]
    AddressMismatch { expected: Address, found: Address },
}

/// Whether transaction signatures are checked at admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SignaturePolicy {
    /// Signatures are ignored
    Disabled,
    /// A supplied signature must verify; unsigned transactions are admitted
    #[default]
    IfPresent,
    /// Every transaction must carry a verifiable signature
    Required,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub challenge_ttl: Duration,
    pub session_ttl: Duration,
    pub signature_policy: SignaturePolicy,
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            challenge_ttl: Duration::from_secs(5 * 60),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            signature_policy: SignaturePolicy::default(),
        }
    }
}

#[derive(Debug)]
struct PendingChallenge {
    message: String,
    username: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct Session {
    username: String,
    created_at: Instant,
    expires_at: Instant,
}

/// What the client needs to answer a challenge
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub challenge_token: String,
    pub message: String,
    pub expires_in: Duration,
}

/// Challenge-response login and session bookkeeping
#[derive(Debug)]
pub struct AuthService {
    identities: IdentityRegistry,
    challenges: DashMap<String, PendingChallenge>,
    sessions: DashMap<String, Session>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(identities: IdentityRegistry, settings: AuthSettings) -> Self {
        AuthService {
            identities,
            challenges: DashMap::new(),
            sessions: DashMap::new(),
            settings,
        }
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    /// Issues a single-use challenge for a provisioned user
    pub fn issue_challenge(&self, username: &str) -> Result<IssuedChallenge, AuthError> {
        if self.identities.get(username).is_none() {
            return Err(AuthError::UnknownUser(username.to_string()));
        }

        self.purge_expired_challenges();

        let challenge_token = crypto::random_hex(TOKEN_BYTES);
        let message = format!(
            "{}_{}_{}",
            CHALLENGE_PREFIX,
            username,
            crypto::random_hex(CHALLENGE_NONCE_BYTES)
        );

        self.challenges.insert(
            challenge_token.clone(),
            PendingChallenge {
                message: message.clone(),
                username: username.to_string(),
                expires_at: Instant::now() + self.settings.challenge_ttl,
            },
        );
        debug!("Issued challenge for {}", username);

        Ok(IssuedChallenge {
            challenge_token,
            message,
            expires_in: self.settings.challenge_ttl,
        })
    }

    /// Answers a challenge with a signature over its message
    ///
    /// The challenge is consumed whatever the outcome.
    ///
    /// # Returns
    ///
    /// A new session token and the identity it is bound to
    pub fn login(
        &self,
        challenge_token: &str,
        signature: &DigitalSignature,
    ) -> Result<(String, Identity), AuthError> {
        let (_, challenge) = self
            .challenges
            .remove(challenge_token)
            .ok_or(AuthError::UnknownChallenge)?;

        let now = Instant::now();
        if now >= challenge.expires_at {
            return Err(AuthError::UnknownChallenge);
        }

        let identity = self
            .identities
            .get(&challenge.username)
            .ok_or_else(|| AuthError::UnknownUser(challenge.username.clone()))?
            .clone();

        match crypto::verify_signature(challenge.message.as_bytes(), signature, identity.public_key()) {
            Ok(true) => {}
            Ok(false) | Err(_) => return Err(AuthError::BadSignature),
        }

        self.purge_expired_sessions();

        let session_token = crypto::random_hex(TOKEN_BYTES);
        self.sessions.insert(
            session_token.clone(),
            Session {
                username: challenge.username,
                created_at: now,
                expires_at: now + self.settings.session_ttl,
            },
        );
        info!("{} logged in", identity.username());

        Ok((session_token, identity))
    }

    /// Returns the username bound to a live session
    pub fn verify(&self, session_token: &str) -> Result<String, AuthError> {
        let session = self
            .sessions
            .get(session_token)
            .ok_or(AuthError::InvalidSession)?;

        if Instant::now() >= session.expires_at {
            return Err(AuthError::InvalidSession);
        }

        Ok(session.username.clone())
    }

    /// The identity bound to a live session
    pub fn session_identity(&self, session_token: &str) -> Result<Identity, AuthError> {
        let username = self.verify(session_token)?;
        self.identities
            .get(&username)
            .cloned()
            .ok_or(AuthError::UnknownUser(username))
    }

    /// Ends a session. Logging out an unknown token is not an error.
    ///
    /// # Returns
    ///
    /// Whether a session was removed
    pub fn logout(&self, session_token: &str) -> bool {
        let removed = self.sessions.remove(session_token);
        if let Some((_, session)) = &removed {
            info!(
                "{} logged out after {}s",
                session.username,
                session.created_at.elapsed().as_secs()
            );
        }
        removed.is_some()
    }

    /// Checks that a live session acts for `acting_address`
    pub fn authorize(&self, session_token: &str, acting_address: &Address) -> Result<Identity, AuthError> {
        let identity = self.session_identity(session_token)?;

        if identity.address() != acting_address {
            return Err(AuthError::AddressMismatch {
                expected: identity.address().clone(),
                found: acting_address.clone(),
            });
        }

        Ok(identity)
    }

    /// Applies the signature policy to a transaction about to enter the pool
    pub fn check_transaction_signature(&self, transaction: &Transaction) -> Result<(), AuthError> {
        let policy = self.settings.signature_policy;

        match (policy, &transaction.signature) {
            (SignaturePolicy::Disabled, _) => return Ok(()),
            (SignaturePolicy::IfPresent, None) => return Ok(()),
            (SignaturePolicy::Required, None) => return Err(AuthError::BadSignature),
            (_, Some(_)) => {}
        }

        let public_key = match self.resolve_key(&transaction.sender) {
            Some(key) => key,
            None if policy == SignaturePolicy::IfPresent => {
                warn!(
                    "Signature provided for {} but no public key is known; admitting unchecked",
                    transaction.sender
                );
                return Ok(());
            }
            None => return Err(AuthError::BadSignature),
        };

        match transaction.verify_signature(&public_key) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(AuthError::BadSignature),
        }
    }

    /// Provisioned key for the address, else the address decoded as a key
    fn resolve_key(&self, address: &Address) -> Option<VerifyingKey> {
        self.identities
            .by_address(address)
            .map(|identity| *identity.public_key())
            .or_else(|| address.to_public_key().ok())
    }

    fn purge_expired_challenges(&self) {
        let now = Instant::now();
        self.challenges.retain(|_, challenge| challenge.expires_at > now);
    }

    fn purge_expired_sessions(&self) {
        let now = Instant::now();
        self.sessions.retain(|_, session| session.expires_at > now);
    }
}
