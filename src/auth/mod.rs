// Auth module
//
// Provisioned identities, challenge-response login and the session table
// that gates transaction submission and mining.

pub mod identity;
pub mod service;

pub use identity::{Identity, IdentityRegistry};
pub use service::{AuthError, AuthService, AuthSettings, SignaturePolicy};
