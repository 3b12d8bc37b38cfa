use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ed25519_dalek::VerifyingKey;
use log::{info, warn};
use thiserror::Error;

use crate::blockchain::crypto::{public_key_from_hex, Address, CryptoError, Wallet};

/// Errors that can occur while provisioning identities
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid key for {username}: {source}")]
    InvalidKey {
        username: String,
        #[source]
        source: CryptoError,
    },

    #[error("Key file already exists: {0} (use --force to overwrite)")]
    AlreadyExists(PathBuf),
}

/// A provisioned user: username, address and verifying key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    username: String,
    address: Address,
    public_key: VerifyingKey,
}

impl Identity {
    /// The address is the base58 fingerprint of the public key
    pub fn new(username: impl Into<String>, public_key: VerifyingKey) -> Self {
        Identity {
            username: username.into(),
            address: Address::from_public_key(&public_key),
            public_key,
        }
    }

    pub fn from_wallet(username: impl Into<String>, wallet: &Wallet) -> Self {
        Self::new(username, *wallet.public_key())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.as_bytes())
    }
}

/// The fixed username → identity table built at startup
#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    by_username: BTreeMap<String, Identity>,
}

impl IdentityRegistry {
    pub fn new(identities: impl IntoIterator<Item = Identity>) -> Self {
        IdentityRegistry {
            by_username: identities
                .into_iter()
                .map(|identity| (identity.username.clone(), identity))
                .collect(),
        }
    }

    /// Reads `<dir>/<user>_public.pem` for every user
    ///
    /// Users without a key file are skipped with a warning; a key file that
    /// cannot be parsed is an error.
    pub fn load_from_dir(dir: &Path, usernames: &[String]) -> Result<Self, IdentityError> {
        let mut identities = Vec::new();

        for username in usernames {
            let path = public_key_path(dir, username);
            let encoded = match fs::read_to_string(&path) {
                Ok(encoded) => encoded,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!("No public key for {} at {}, skipping", username, path.display());
                    continue;
                }
                Err(source) => return Err(IdentityError::Io { path, source }),
            };

            let public_key = public_key_from_hex(&encoded).map_err(|source| {
                IdentityError::InvalidKey {
                    username: username.clone(),
                    source,
                }
            })?;

            let identity = Identity::new(username.as_str(), public_key);
            info!("Loaded identity {} ({})", identity.username(), identity.address());
            identities.push(identity);
        }

        Ok(Self::new(identities))
    }

    pub fn get(&self, username: &str) -> Option<&Identity> {
        self.by_username.get(username)
    }

    pub fn by_address(&self, address: &Address) -> Option<&Identity> {
        self.by_username
            .values()
            .find(|identity| &identity.address == address)
    }

    /// Identities ordered by username
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.by_username.values()
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

pub fn public_key_path(dir: &Path, username: &str) -> PathBuf {
    dir.join(format!("{username}_public.pem"))
}

pub fn private_key_path(dir: &Path, username: &str) -> PathBuf {
    dir.join(format!("{username}_private.pem"))
}

/// Generates a keypair per user and writes both halves as hex
pub fn generate_key_files(dir: &Path, usernames: &[String], force: bool) -> Result<Vec<Identity>, IdentityError> {
    fs::create_dir_all(dir).map_err(|source| IdentityError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut identities = Vec::with_capacity(usernames.len());
    for username in usernames {
        let public_path = public_key_path(dir, username);
        let private_path = private_key_path(dir, username);

        if !force {
            if let Some(existing) = [&public_path, &private_path].into_iter().find(|p| p.exists()) {
                return Err(IdentityError::AlreadyExists(existing.clone()));
            }
        }

        let wallet = Wallet::new();
        write_key(&private_path, &wallet.export_secret_hex())?;
        write_key(&public_path, &wallet.public_key_hex())?;

        identities.push(Identity::from_wallet(username.as_str(), &wallet));
    }

    Ok(identities)
}

/// Reads `<dir>/<user>_private.pem` back into a signing wallet
pub fn load_wallet(dir: &Path, username: &str) -> Result<Wallet, IdentityError> {
    let path = private_key_path(dir, username);
    let encoded = fs::read_to_string(&path).map_err(|source| IdentityError::Io {
        path: path.clone(),
        source,
    })?;

    Wallet::from_secret_hex(&encoded).map_err(|source| IdentityError::InvalidKey {
        username: username.to_string(),
        source,
    })
}

fn write_key(path: &Path, hex_key: &str) -> Result<(), IdentityError> {
    fs::write(path, hex_key).map_err(|source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_registry_lookup() {
        let cody = Wallet::new();
        let ezzy = Wallet::new();
        let registry = IdentityRegistry::new([
            Identity::from_wallet("cody", &cody),
            Identity::from_wallet("ezzy", &ezzy),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("cody").unwrap().address(), cody.address());
        assert_eq!(registry.by_address(ezzy.address()).unwrap().username(), "ezzy");
        assert!(registry.get("mallory").is_none());
        assert!(registry.by_address(&Address::from("A1")).is_none());
    }

    #[test]
    fn test_generate_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let generated = generate_key_files(dir.path(), &users(&["cody", "ezzy"]), false).unwrap();

        let registry = IdentityRegistry::load_from_dir(dir.path(), &users(&["cody", "ezzy"])).unwrap();
        assert_eq!(registry.len(), 2);
        for identity in generated {
            assert_eq!(registry.get(identity.username()), Some(&identity));
        }

        let wallet = load_wallet(dir.path(), "cody").unwrap();
        assert_eq!(wallet.address(), registry.get("cody").unwrap().address());
    }

    #[test]
    fn test_loaded_wallet_signs_for_its_identity() {
        let dir = tempfile::tempdir().unwrap();
        let generated = generate_key_files(dir.path(), &users(&["ezzy"]), false).unwrap();
        let wallet = load_wallet(dir.path(), "ezzy").unwrap();

        let signature = wallet.sign(b"codychain_login_ezzy_00");
        assert!(crate::blockchain::crypto::verify_signature(
            b"codychain_login_ezzy_00",
            &signature,
            generated[0].public_key()
        )
        .unwrap());

        assert!(matches!(
            load_wallet(dir.path(), "mallory"),
            Err(IdentityError::Io { .. })
        ));
    }

    #[test]
    fn test_keygen_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        generate_key_files(dir.path(), &users(&["cody"]), false).unwrap();

        assert!(matches!(
            generate_key_files(dir.path(), &users(&["cody"]), false),
            Err(IdentityError::AlreadyExists(_))
        ));
        assert!(generate_key_files(dir.path(), &users(&["cody"]), true).is_ok());
    }

    #[test]
    fn test_missing_key_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        generate_key_files(dir.path(), &users(&["cody"]), false).unwrap();

        let registry = IdentityRegistry::load_from_dir(dir.path(), &users(&["cody", "ezzy"])).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("ezzy").is_none());
    }

    #[test]
    fn test_malformed_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(public_key_path(dir.path(), "cody"), "not hex").unwrap();

        assert!(matches!(
            IdentityRegistry::load_from_dir(dir.path(), &users(&["cody"])),
            Err(IdentityError::InvalidKey { .. })
        ));
    }
}
