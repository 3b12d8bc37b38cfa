use std::path::PathBuf;
use std::time::Duration;

use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};

use crate::auth::{AuthSettings, SignaturePolicy};
use crate::blockchain::block::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
use crate::blockchain::MiningLimits;

/// Single-authority proof-of-work ledger with challenge-response login
#[derive(Debug, Parser)]
#[command(name = "codychain", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve(ServeArgs),

    /// Generate Ed25519 key files for the provisioned users
    Keygen(KeygenArgs),

    /// Sign a login challenge or a transfer with a user's private key file
    Sign(SignArgs),
}

impl Cli {
    /// The chosen subcommand, defaulting to `serve` with env/default values
    pub fn command(self) -> Command {
        self.command
            .unwrap_or_else(|| Command::Serve(ServeArgs::parse_from(["serve"])))
    }
}

#[derive(Debug, Clone, Args)]
pub struct IdentityArgs {
    /// Directory holding `<user>_public.pem` / `<user>_private.pem`
    #[arg(long, env = "CODYCHAIN_KEYS_DIR", default_value = "data/keys")]
    pub keys_dir: PathBuf,

    /// Provisioned usernames
    #[arg(long, env = "CODYCHAIN_USERS", value_delimiter = ',', default_value = "cody,ezzy")]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Parser)]
pub struct ServeArgs {
    #[arg(long, env = "CODYCHAIN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "CODYCHAIN_PORT", default_value_t = 8000)]
    pub port: u16,

    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Snapshot file; the ledger is memory-only when unset
    #[arg(long, env = "CODYCHAIN_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Leading zero hex digits required of a block hash
    #[arg(
        long,
        env = "CODYCHAIN_DIFFICULTY",
        default_value_t = DEFAULT_DIFFICULTY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_DIFFICULTY as u64)
    )]
    pub difficulty: usize,

    #[arg(long, env = "CODYCHAIN_CHALLENGE_TTL_SECS", default_value_t = 300)]
    pub challenge_ttl_secs: u64,

    #[arg(long, env = "CODYCHAIN_SESSION_TTL_SECS", default_value_t = 86_400)]
    pub session_ttl_secs: u64,

    #[arg(long, env = "CODYCHAIN_SIGNATURE_POLICY", value_enum, default_value_t = SignaturePolicy::IfPresent)]
    pub signature_policy: SignaturePolicy,

    /// Wall-clock ceiling for one mining request
    #[arg(long, env = "CODYCHAIN_MINE_TIMEOUT_SECS", default_value_t = 60)]
    pub mine_timeout_secs: u64,

    /// Nonce attempt ceiling for one mining request
    #[arg(long, env = "CODYCHAIN_MINE_MAX_ATTEMPTS")]
    pub mine_max_attempts: Option<u64>,

    /// Allowed CORS origin; any origin when unset
    #[arg(long, env = "CODYCHAIN_CORS_ORIGIN")]
    pub cors_origin: Option<String>,
}

impl ServeArgs {
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            challenge_ttl: Duration::from_secs(self.challenge_ttl_secs),
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            signature_policy: self.signature_policy,
        }
    }

    /// Bounds for every proof-of-work search, genesis included
    pub fn mining_limits(&self) -> MiningLimits {
        let limits = MiningLimits::unbounded().with_timeout(Duration::from_secs(self.mine_timeout_secs));
        match self.mine_max_attempts {
            Some(attempts) => limits.with_max_attempts(attempts),
            None => limits,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct KeygenArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SignArgs {
    #[arg(long, env = "CODYCHAIN_KEYS_DIR", default_value = "data/keys")]
    pub keys_dir: PathBuf,

    /// User whose `<user>_private.pem` signs
    #[arg(long)]
    pub user: String,

    #[command(subcommand)]
    pub payload: SignPayload,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SignPayload {
    /// Sign the message returned by `/auth/challenge`
    Challenge { message: String },

    /// Sign a transfer from the user's address
    Transfer {
        #[arg(long)]
        receiver: String,

        #[arg(long)]
        amount: f64,

        /// Timestamp to sign; the current time when omitted
        #[arg(long)]
        timestamp: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let args = ServeArgs::parse_from(["serve"]);

        assert_eq!(args.port, 8000);
        assert_eq!(args.difficulty, 4);
        assert_eq!(args.identity.users, vec!["cody", "ezzy"]);
        assert_eq!(args.signature_policy, SignaturePolicy::IfPresent);
        assert_eq!(args.auth_settings().challenge_ttl, Duration::from_secs(300));
        assert_eq!(args.mining_limits().timeout, Some(Duration::from_secs(60)));
        assert!(args.data_file.is_none());
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::parse_from([
            "codychain",
            "serve",
            "--port",
            "9000",
            "--users",
            "alice,bob",
            "--signature-policy",
            "required",
        ]);
        match cli.command() {
            Command::Serve(args) => {
                assert_eq!(args.port, 9000);
                assert_eq!(args.identity.users, vec!["alice", "bob"]);
                assert_eq!(args.signature_policy, SignaturePolicy::Required);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["codychain", "keygen", "--force"]);
        assert!(matches!(cli.command(), Command::Keygen(KeygenArgs { force: true, .. })));

        let cli = Cli::parse_from([
            "codychain", "sign", "--user", "cody", "transfer", "--receiver", "B2", "--amount", "1.5",
        ]);
        match cli.command() {
            Command::Sign(SignArgs {
                user,
                payload: SignPayload::Transfer { receiver, amount, timestamp },
                ..
            }) => {
                assert_eq!(user, "cody");
                assert_eq!(receiver, "B2");
                assert_eq!(amount, 1.5);
                assert!(timestamp.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_difficulty_bounds() {
        assert!(ServeArgs::try_parse_from(["serve", "--difficulty", "65"]).is_err());
        assert!(ServeArgs::try_parse_from(["serve", "--difficulty", "0"]).is_err());

        let args = ServeArgs::try_parse_from(["serve", "--difficulty", "64"]).unwrap();
        assert_eq!(args.difficulty, 64);
    }

    #[test]
    fn test_mining_limits_from_flags() {
        let args = ServeArgs::parse_from(["serve", "--mine-timeout-secs", "5", "--mine-max-attempts", "100"]);
        let limits = args.mining_limits();

        assert_eq!(limits.timeout, Some(Duration::from_secs(5)));
        assert_eq!(limits.max_attempts, Some(100));
        assert!(limits.cancel.is_none());
    }
}
