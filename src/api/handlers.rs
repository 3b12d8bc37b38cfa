use std::fmt::Display;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{AuthError, AuthService, Identity};
use crate::blockchain::{
    Address, Block, Blockchain, BlockchainError, ChainError, DigitalSignature, MiningLimits,
    Transaction,
};

/// Everything the handlers share
pub struct AppState {
    pub blockchain: Blockchain,
    pub auth: AuthService,
    pub mining_limits: MiningLimits,
}

/// Data structure for the application state
pub type AppData = web::Data<AppState>;

/// Error body returned by every failing endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Display) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: message.to_string(),
    })
}

fn auth_error_response(err: &AuthError) -> HttpResponse {
    warn!("Rejected request: {}", err);
    let status = match err {
        AuthError::AddressMismatch { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::UNAUTHORIZED,
    };
    error_response(status, err)
}

fn blockchain_error_response(err: &BlockchainError) -> HttpResponse {
    warn!("Ledger operation failed: {}", err);
    let status = match err {
        BlockchainError::Pool(_) => StatusCode::BAD_REQUEST,
        BlockchainError::Chain(_) => StatusCode::CONFLICT,
        BlockchainError::Mining(_) => StatusCode::SERVICE_UNAVAILABLE,
        BlockchainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err)
}

fn require_session(token: Option<&str>) -> Result<&str, AuthError> {
    token.filter(|token| !token.is_empty()).ok_or(AuthError::InvalidSession)
}

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,

    /// Leading zero hex digits every block hash carries
    pub difficulty: usize,
}

/// Get the full blockchain
///
/// Returns a snapshot of every block and the chain's validity
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(state: AppData) -> impl Responder {
    let chain = state.blockchain.get_chain();
    let is_valid = state.blockchain.is_valid();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
        difficulty: state.blockchain.difficulty(),
    })
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    pub is_valid: bool,

    /// First integrity violation found, if any
    pub error: Option<String>,
}

/// Audit the blockchain
///
/// Re-validates every link and proof from genesis
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(state: AppData) -> impl Responder {
    let result: Result<(), ChainError> = state.blockchain.verify_full_chain();

    HttpResponse::Ok().json(ValidationResponse {
        is_valid: result.is_ok(),
        error: result.err().map(|err| err.to_string()),
    })
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(state.blockchain.get_pending_transactions())
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address; must belong to the session's user
    pub sender: String,

    /// The receiver's address
    pub receiver: String,

    /// The amount to transfer
    pub amount: f64,

    /// Hex signature over `sha256(sender:receiver:amount:timestamp)`
    pub signature: Option<String>,

    /// Timestamp used in the signed message
    pub timestamp: Option<String>,

    pub session_token: Option<String>,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,

    pub transaction: Transaction,
}

/// Create a new transaction
///
/// Adds a transaction to the pending pool after session and signature checks
#[utoipa::path(
    post,
    path = "/transaction/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction added to the pending pool", body = TransactionResponse),
        (status = 400, description = "Invalid transaction data", body = ErrorResponse),
        (status = 401, description = "Missing session or bad signature", body = ErrorResponse),
        (status = 403, description = "Sender does not belong to the session", body = ErrorResponse)
    )
)]
pub async fn new_transaction(
    state: AppData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let request = transaction_req.into_inner();
    let sender = Address(request.sender);

    let authorized = require_session(request.session_token.as_deref())
        .and_then(|token| state.auth.authorize(token, &sender));
    if let Err(err) = authorized {
        return auth_error_response(&err);
    }

    let transaction = Transaction {
        sender,
        receiver: Address(request.receiver),
        amount: request.amount,
        signature: request.signature.map(DigitalSignature),
        timestamp: request.timestamp,
    };

    if let Err(err) = state.auth.check_transaction_signature(&transaction) {
        return auth_error_response(&err);
    }

    match state.blockchain.submit_transaction(transaction.clone()) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: "Transaction added to pending pool".to_string(),
            block_index,
            transaction,
        }),
        Err(err) => blockchain_error_response(&err),
    }
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// Receives the mining reward; must belong to the session's user
    pub miner_address: Option<String>,

    pub session_token: Option<String>,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Mine a new block
///
/// Drains the pending pool into a new block, optionally paying a reward
#[utoipa::path(
    post,
    path = "/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
        (status = 403, description = "Miner address does not belong to the session", body = ErrorResponse),
        (status = 503, description = "Proof-of-work search exhausted", body = ErrorResponse)
    )
)]
pub async fn mine_block(state: AppData, mine_req: web::Json<MineRequest>) -> impl Responder {
    let request = mine_req.into_inner();
    let miner_address = request.miner_address.map(Address);

    let authorized = require_session(request.session_token.as_deref()).and_then(|token| {
        match &miner_address {
            Some(address) => state.auth.authorize(token, address).map(|_| ()),
            None => state.auth.verify(token).map(|_| ()),
        }
    });
    if let Err(err) = authorized {
        return auth_error_response(&err);
    }

    let worker_state = state.clone();
    let mined = tokio::task::spawn_blocking(move || {
        worker_state
            .blockchain
            .mine_pending(miner_address.as_ref(), &worker_state.mining_limits)
    })
    .await;

    match mined {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            message: "Block mined successfully".to_string(),
            block,
        }),
        Ok(Err(err)) => blockchain_error_response(&err),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,

    /// Received minus sent across the whole chain; may be negative
    pub balance: f64,
}

/// Get an address balance
///
/// Replays the chain for the given address
#[utoipa::path(
    get,
    path = "/balances/{address}",
    params(
        ("address" = String, Path, description = "Address to replay")
    ),
    responses(
        (status = 200, description = "Balance computed", body = BalanceResponse)
    )
)]
pub async fn get_balance(state: AppData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = state.blockchain.balance_of(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// A provisioned identity
#[derive(Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    pub username: String,
    pub address: String,

    /// Hex-encoded Ed25519 public key
    pub public_key: String,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        IdentityResponse {
            username: identity.username().to_string(),
            address: identity.address().0.clone(),
            public_key: identity.public_key_hex(),
        }
    }
}

/// Response for the identities endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct IdentitiesResponse {
    pub users: Vec<IdentityResponse>,
}

/// List known identities
#[utoipa::path(
    get,
    path = "/identities",
    responses(
        (status = 200, description = "Provisioned identities", body = IdentitiesResponse)
    )
)]
pub async fn get_identities(state: AppData) -> impl Responder {
    let users = state.auth.identities().iter().map(IdentityResponse::from).collect();
    HttpResponse::Ok().json(IdentitiesResponse { users })
}

/// Request for the challenge endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    pub username: String,
}

/// Response for the challenge endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChallengeResponse {
    pub challenge_token: String,

    /// The exact message to sign
    pub challenge: String,

    pub expires_in_secs: u64,
}

/// Request a login challenge
#[utoipa::path(
    post,
    path = "/auth/challenge",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 401, description = "Unknown user", body = ErrorResponse)
    )
)]
pub async fn issue_challenge(
    state: AppData,
    challenge_req: web::Json<ChallengeRequest>,
) -> impl Responder {
    match state.auth.issue_challenge(&challenge_req.username) {
        Ok(issued) => HttpResponse::Ok().json(ChallengeResponse {
            challenge_token: issued.challenge_token,
            challenge: issued.message,
            expires_in_secs: issued.expires_in.as_secs(),
        }),
        Err(err) => auth_error_response(&err),
    }
}

/// Request for the login endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub challenge_token: String,

    /// Hex signature over the challenge message
    pub signature: String,
}

/// Response for the login and verify endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub session_token: String,
    pub username: String,
    pub address: String,
}

/// Answer a challenge
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Unknown challenge or bad signature", body = ErrorResponse)
    )
)]
pub async fn login(state: AppData, login_req: web::Json<LoginRequest>) -> impl Responder {
    let request = login_req.into_inner();
    let signature = DigitalSignature(request.signature);

    match state.auth.login(&request.challenge_token, &signature) {
        Ok((session_token, identity)) => HttpResponse::Ok().json(SessionResponse {
            session_token,
            username: identity.username().to_string(),
            address: identity.address().0.clone(),
        }),
        Err(err) => auth_error_response(&err),
    }
}

/// Request carrying a session token
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionRequest {
    pub session_token: String,
}

/// Check a session
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Session is live", body = SessionResponse),
        (status = 401, description = "Invalid session", body = ErrorResponse)
    )
)]
pub async fn verify_session(state: AppData, session_req: web::Json<SessionRequest>) -> impl Responder {
    let request = session_req.into_inner();

    match state.auth.session_identity(&request.session_token) {
        Ok(identity) => HttpResponse::Ok().json(SessionResponse {
            session_token: request.session_token,
            username: identity.username().to_string(),
            address: identity.address().0.clone(),
        }),
        Err(err) => auth_error_response(&err),
    }
}

/// Response for the logout endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    /// Whether a live session was removed
    pub logged_out: bool,
}

/// End a session
///
/// Idempotent: logging out an unknown token succeeds with `logged_out: false`
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Session ended", body = LogoutResponse)
    )
)]
pub async fn logout(state: AppData, session_req: web::Json<SessionRequest>) -> impl Responder {
    let logged_out = state.auth.logout(&session_req.session_token);
    HttpResponse::Ok().json(LogoutResponse { logged_out })
}
