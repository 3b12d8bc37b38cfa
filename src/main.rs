use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod auth;
mod blockchain;
mod config;

use config::{Cli, Command, KeygenArgs, ServeArgs, SignArgs, SignPayload};

// Open the ledger, restoring a snapshot when a data file is configured
fn initialize_blockchain(args: &ServeArgs) -> anyhow::Result<blockchain::Blockchain> {
    let genesis_limits = args.mining_limits();

    match &args.data_file {
        Some(path) => {
            let blockchain = blockchain::Blockchain::with_storage(path, args.difficulty, &genesis_limits)
                .with_context(|| format!("failed to open ledger snapshot {}", path.display()))?;
            info!(
                "Ledger backed by {} ({} blocks)",
                path.display(),
                blockchain.get_chain().len()
            );
            Ok(blockchain)
        }
        None => {
            warn!("No data file configured; the ledger lives in memory only");
            Ok(blockchain::Blockchain::new(args.difficulty, &genesis_limits)?)
        }
    }
}

fn keygen(args: KeygenArgs) -> anyhow::Result<()> {
    let dir = &args.identity.keys_dir;
    let identities = auth::identity::generate_key_files(dir, &args.identity.users, args.force)
        .with_context(|| format!("failed to generate keys in {}", dir.display()))?;

    for identity in &identities {
        info!("{} -> {}", identity.username(), identity.address());
    }
    Ok(())
}

// Client-side helper: prints what the login and transaction endpoints expect
fn sign(args: SignArgs) -> anyhow::Result<()> {
    let wallet = auth::identity::load_wallet(&args.keys_dir, &args.user)
        .with_context(|| format!("failed to load the private key of {}", args.user))?;

    let output = match args.payload {
        SignPayload::Challenge { message } => {
            serde_json::json!({ "signature": wallet.sign(message.as_bytes()) })
        }
        SignPayload::Transfer {
            receiver,
            amount,
            timestamp,
        } => {
            let mut transaction = blockchain::Transaction::new(
                wallet.address().clone(),
                blockchain::Address(receiver),
                amount,
            );
            if let Some(timestamp) = timestamp {
                transaction = transaction.with_timestamp(timestamp);
            }
            transaction.sign(&wallet)?;
            serde_json::to_value(&transaction)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::get_balance,
        api::handlers::get_identities,
        api::handlers::issue_challenge,
        api::handlers::login,
        api::handlers::verify_session,
        api::handlers::logout
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::DigitalSignature,
            api::handlers::ErrorResponse,
            api::handlers::ChainResponse,
            api::handlers::ValidationResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::BalanceResponse,
            api::handlers::IdentityResponse,
            api::handlers::IdentitiesResponse,
            api::handlers::ChallengeRequest,
            api::handlers::ChallengeResponse,
            api::handlers::LoginRequest,
            api::handlers::SessionRequest,
            api::handlers::SessionResponse,
            api::handlers::LogoutResponse
        )
    ),
    tags(
        (name = "codychain", description = "Ledger and authentication endpoints")
    ),
    info(
        title = "Codychain API",
        version = "0.1.0",
        description = "Single-authority proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let registry = auth::IdentityRegistry::load_from_dir(&args.identity.keys_dir, &args.identity.users)
        .with_context(|| format!("failed to load identities from {}", args.identity.keys_dir.display()))?;
    if registry.is_empty() {
        warn!("No identities loaded; run `codychain keygen` to provision users");
    } else {
        info!("Loaded {} identities", registry.len());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let state = web::Data::new(api::AppState {
        blockchain: initialize_blockchain(&args)?,
        auth: auth::AuthService::new(registry, args.auth_settings()),
        mining_limits: args.mining_limits().with_cancel(Arc::clone(&shutdown)),
    });

    let cors_origin = args.cors_origin.clone();
    info!("Starting HTTP server at http://{}:{}", args.host, args.port);

    let server = HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi())
            )
    })
    .bind((args.host.as_str(), args.port))
    .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?
    .run();

    let result = server.await;
    // Stop any search still running on the blocking pool.
    shutdown.store(true, Ordering::Release);
    Ok(result?)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    match Cli::parse().command() {
        Command::Serve(args) => serve(args).await,
        Command::Keygen(args) => keygen(args),
        Command::Sign(args) => sign(args),
    }
}
