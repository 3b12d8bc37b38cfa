use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chain", web::get().to(handlers::get_chain))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
        .route("/transaction/new", web::post().to(handlers::new_transaction))
        .route("/mine", web::post().to(handlers::mine_block))
        .route("/balances/{address}", web::get().to(handlers::get_balance))
        .route("/identities", web::get().to(handlers::get_identities))
        .route("/dev-users", web::get().to(handlers::get_identities))
        .service(
            web::scope("/auth")
                .route("/challenge", web::post().to(handlers::issue_challenge))
                .route("/login", web::post().to(handlers::login))
                .route("/verify", web::post().to(handlers::verify_session))
                .route("/logout", web::post().to(handlers::logout)),
        );
}
