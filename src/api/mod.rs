// API module
//
// Thin HTTP transport over the ledger and the auth service

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use handlers::AppState;
pub use routes::configure_routes;
