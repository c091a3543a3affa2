//! HTTP API module
//!
//! Read-only status surface over the ledger: health, aggregate stats,
//! per-user loans, overdue loans, and the return log.

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::ApiServer;
