//! Lendkeeper library
//!
//! Community media lending: a loan ledger over SQLite, external
//! catalog resolution across eight providers, a due-date reminder
//! scheduler, and a read-only HTTP status surface.

pub mod api;
pub mod core;
pub mod db;
pub mod providers;
pub mod reminder;
pub mod resolver;

// Re-export commonly used types
pub use api::ApiServer;
pub use crate::core::{Config, LendingService};
pub use db::DatabaseManager;
pub use resolver::Resolver;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
