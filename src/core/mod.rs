//! Core application layer
//!
//! This module provides:
//! - The lending service (borrow/return policy)
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod config;
pub mod error;
pub mod lending;
pub mod logging;

pub use config::Config;
pub use error::{ErrorResponse, LendError, Result};
pub use lending::{BorrowReceipt, LendingService};
pub use logging::Logger;
