//! Database module
//!
//! This module provides database management functionality including:
//! - Database connection pool management
//! - The loan repository and return audit log
//! - Database migrations
//! - Data models and schemas

pub mod manager;
pub mod migrations;
pub mod models;
pub mod repository;

pub use manager::DatabaseManager;
pub use models::{LedgerStats, Loan, ReturnLogEntry};
pub use repository::LoanRepository;
