//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Database: SQLite persistence
//! - Storage: In-memory persistence for tests and dry runs
//! - Adapters: Front-end integrations (console)

pub mod config;
pub mod database;
pub mod storage;
pub mod adapters;
