//! Database layer for ugh
//!
//! SQLite storage for tasks and their project, context and meta links:
//! - Schema migrations via `PRAGMA user_version`
//! - Repository methods that take compiled filters

pub mod repo;
pub mod schema;

pub use repo::Database;
