//! # ugh-core
//!
//! Core library for ugh - a local-first task manager with background sync.
//!
//! This library provides:
//! - Filter expressions: parsing, building from list requests, and
//!   compiling to parameterized SQL
//! - Database storage layer with SQLite
//! - Remote replica client and the periodic sync daemon
//! - Service-manager adapters (systemd, launchd) for running the daemon
//! - Configuration management and logging infrastructure
//! - Advisory file locks shared by the daemon and `ugh sync`
//!
//! ## Example
//!
//! ```rust,no_run
//! use ugh_core::{filter, Config, Database};
//!
//! let config = Config::load(None).expect("failed to load config");
//! let db = Database::open(&config.effective_db_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let tree = filter::parse("state:now and +work").expect("bad filter");
//! let compiled = filter::compile(tree.as_ref()).expect("compile");
//! for task in db.list_tasks(&compiled).expect("query") {
//!     println!("{} {}", task.id, task.title);
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use daemon::{Daemon, DaemonHandle, DaemonStatus};
pub use db::Database;
pub use error::{Error, FilterError, Result, ServiceError, SyncError};
pub use filter::{CompiledFilter, Filter};
pub use replica::{HttpReplica, Replicator, SyncReport, SyncTarget};
pub use types::*;

// Public modules
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod filter;
pub mod lock;
pub mod logging;
pub mod replica;
pub mod service;
pub mod types;
