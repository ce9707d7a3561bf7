//! Filter expressions
//!
//! User input flows through three steps before it reaches SQLite:
//!
//! ```text
//! shell text ──parse──► Filter ──compile──► CompiledFilter ──► Database::list_tasks
//! CLI flags ──build───►
//! ```
//!
//! - [`ast`]: the immutable [`Filter`] tree
//! - [`parse`]: shell expression syntax
//! - [`builder`]: list requests, sticky session context and completion scope
//! - [`sql`]: lowering to a parameterized WHERE condition

pub mod ast;
pub mod builder;
pub mod parse;
pub mod sql;

pub use ast::{BinaryOp, Filter, PredicateKind, WILDCARD};
pub use builder::{
    build, build_with_sticky, CompletionScope, ListTasksRequest, StickyContext, DONE_STATE,
};
pub use parse::parse;
pub use sql::{compile, CompiledFilter, SqlValue};
