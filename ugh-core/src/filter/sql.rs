//! Filter to SQL compiler
//!
//! Lowers a [`Filter`] into a WHERE condition over the task alias `t` plus a
//! positional list of bound arguments. User-supplied text only ever travels
//! as an argument; the fragment is assembled from fixed strings.

use rusqlite::types::{ToSql, ToSqlOutput};

use crate::error::FilterError;

use super::ast::{Filter, PredicateKind, WILDCARD};

/// Condition that matches every row.
pub const MATCH_ALL: &str = "1=1";

const DUE_PRESENT: &str = "(t.due_on IS NOT NULL AND t.due_on != '')";

const PROJECT_ANY: &str = "EXISTS (SELECT 1 FROM task_project_links tpl \
     JOIN projects p ON p.id = tpl.project_id WHERE tpl.task_id = t.id)";
const PROJECT_NAMED: &str = "EXISTS (SELECT 1 FROM task_project_links tpl \
     JOIN projects p ON p.id = tpl.project_id WHERE tpl.task_id = t.id AND p.name = ?)";

const CONTEXT_ANY: &str = "EXISTS (SELECT 1 FROM task_context_links tcl \
     JOIN contexts c ON c.id = tcl.context_id WHERE tcl.task_id = t.id)";
const CONTEXT_NAMED: &str = "EXISTS (SELECT 1 FROM task_context_links tcl \
     JOIN contexts c ON c.id = tcl.context_id WHERE tcl.task_id = t.id AND c.name = ?)";

const TEXT_SEARCH: &str = "(t.title LIKE ? OR t.notes LIKE ? \
     OR EXISTS (SELECT 1 FROM task_project_links tpl JOIN projects p ON p.id = tpl.project_id \
     WHERE tpl.task_id = t.id AND p.name LIKE ?) \
     OR EXISTS (SELECT 1 FROM task_context_links tcl JOIN contexts c ON c.id = tcl.context_id \
     WHERE tcl.task_id = t.id AND c.name LIKE ?) \
     OR EXISTS (SELECT 1 FROM task_meta m WHERE m.task_id = t.id AND (m.key LIKE ? OR m.value LIKE ?)))";
const TEXT_SEARCH_ARGS: usize = 6;

const RECENT_WINDOW: &str = "t.updated_at >= datetime('now', ?)";

/// Deepest tree [`compile`] lowers. Parsed expressions stay well below it;
/// hand-built trees past it are rejected instead of exhausting the stack.
pub const MAX_DEPTH: usize = 2048;

/// Scalar bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlValue::Text(s) => s.to_sql(),
            SqlValue::Integer(i) => i.to_sql(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

/// A compiled WHERE condition and its arguments.
///
/// Only [`compile`] can construct one, so anything accepting a
/// `CompiledFilter` is guaranteed to receive compiler output rather than
/// hand-assembled SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    sql: String,
    args: Vec<SqlValue>,
}

impl CompiledFilter {
    fn match_all() -> Self {
        Self {
            sql: MATCH_ALL.to_string(),
            args: Vec::new(),
        }
    }

    /// The condition, with `?` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Arguments in placeholder order.
    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }

    /// Whether the condition is the neutral `1=1` and may be omitted.
    pub fn is_match_all(&self) -> bool {
        self.sql == MATCH_ALL
    }

    /// Arguments as rusqlite parameters.
    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.args.iter().map(|a| a as &dyn ToSql).collect()
    }
}

/// Compile a filter tree. `None` compiles to `1=1` with no arguments.
pub fn compile(filter: Option<&Filter>) -> Result<CompiledFilter, FilterError> {
    let Some(filter) = filter else {
        return Ok(CompiledFilter::match_all());
    };
    let mut args = Vec::new();
    let sql = lower(filter, &mut args, 1)?;
    Ok(CompiledFilter { sql, args })
}

fn lower(node: &Filter, args: &mut Vec<SqlValue>, depth: usize) -> Result<String, FilterError> {
    if depth > MAX_DEPTH {
        return Err(FilterError::Parse(format!(
            "filter nested too deeply (at most {} levels)",
            MAX_DEPTH
        )));
    }
    match node {
        Filter::Predicate { kind, text } => lower_predicate(*kind, text.trim(), args),
        Filter::Binary { op, left, right } => {
            let l = lower(left, args, depth + 1)?;
            let r = lower(right, args, depth + 1)?;
            Ok(format!("({} {} {})", l, op.as_str(), r))
        }
        Filter::Not { inner } => {
            let inner = lower(inner, args, depth + 1)?;
            Ok(format!("(NOT ({}))", inner))
        }
    }
}

fn lower_predicate(
    kind: PredicateKind,
    value: &str,
    args: &mut Vec<SqlValue>,
) -> Result<String, FilterError> {
    if value.is_empty() && !kind.permits_empty() {
        return Err(match kind {
            PredicateKind::Id => FilterError::InvalidId(String::new()),
            _ => FilterError::Parse(format!("{} requires a value", kind.as_str())),
        });
    }

    let sql = match kind {
        PredicateKind::State => {
            args.push(value.into());
            "t.state = ?"
        }
        PredicateKind::Due => {
            if is_wildcard(value) {
                DUE_PRESENT
            } else {
                args.push(value.into());
                "t.due_on = ?"
            }
        }
        PredicateKind::Project => {
            if is_wildcard(value) {
                PROJECT_ANY
            } else {
                args.push(value.into());
                PROJECT_NAMED
            }
        }
        PredicateKind::Context => {
            if is_wildcard(value) {
                CONTEXT_ANY
            } else {
                args.push(value.into());
                CONTEXT_NAMED
            }
        }
        PredicateKind::Text => {
            if value.is_empty() {
                MATCH_ALL
            } else {
                let pattern = format!("%{}%", value);
                args.extend(std::iter::repeat(SqlValue::Text(pattern)).take(TEXT_SEARCH_ARGS));
                TEXT_SEARCH
            }
        }
        PredicateKind::Id => {
            args.push(SqlValue::Integer(parse_id(value)?));
            "t.id = ?"
        }
        PredicateKind::Recent => {
            if value.is_empty() {
                MATCH_ALL
            } else {
                let days: u32 = value
                    .parse()
                    .ok()
                    .filter(|d| *d > 0)
                    .ok_or_else(|| {
                        FilterError::Parse(format!("recent expects a number of days, got {:?}", value))
                    })?;
                args.push(SqlValue::Text(format!("-{} days", days)));
                RECENT_WINDOW
            }
        }
    };
    Ok(sql.to_string())
}

fn is_wildcard(value: &str) -> bool {
    value.is_empty() || value == WILDCARD
}

/// Parse a task id: a positive 64-bit integer.
pub fn parse_id(value: &str) -> Result<i64, FilterError> {
    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(FilterError::InvalidId(value.to_string())),
    }
}
