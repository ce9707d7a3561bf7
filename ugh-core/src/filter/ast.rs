//! Filter syntax tree
//!
//! A [`Filter`] is an immutable tree of predicates combined with AND, OR and
//! NOT. It knows nothing about SQL or the storage schema; the compiler in
//! [`super::sql`] lowers it, the builder in [`super::builder`] produces it.
//!
//! An absent filter (`Option<Filter>::None`) means "match everything".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Token meaning "any value present" for list-membership and due predicates.
pub const WILDCARD: &str = "*";

/// What a leaf predicate tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateKind {
    /// Task state (`inbox`, `now`, `waiting`, `later`, `done`, ...)
    State,
    /// Linked project name
    Project,
    /// Linked context name
    Context,
    /// Free-text search over title, notes, links and metadata
    Text,
    /// Due date
    Due,
    /// Numeric task id
    Id,
    /// Updated within the last N days
    Recent,
}

impl PredicateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredicateKind::State => "state",
            PredicateKind::Project => "project",
            PredicateKind::Context => "context",
            PredicateKind::Text => "text",
            PredicateKind::Due => "due",
            PredicateKind::Id => "id",
            PredicateKind::Recent => "recent",
        }
    }

    /// Whether an empty value is meaningful for this kind.
    ///
    /// Empty `due`, `project` and `context` mean "any value present", empty
    /// `text` matches everything and empty `recent` applies no window.
    pub fn permits_empty(&self) -> bool {
        !matches!(self, PredicateKind::State | PredicateKind::Id)
    }
}

impl std::str::FromStr for PredicateKind {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "state" | "s" => Ok(PredicateKind::State),
            "project" | "p" => Ok(PredicateKind::Project),
            "context" | "c" => Ok(PredicateKind::Context),
            "text" | "t" => Ok(PredicateKind::Text),
            "due" | "d" => Ok(PredicateKind::Due),
            "id" => Ok(PredicateKind::Id),
            "recent" | "r" => Ok(PredicateKind::Recent),
            _ => Err(FilterError::UnsupportedPredicate(s.to_string())),
        }
    }
}

/// Boolean combinator for [`Filter::Binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Filter tree node.
///
/// Children are boxed so every `Binary` and `Not` node owns non-null
/// subtrees and the tree cannot contain cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum Filter {
    Predicate {
        kind: PredicateKind,
        text: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Filter>,
        right: Box<Filter>,
    },
    Not {
        inner: Box<Filter>,
    },
}

impl Filter {
    pub fn predicate(kind: PredicateKind, text: impl Into<String>) -> Self {
        Filter::Predicate {
            kind,
            text: text.into(),
        }
    }

    pub fn and(left: Filter, right: Filter) -> Self {
        Filter::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Filter, right: Filter) -> Self {
        Filter::binary(BinaryOp::Or, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Filter::Not {
            inner: Box::new(inner),
        }
    }

    pub fn binary(op: BinaryOp, left: Filter, right: Filter) -> Self {
        Filter::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Combine a list of filters with `op`.
    ///
    /// Returns `None` for an empty list, the sole element for a list of one,
    /// and a left-associative tree otherwise: `[a, b, c]` becomes
    /// `((a op b) op c)`.
    pub fn fold(op: BinaryOp, filters: impl IntoIterator<Item = Filter>) -> Option<Filter> {
        filters
            .into_iter()
            .reduce(|acc, next| Filter::binary(op, acc, next))
    }

    /// AND two optional filters, treating `None` as "match all".
    pub fn and_opt(left: Option<Filter>, right: Option<Filter>) -> Option<Filter> {
        match (left, right) {
            (Some(l), Some(r)) => Some(Filter::and(l, r)),
            (l, r) => l.or(r),
        }
    }

    /// Whether any predicate in the tree has the given kind, including ones
    /// under a NOT.
    pub fn contains_kind(&self, kind: PredicateKind) -> bool {
        match self {
            Filter::Predicate { kind: k, .. } => *k == kind,
            Filter::Binary { left, right, .. } => {
                left.contains_kind(kind) || right.contains_kind(kind)
            }
            Filter::Not { inner } => inner.contains_kind(kind),
        }
    }

    /// Number of leaf predicates in the tree.
    pub fn predicate_count(&self) -> usize {
        match self {
            Filter::Predicate { .. } => 1,
            Filter::Binary { left, right, .. } => left.predicate_count() + right.predicate_count(),
            Filter::Not { inner } => inner.predicate_count(),
        }
    }
}

/// Renders the tree in the shell expression syntax accepted by
/// [`super::parse::parse`].
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Predicate { kind, text } => {
                if text.is_empty() && matches!(kind, PredicateKind::Due | PredicateKind::Recent) {
                    write!(f, "{}", kind.as_str())
                } else {
                    write!(f, "{}:{}", kind.as_str(), quote_value(text))
                }
            }
            Filter::Binary { op, left, right } => {
                let word = match op {
                    BinaryOp::And => "and",
                    BinaryOp::Or => "or",
                };
                write!(f, "({} {} {})", left, word, right)
            }
            Filter::Not { inner } => write!(f, "not {}", inner),
        }
    }
}

fn quote_value(text: &str) -> String {
    let plain = !text.is_empty()
        && !text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '(' | ')' | '\\'));
    if plain {
        return text.to_string();
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
