//! List requests to filter trees
//!
//! The CLI and the shell describe what to list with a loose bag of flags
//! ([`ListTasksRequest`]). [`build`] turns that bag into one canonical
//! [`Filter`], in this order:
//!
//! 1. an explicit tree on the request is used as-is; otherwise the scalar,
//!    list, search, due and id fields are folded into one,
//! 2. sticky session project/context are ANDed on unless the tree already
//!    mentions a project/context,
//! 3. the completion scope is resolved and ANDed on as a `state` predicate.
//!
//! The store consumes only the resulting tree; completion scope never
//! travels as a separate flag.

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

use super::ast::{BinaryOp, Filter, PredicateKind, WILDCARD};

/// State name of completed tasks.
pub const DONE_STATE: &str = "done";

/// Which tasks to consider by completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionScope {
    All,
    DoneOnly,
    TodoOnly,
}

impl CompletionScope {
    /// The scope expressed as a filter; `None` for [`CompletionScope::All`].
    pub fn to_filter(self) -> Option<Filter> {
        let done = Filter::predicate(PredicateKind::State, DONE_STATE);
        match self {
            CompletionScope::All => None,
            CompletionScope::DoneOnly => Some(done),
            CompletionScope::TodoOnly => Some(Filter::not(done)),
        }
    }
}

/// Request passed from the CLI/shell to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListTasksRequest {
    /// Pre-built filter; when present the convenience fields below are ignored
    pub filter: Option<Filter>,

    pub all: bool,
    pub done_only: bool,
    pub todo_only: bool,

    pub state: String,
    pub states: Vec<String>,
    pub project: String,
    pub projects: Vec<String>,
    pub context: String,
    pub contexts: Vec<String>,
    /// Every term must match
    pub search: Vec<String>,

    /// Only tasks with some due date
    pub due_only: bool,
    /// Tasks due on this exact date
    pub due_on: String,

    pub ids: Vec<i64>,

    /// Only tasks updated within this many days
    pub recent_days: Option<u32>,
}

impl ListTasksRequest {
    /// Fold the convenience fields into a tree, ignoring `filter` and scope.
    pub fn fields_filter(&self) -> Option<Filter> {
        let mut terms: Vec<Filter> = Vec::new();

        push_scalar(&mut terms, PredicateKind::State, &self.state);
        push_any_of(&mut terms, PredicateKind::State, &self.states);
        push_scalar(&mut terms, PredicateKind::Project, &self.project);
        push_any_of(&mut terms, PredicateKind::Project, &self.projects);
        push_scalar(&mut terms, PredicateKind::Context, &self.context);
        push_any_of(&mut terms, PredicateKind::Context, &self.contexts);

        terms.extend(
            self.search
                .iter()
                .filter(|term| !term.trim().is_empty())
                .map(|term| Filter::predicate(PredicateKind::Text, term.trim())),
        );

        if !self.due_on.trim().is_empty() {
            terms.push(Filter::predicate(PredicateKind::Due, self.due_on.trim()));
        } else if self.due_only {
            terms.push(Filter::predicate(PredicateKind::Due, WILDCARD));
        }

        if let Some(ids) = Filter::fold(
            BinaryOp::Or,
            self.ids
                .iter()
                .map(|id| Filter::predicate(PredicateKind::Id, id.to_string())),
        ) {
            terms.push(ids);
        }

        if let Some(days) = self.recent_days {
            terms.push(Filter::predicate(PredicateKind::Recent, days.to_string()));
        }

        Filter::fold(BinaryOp::And, terms)
    }

    /// Resolve the completion scope.
    ///
    /// `done_only` and `todo_only` together are a conflict. Either of them
    /// wins over `all`. With no flag set the scope is `TodoOnly`, whatever
    /// the tree says about `state`; callers that want done tasks set a flag.
    pub fn resolve_scope(&self) -> Result<CompletionScope, FilterError> {
        match (self.done_only, self.todo_only) {
            (true, true) => Err(FilterError::ConflictingScope),
            (true, false) => Ok(CompletionScope::DoneOnly),
            (false, true) => Ok(CompletionScope::TodoOnly),
            (false, false) if self.all => Ok(CompletionScope::All),
            (false, false) => Ok(CompletionScope::TodoOnly),
        }
    }
}

/// Project/context bound to an interactive shell session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickyContext {
    pub project: Option<String>,
    pub context: Option<String>,
}

impl StickyContext {
    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.context.is_none()
    }

    /// AND the sticky project/context onto `filter`.
    ///
    /// A sticky value is only added when the tree has no predicate of that
    /// kind anywhere, so explicit user predicates always win.
    pub fn apply(&self, filter: Option<Filter>) -> Option<Filter> {
        let mut result = filter;
        for (kind, value) in [
            (PredicateKind::Project, &self.project),
            (PredicateKind::Context, &self.context),
        ] {
            let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            if result.as_ref().is_some_and(|f| f.contains_kind(kind)) {
                continue;
            }
            result = Filter::and_opt(result, Some(Filter::predicate(kind, value)));
        }
        result
    }
}

/// Build the canonical tree for a request with no session context.
pub fn build(request: &ListTasksRequest) -> Result<Option<Filter>, FilterError> {
    build_with_sticky(request, &StickyContext::default())
}

/// Build the canonical tree for a request issued from a shell session.
pub fn build_with_sticky(
    request: &ListTasksRequest,
    sticky: &StickyContext,
) -> Result<Option<Filter>, FilterError> {
    let user = match &request.filter {
        Some(filter) => Some(filter.clone()),
        None => request.fields_filter(),
    };
    let scope = request.resolve_scope()?;
    let with_sticky = sticky.apply(user);
    Ok(Filter::and_opt(with_sticky, scope.to_filter()))
}

fn push_scalar(terms: &mut Vec<Filter>, kind: PredicateKind, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        terms.push(Filter::predicate(kind, value));
    }
}

fn push_any_of(terms: &mut Vec<Filter>, kind: PredicateKind, values: &[String]) {
    let leaves = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| Filter::predicate(kind, v));
    if let Some(any) = Filter::fold(BinaryOp::Or, leaves) {
        terms.push(any);
    }
}
