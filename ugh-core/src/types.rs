//! Core domain types for ugh
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Task** | A unit of work with a title, a state and optional due date |
//! | **State** | Workflow bucket: `inbox`, `now`, `waiting`, `later`, `done` |
//! | **Project** | A named outcome a task belongs to (`+work`) |
//! | **Context** | Where/with what a task can be done (`@phone`) |
//! | **Meta** | Free-form `key:value` pairs attached to a task |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default state for new tasks.
pub const INBOX_STATE: &str = "inbox";

/// A stored task with its links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub notes: Option<String>,
    pub state: String,
    /// `YYYY-MM-DD`
    pub due_on: Option<String>,
    pub projects: Vec<String>,
    pub contexts: Vec<String>,
    pub meta: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.state == crate::filter::DONE_STATE
    }
}

/// Fields for inserting a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub notes: Option<String>,
    /// Defaults to [`INBOX_STATE`]
    pub state: Option<String>,
    pub due_on: Option<String>,
    pub projects: Vec<String>,
    pub contexts: Vec<String>,
    pub meta: BTreeMap<String, String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn project(mut self, name: impl Into<String>) -> Self {
        self.projects.push(name.into());
        self
    }

    pub fn context(mut self, name: impl Into<String>) -> Self {
        self.contexts.push(name.into());
        self
    }

    pub fn due_on(mut self, date: impl Into<String>) -> Self {
        self.due_on = Some(date.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}
