//! Output writer shared by every subcommand.
//!
//! With `--json` each result is one JSON document on stdout and errors are
//! `{"error": "..."}` on stdout. Otherwise results are plain text and errors
//! go to stderr as `error: ...`.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use ugh_core::Task;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print `value` as JSON, or `text` in plain mode.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
        } else {
            let text = text();
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Ok(())
    }

    pub fn tasks(&self, tasks: &[Task]) -> Result<()> {
        self.emit(&tasks, || {
            tasks.iter().map(task_line).collect::<Vec<_>>().join("\n")
        })
    }

    /// Non-fatal problem; never changes the exit code.
    pub fn warn(&self, message: &str) {
        eprintln!("warning: {}", message);
    }

    pub fn error(&self, err: &anyhow::Error) {
        let message = format!("{:#}", err);
        if self.json {
            println!("{}", json!({ "error": message }));
        } else {
            eprintln!("error: {}", message);
        }
    }
}

/// `  3 [now] Buy groceries +home @errands due:2026-11-01`
pub fn task_line(task: &Task) -> String {
    let mut line = format!("{:>3} [{}] {}", task.id, task.state, task.title);
    for project in &task.projects {
        line.push_str(" +");
        line.push_str(project);
    }
    for context in &task.contexts {
        line.push_str(" @");
        line.push_str(context);
    }
    if let Some(due) = &task.due_on {
        line.push_str(" due:");
        line.push_str(due);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn task() -> Task {
        Task {
            id: 3,
            title: "Buy groceries".to_string(),
            notes: None,
            state: "now".to_string(),
            due_on: Some("2026-11-01".to_string()),
            projects: vec!["home".to_string()],
            contexts: vec!["errands".to_string()],
            meta: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_task_line() {
        assert_eq!(
            task_line(&task()),
            "  3 [now] Buy groceries +home @errands due:2026-11-01"
        );
    }

    #[test]
    fn test_task_line_without_links() {
        let mut t = task();
        t.projects.clear();
        t.contexts.clear();
        t.due_on = None;
        assert_eq!(task_line(&t), "  3 [now] Buy groceries");
    }
}
