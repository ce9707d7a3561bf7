//! Integration tests for the filter pipeline
//!
//! Each test goes shell text / list request → filter tree → compiled SQL →
//! SQLite, against a database file seeded with the same small task list.

use std::sync::Arc;
use std::time::Duration;

use ugh_core::config::Config;
use ugh_core::daemon::{Daemon, Phase};
use ugh_core::filter::{self, ListTasksRequest, StickyContext};
use ugh_core::{Database, FilterError, HttpReplica, NewTask, Task};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Fixture {
    _dir: TempDir,
    db: Database,
}

/// Seed:
///
/// | # | title | state | project | context | due |
/// |---|-------|-------|---------|---------|-----|
/// | 1 | Draft paper outline | now | research | desk | 2026-11-01 |
/// | 2 | Email reviewers | waiting | research | email | |
/// | 3 | Buy groceries | now | home | errands | |
/// | 4 | Fix bike | done | home | garage | |
/// | 5 | Read paper on CRDTs | later | | | 2026-12-15 |
fn fixture() -> Fixture {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db = Database::open(&dir.path().join("ugh.db")).expect("open");
    db.migrate().expect("migrate");

    let tasks = [
        NewTask::new("Draft paper outline")
            .state("now")
            .project("research")
            .context("desk")
            .due_on("2026-11-01"),
        NewTask::new("Email reviewers")
            .state("waiting")
            .project("research")
            .context("email")
            .meta("who", "Dr. Okafor"),
        NewTask::new("Buy groceries")
            .state("now")
            .project("home")
            .context("errands"),
        NewTask::new("Fix bike")
            .state("done")
            .project("home")
            .context("garage"),
        NewTask::new("Read paper on CRDTs")
            .state("later")
            .due_on("2026-12-15")
            .notes("the automerge one"),
    ];
    for task in &tasks {
        db.insert_task(task).expect("insert");
    }

    Fixture { _dir: dir, db }
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.title.as_str()).collect()
}

/// Parse, apply default scope, compile, run.
fn query(fx: &Fixture, expr: &str) -> Vec<Task> {
    let request = ListTasksRequest {
        filter: filter::parse(expr).expect("parse"),
        ..Default::default()
    };
    run(fx, &request, &StickyContext::default())
}

fn run(fx: &Fixture, request: &ListTasksRequest, sticky: &StickyContext) -> Vec<Task> {
    let tree = filter::build_with_sticky(request, sticky).expect("build");
    let compiled = filter::compile(tree.as_ref()).expect("compile");
    fx.db.list_tasks(&compiled).expect("list")
}

// ============================================
// Expression queries
// ============================================

#[test]
fn test_default_scope_hides_done() {
    let fx = fixture();
    assert_eq!(
        titles(&query(&fx, "")),
        vec![
            "Draft paper outline",
            "Email reviewers",
            "Buy groceries",
            "Read paper on CRDTs"
        ]
    );
}

#[test]
fn test_state_predicate_keeps_default_scope() {
    let fx = fixture();
    assert!(query(&fx, "state:done").is_empty());

    let done = ListTasksRequest {
        filter: filter::parse("state:done").unwrap(),
        done_only: true,
        ..Default::default()
    };
    assert_eq!(
        titles(&run(&fx, &done, &StickyContext::default())),
        vec!["Fix bike"]
    );
}

#[test]
fn test_nested_or_and_not() {
    let fx = fixture();
    let tasks = query(&fx, "not (state:now or state:waiting)");
    assert_eq!(titles(&tasks), vec!["Read paper on CRDTs"]);

    let all = ListTasksRequest {
        filter: filter::parse("not (state:now or state:waiting)").unwrap(),
        all: true,
        ..Default::default()
    };
    assert_eq!(
        titles(&run(&fx, &all, &StickyContext::default())),
        vec!["Fix bike", "Read paper on CRDTs"]
    );
}

#[test]
fn test_shorthand_terms() {
    let fx = fixture();
    assert_eq!(titles(&query(&fx, "+research @email")), vec!["Email reviewers"]);
    assert_eq!(titles(&query(&fx, "#3")), vec!["Buy groceries"]);
}

#[test]
fn test_text_search_covers_notes_meta_and_links() {
    let fx = fixture();
    assert_eq!(
        titles(&query(&fx, "paper")),
        vec!["Draft paper outline", "Read paper on CRDTs"]
    );
    assert_eq!(titles(&query(&fx, "automerge")), vec!["Read paper on CRDTs"]);
    assert_eq!(titles(&query(&fx, "okafor")), vec!["Email reviewers"]);
    assert_eq!(titles(&query(&fx, "errands")), vec!["Buy groceries"]);
}

#[test]
fn test_due_wildcard_and_exact() {
    let fx = fixture();
    assert_eq!(
        titles(&query(&fx, "due")),
        vec!["Draft paper outline", "Read paper on CRDTs"]
    );
    assert_eq!(
        titles(&query(&fx, "due:2026-12-15")),
        vec!["Read paper on CRDTs"]
    );
}

#[test]
fn test_hostile_input_is_inert() {
    let fx = fixture();
    let tasks = query(&fx, r#""x' OR '1'='1" or project:"home'; DROP TABLE tasks; --""#);
    assert!(tasks.is_empty());
    assert_eq!(fx.db.count_tasks().unwrap(), 5);
}

#[test]
fn test_invalid_id_is_rejected() {
    let tree = filter::parse("id:abc").unwrap();
    assert_eq!(
        filter::compile(tree.as_ref()).unwrap_err(),
        FilterError::InvalidId("abc".to_string())
    );
}

#[test]
fn test_unknown_key_is_rejected() {
    assert!(matches!(
        filter::parse("priority:high"),
        Err(FilterError::UnsupportedPredicate(_))
    ));
}

// ============================================
// List requests
// ============================================

#[test]
fn test_request_fields() {
    let fx = fixture();
    let request = ListTasksRequest {
        states: vec!["now".to_string(), "waiting".to_string()],
        project: "research".to_string(),
        ..Default::default()
    };
    assert_eq!(
        titles(&run(&fx, &request, &StickyContext::default())),
        vec!["Draft paper outline", "Email reviewers"]
    );
}

#[test]
fn test_request_scope_flags() {
    let fx = fixture();
    let done = ListTasksRequest {
        done_only: true,
        ..Default::default()
    };
    assert_eq!(
        titles(&run(&fx, &done, &StickyContext::default())),
        vec!["Fix bike"]
    );

    let all = ListTasksRequest {
        all: true,
        ..Default::default()
    };
    assert_eq!(run(&fx, &all, &StickyContext::default()).len(), 5);

    let conflict = ListTasksRequest {
        done_only: true,
        todo_only: true,
        ..Default::default()
    };
    assert_eq!(
        filter::build(&conflict).unwrap_err(),
        FilterError::ConflictingScope
    );
}

#[test]
fn test_sticky_project_yields_to_user_project() {
    let fx = fixture();
    let sticky = StickyContext {
        project: Some("research".to_string()),
        context: None,
    };

    let plain = ListTasksRequest::default();
    assert_eq!(
        titles(&run(&fx, &plain, &sticky)),
        vec!["Draft paper outline", "Email reviewers"]
    );

    let explicit = ListTasksRequest {
        filter: filter::parse("project:home").unwrap(),
        all: true,
        ..Default::default()
    };
    assert_eq!(
        titles(&run(&fx, &explicit, &sticky)),
        vec!["Buy groceries", "Fix bike"]
    );
}

#[test]
fn test_recent_window() {
    let fx = fixture();
    fx.db
        .connection()
        .execute(
            "UPDATE tasks SET updated_at = datetime('now', '-40 days') WHERE id IN (1, 2)",
            [],
        )
        .unwrap();

    let request = ListTasksRequest {
        recent_days: Some(30),
        all: true,
        ..Default::default()
    };
    assert_eq!(
        titles(&run(&fx, &request, &StickyContext::default())),
        vec!["Buy groceries", "Fix bike", "Read paper on CRDTs"]
    );
}

// ============================================
// Daemon wiring
// ============================================

#[tokio::test]
async fn test_daemon_without_sync_url_does_not_touch_database() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("never.db");
    let mut config = Config::default();
    config.db.path = Some(db_path.clone());
    config.daemon.periodic_sync = Duration::from_millis(50);

    let replica = Arc::new(HttpReplica::new().unwrap());
    let daemon = Daemon::new(config, replica).unwrap();
    let handle = daemon.handle();
    daemon.run(CancellationToken::new()).await.unwrap();

    assert_eq!(handle.status().phase, Phase::Stopped);
    assert!(!db_path.exists());
}
