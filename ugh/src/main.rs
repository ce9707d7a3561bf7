//! ugh - local-first task manager
//!
//! Usage:
//!   ugh list [--where EXPR] [--state S]... [--project P] [--all | --done | --todo]
//!   ugh add "Buy milk" --project home --context errands
//!   ugh sync
//!   ugh daemon {install,uninstall,start,stop,restart,status,logs,run}

mod daemon;
mod daemon_lock;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use ugh_core::filter::{self, ListTasksRequest, StickyContext};
use ugh_core::{
    logging, Config, Database, Filter, HttpReplica, NewTask, Replicator, SyncTarget,
};

use output::Output;

#[derive(Parser, Debug)]
#[command(name = "ugh")]
#[command(about = "Local-first task manager with background sync")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/ugh/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print results and errors as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tasks
    List(ListArgs),

    /// Add a task
    Add(AddArgs),

    /// Sync the database with the remote replica once
    Sync {
        #[command(flatten)]
        db: DbArg,
    },

    /// Manage the background sync daemon
    #[command(subcommand)]
    Daemon(daemon::DaemonCommand),
}

#[derive(Args, Debug, Default)]
struct DbArg {
    /// Database file for this command (the daemon ignores it)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Filter expression, e.g. 'state:now and (+work or @phone)'
    #[arg(long = "where", short = 'w', value_name = "EXPR")]
    filter: Option<String>,

    /// Include done tasks
    #[arg(long, short = 'a')]
    all: bool,

    /// Only done tasks
    #[arg(long)]
    done: bool,

    /// Only tasks that aren't done
    #[arg(long)]
    todo: bool,

    #[arg(long, short = 's')]
    state: Vec<String>,

    #[arg(long, short = 'p')]
    project: Vec<String>,

    #[arg(long, short = 'c')]
    context: Vec<String>,

    /// Text to match in title, notes, meta, projects or contexts
    #[arg(long, short = 't')]
    search: Vec<String>,

    /// Only tasks with a due date
    #[arg(long)]
    due: bool,

    /// Only tasks due on this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    due_on: Option<String>,

    #[arg(long = "id", value_name = "ID")]
    ids: Vec<i64>,

    /// Only tasks updated within the last N days
    #[arg(long, value_name = "DAYS")]
    recent: Option<u32>,

    /// Sticky project applied unless the query names a project
    #[arg(long, value_name = "NAME")]
    in_project: Option<String>,

    /// Sticky context applied unless the query names a context
    #[arg(long, value_name = "NAME")]
    in_context: Option<String>,

    #[command(flatten)]
    db: DbArg,
}

impl ListArgs {
    fn request(&self) -> Result<ListTasksRequest> {
        let user_filter = match self.filter.as_deref() {
            Some(expr) => filter::parse(expr).context("invalid filter expression")?,
            None => None,
        };
        // The default scope is pending-only, so `--state done` alone would
        // always come back empty.
        let wants_done = self.state.iter().any(|s| s.trim() == filter::DONE_STATE);
        let mut request = ListTasksRequest {
            all: self.all || (wants_done && !self.done && !self.todo),
            done_only: self.done,
            todo_only: self.todo,
            states: self.state.clone(),
            projects: self.project.clone(),
            contexts: self.context.clone(),
            search: self.search.clone(),
            due_only: self.due,
            due_on: self.due_on.clone().unwrap_or_default(),
            ids: self.ids.clone(),
            recent_days: self.recent,
            ..Default::default()
        };
        // A request filter replaces the field flags, so fold them in.
        if user_filter.is_some() {
            request.filter = Filter::and_opt(user_filter, request.fields_filter());
        }
        Ok(request)
    }

    fn sticky(&self) -> StickyContext {
        StickyContext {
            project: self.in_project.clone(),
            context: self.in_context.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct AddArgs {
    title: String,

    /// Initial state (default: inbox)
    #[arg(long, short = 's')]
    state: Option<String>,

    #[arg(long, short = 'p')]
    project: Vec<String>,

    #[arg(long, short = 'c')]
    context: Vec<String>,

    /// Due date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    due: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Metadata as key=value
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_meta)]
    meta: Vec<(String, String)>,

    #[command(flatten)]
    db: DbArg,
}

impl AddArgs {
    fn new_task(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            notes: self.notes.clone(),
            state: self.state.clone(),
            due_on: self.due.clone(),
            projects: self.project.clone(),
            contexts: self.context.clone(),
            meta: self.meta.iter().cloned().collect(),
        }
    }
}

fn parse_meta(input: &str) -> std::result::Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", input)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let out = Output::new(cli.json);

    match run(cli, out).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Command failed");
            out.error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, out: Output) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    // `daemon run` installs its own subscriber
    let _log_guard = match &cli.command {
        Command::Daemon(daemon::DaemonCommand::Run { .. }) => None,
        _ => Some(logging::init(&config.logging).context("failed to initialize logging")?),
    };

    match cli.command {
        Command::List(args) => cmd_list(&config, &args, out),
        Command::Add(args) => cmd_add(&config, &args, out).await,
        Command::Sync { db } => cmd_sync(&config, db.db.as_deref(), out).await,
        Command::Daemon(command) => daemon::run(command, cli.config.as_deref(), config, out).await,
    }
}

/// Open and migrate the database a CLI command works on.
fn open_database(config: &Config, db_override: Option<&Path>) -> Result<Database> {
    let db_path = cli_db_path(config, db_override);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    db.migrate().context("failed to run migrations")?;
    Ok(db)
}

fn cli_db_path(config: &Config, db_override: Option<&Path>) -> PathBuf {
    match db_override {
        Some(path) => ugh_core::config::expand_home(path),
        None => config.effective_db_path(),
    }
}

fn cmd_list(config: &Config, args: &ListArgs, out: Output) -> Result<()> {
    let request = args.request()?;
    let tree = filter::build_with_sticky(&request, &args.sticky()).context("invalid list request")?;
    let compiled = filter::compile(tree.as_ref()).context("invalid filter")?;
    if let Some(tree) = &tree {
        tracing::debug!(filter = %tree, "Listing tasks");
    }

    let db = open_database(config, args.db.db.as_deref())?;
    let tasks = db.list_tasks(&compiled).context("failed to list tasks")?;
    out.tasks(&tasks)
}

async fn cmd_add(config: &Config, args: &AddArgs, out: Output) -> Result<()> {
    let db = open_database(config, args.db.db.as_deref())?;
    let id = db.insert_task(&args.new_task()).context("failed to add task")?;
    let task = db
        .get_task(id)?
        .with_context(|| format!("task {} vanished after insert", id))?;
    drop(db);
    tracing::info!(id, "Task added");
    out.emit(&task, || format!("Added task {}", id))?;

    if config.db.sync_on_write && config.db.sync_url().is_some() {
        if let Err(e) = sync_once(config, args.db.db.as_deref()).await {
            tracing::warn!(error = %format!("{:#}", e), "Sync after write failed");
            out.warn(&format!("sync after write failed: {:#}", e));
        }
    }
    Ok(())
}

async fn cmd_sync(config: &Config, db_override: Option<&Path>, out: Output) -> Result<()> {
    let report = sync_once(config, db_override).await?;
    out.emit(&report, || {
        let mut parts = Vec::new();
        if report.pulled {
            parts.push("pulled");
        }
        if report.pushed {
            parts.push("pushed");
        }
        if parts.is_empty() {
            "Already in sync".to_string()
        } else {
            format!("Sync complete: {}", parts.join(", "))
        }
    })
}

/// One sync round with the configured replica. Ctrl+C cancels it.
async fn sync_once(config: &Config, db_override: Option<&Path>) -> Result<ugh_core::SyncReport> {
    let mut target = SyncTarget::from_config(config)
        .context("no sync URL configured (set db.sync_url in the config file)")?;
    if let Some(path) = db_override {
        target.db_path = ugh_core::config::expand_home(path);
        target.cache_dir = ugh_core::config::replica_cache_dir(&target.db_path);
    }

    let replica = HttpReplica::new().context("failed to create replica client")?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let result = replica.sync(&target, &cancel).await;
    interrupt.abort();
    let report = result.context("sync failed")?;
    tracing::info!(pulled = report.pulled, pushed = report.pushed, "Sync complete");
    Ok(report)
}
