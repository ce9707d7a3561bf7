//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/ugh/config.toml` unless a path is
//! given explicitly (`--config`).
//!
//! On Unix this module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/ugh/` (~/.config/ugh/)
//! - Data: `$XDG_DATA_HOME/ugh/` (~/.local/share/ugh/)
//! - State/Logs: `$XDG_STATE_HOME/ugh/` (~/.local/state/ugh/)
//!
//! On Windows config lives under `%APPDATA%` and data/state under
//! `%LOCALAPPDATA%`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "ugh";

/// Environment variable naming the replica cache directory.
pub const REPLICA_CACHE_ENV: &str = "TURSO_GO_CACHE_DIR";

/// Returns a best-effort home directory path.
pub(crate) fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Returns XDG_CONFIG_HOME or ~/.config (APPDATA on Windows)
pub(crate) fn config_home() -> PathBuf {
    if cfg!(windows) {
        return env_dir("APPDATA")
            .or_else(dirs::config_dir)
            .unwrap_or_else(home_dir);
    }
    env_dir("XDG_CONFIG_HOME").unwrap_or_else(|| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share (LOCALAPPDATA on Windows)
fn data_home() -> PathBuf {
    if cfg!(windows) {
        return env_dir("LOCALAPPDATA")
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(home_dir);
    }
    env_dir("XDG_DATA_HOME").unwrap_or_else(|| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state (LOCALAPPDATA on Windows)
fn state_home() -> PathBuf {
    if cfg!(windows) {
        return data_home();
    }
    env_dir("XDG_STATE_HOME").unwrap_or_else(|| home_dir().join(".local/state"))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Local database and remote replica
    #[serde(default)]
    pub db: DbConfig,

    /// Background sync daemon tunables
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging for CLI commands
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[db]` table
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DbConfig {
    /// Database file; defaults to `$XDG_DATA_HOME/ugh/ugh.db`
    pub path: Option<PathBuf>,

    /// Remote replica URL. Empty or missing disables sync.
    pub sync_url: Option<String>,

    /// Bearer token sent to the remote replica
    pub auth_token: Option<String>,

    /// Sync right after every CLI write
    #[serde(default)]
    pub sync_on_write: bool,
}

impl DbConfig {
    /// The configured sync URL, if non-blank.
    pub fn sync_url(&self) -> Option<&str> {
        self.sync_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Daemon log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// `[daemon]` table: an immutable snapshot of daemon tunables.
///
/// The running daemon swaps whole values on reload; it never mutates one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DaemonConfig {
    /// Time between periodic syncs
    #[serde(default = "default_periodic_sync", with = "duration_str")]
    pub periodic_sync: Duration,

    /// JSON log file; logs go to stderr as text when unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Retries after the first failed attempt of a sync
    #[serde(default = "default_sync_retry_max")]
    pub sync_retry_max: u32,

    /// Delay before the first retry; doubles on every further retry
    #[serde(default = "default_sync_retry_backoff", with = "duration_str")]
    pub sync_retry_backoff: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            periodic_sync: default_periodic_sync(),
            log_file: None,
            log_level: LogLevel::default(),
            sync_retry_max: default_sync_retry_max(),
            sync_retry_backoff: default_sync_retry_backoff(),
        }
    }
}

fn default_periodic_sync() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_sync_retry_max() -> u32 {
    3
}

fn default_sync_retry_backoff() -> Duration {
    Duration::from_secs(1)
}

impl DaemonConfig {
    /// Validate tunables, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.periodic_sync.is_zero() {
            return Err(Error::Config(
                "daemon.periodic_sync must be greater than zero".to_string(),
            ));
        }
        if self.sync_retry_backoff.is_zero() {
            return Err(Error::Config(
                "daemon.sync_retry_backoff must be greater than zero".to_string(),
            ));
        }
        if let Some(path) = &self.log_file {
            if !expand_home(path).is_absolute() {
                return Err(Error::Config(format!(
                    "daemon.log_file must be an absolute path, got {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Log file with `~/` expanded.
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(expand_home)
    }
}

/// Logging configuration for CLI commands
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let config_path = Self::config_path();
                if !config_path.exists() {
                    tracing::info!("No config file found at {:?}, using defaults", config_path);
                    Config::default()
                } else {
                    Self::load_from(&config_path)?
                }
            }
        };
        config.daemon.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/ugh/config.toml` (~/.config/ugh/config.toml)
    pub fn config_path() -> PathBuf {
        config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/ugh/` (~/.local/share/ugh/)
    pub fn data_dir() -> PathBuf {
        data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/ugh/` (~/.local/state/ugh/)
    pub fn state_dir() -> PathBuf {
        state_home().join(APP_DIR)
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/ugh/ugh.db` (~/.local/share/ugh/ugh.db)
    pub fn default_database_path() -> PathBuf {
        Self::data_dir().join("ugh.db")
    }

    /// Returns the CLI log file path
    ///
    /// `$XDG_STATE_HOME/ugh/ugh.log` (~/.local/state/ugh/ugh.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("ugh.log")
    }

    /// Database path from `db.path` (with `~/` expanded) or the default.
    ///
    /// This is the path the daemon uses; CLI-only overrides are applied by
    /// the caller and never reach the daemon.
    pub fn effective_db_path(&self) -> PathBuf {
        match &self.db.path {
            Some(path) if !path.as_os_str().is_empty() => expand_home(path),
            _ => Self::default_database_path(),
        }
    }
}

/// Replica cache directory for a database.
///
/// The base is `$TURSO_GO_CACHE_DIR` when set, otherwise `<dbDir>/.cache`.
/// Each database gets its own subdirectory, `<stem>-<hash>`, so databases
/// sharing a base never share a snapshot or sync state.
pub fn replica_cache_dir(db_path: &Path) -> PathBuf {
    replica_cache_dir_in(env_dir(REPLICA_CACHE_ENV), db_path)
}

fn replica_cache_dir_in(base: Option<PathBuf>, db_path: &Path) -> PathBuf {
    let base = base.unwrap_or_else(|| {
        db_path
            .parent()
            .map(|p| p.join(".cache"))
            .unwrap_or_else(|| PathBuf::from(".cache"))
    });
    base.join(replica_scope(db_path))
}

fn replica_scope(db_path: &Path) -> String {
    let absolute = if db_path.is_absolute() {
        db_path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(db_path))
            .unwrap_or_else(|_| db_path.to_path_buf())
    };
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "db".to_string());
    format!("{}-{}", stem, &hex::encode(digest)[..16])
}

/// Parse a Go-style duration such as `5m`, `1h30m`, `250ms` or `1.5s`.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("invalid duration {:?}: expected a number", input));
        }
        let number = &rest[..num_len];
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos: u128 = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3600 * 1_000_000_000,
            "" => return Err(format!("invalid duration {:?}: missing unit", input)),
            unit => return Err(format!("invalid duration {:?}: unknown unit {:?}", input, unit)),
        };
        rest = &rest[unit_len..];

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(format!("invalid duration {:?}", input));
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("invalid duration {:?}", input))?
        };
        let mut frac_nanos: u128 = 0;
        let mut scale = unit_nanos;
        for digit in frac.chars().filter_map(|c| c.to_digit(10)) {
            scale /= 10;
            frac_nanos += u128::from(digit) * scale;
        }
        total_nanos += whole * unit_nanos + frac_nanos;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| format!("duration {:?} is too large", input))?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

/// Format a duration the way [`parse_duration`] reads it.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d.subsec_nanos() != 0 {
        if d.as_nanos() % 1_000_000 == 0 {
            return format!("{}ms", d.as_millis());
        }
        return format!("{}ns", d.as_nanos());
    }
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 {
        out.push_str(&format!("{}s", s));
    }
    out
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
