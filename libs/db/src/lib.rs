//! Database handle for the membership service.
//!
//! Wraps a SQLx SQLite pool with typed connection options and the DSN
//! normalization the server needs (relative file paths are anchored at the
//! service home directory, in-memory databases pin a single connection).
//!
//! # Example
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> db::Result<()> {
//!     use db::{ConnectOpts, DbHandle};
//!
//!     let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
//!     sqlx::query("select 1").execute(db.pool()).await?;
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod errors;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for the DB handle and helpers.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Empty SQLite path in DSN")]
    EmptyPath,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Connection options; each knob maps onto the SQLx pool builder.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Option<Duration>,
    /// SQLite busy timeout (PRAGMA busy_timeout).
    pub sqlite_busy_timeout: Option<Duration>,
    /// For SQLite file DSNs, create parent directories if missing.
    pub create_sqlite_dirs: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            acquire_timeout: Some(Duration::from_secs(30)),
            sqlite_busy_timeout: Some(Duration::from_millis(5_000)),
            create_sqlite_dirs: true,
        }
    }
}

/// Main handle. Cheap to clone (the pool is reference counted).
#[derive(Clone, Debug)]
pub struct DbHandle {
    pool: SqlitePool,
    dsn: String,
}

pub fn is_memory_dsn(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

impl DbHandle {
    /// Validate that the DSN is a SQLite one.
    pub fn detect(dsn: &str) -> Result<()> {
        let s = dsn.trim_start();
        if s.starts_with("sqlite:") {
            Ok(())
        } else {
            Err(DbError::UnknownDsn(dsn.to_string()))
        }
    }

    /// Connect and build handle.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        Self::detect(dsn)?;
        let memory = is_memory_dsn(dsn);
        if !memory && opts.create_sqlite_dirs {
            create_parent_dirs(dsn)?;
        }

        let mut connect = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .foreign_keys(true);
        if let Some(busy) = opts.sqlite_busy_timeout {
            connect = connect.busy_timeout(busy);
        }
        if !memory {
            connect = connect
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let mut pool = SqlitePoolOptions::new();
        if memory {
            // every connection to :memory: is a separate database; keep exactly one alive
            pool = pool
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else if let Some(n) = opts.max_conns {
            pool = pool.max_connections(n);
        }
        if let Some(t) = opts.acquire_timeout {
            pool = pool.acquire_timeout(t);
        }

        let pool = pool.connect_with(connect).await?;
        tracing::debug!(dsn = %dsn, memory, "SQLite pool connected");

        Ok(Self {
            pool,
            dsn: dsn.to_string(),
        })
    }

    /// Wrap an existing pool (tests, embedding).
    pub fn from_pool(pool: SqlitePool, dsn: impl Into<String>) -> Self {
        Self {
            pool,
            dsn: dsn.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Graceful pool close.
    pub async fn close(self) {
        self.pool.close().await
    }
}

fn sqlite_path_part(dsn: &str) -> &str {
    dsn.strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
        .unwrap_or(dsn)
}

fn create_parent_dirs(dsn: &str) -> Result<()> {
    let raw = sqlite_path_part(dsn);
    if raw.starts_with("file:") {
        return Ok(());
    }
    let path = raw.split_once('?').map(|(p, _)| p).unwrap_or(raw);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Expand a sqlite DSN into an absolute-path DSN using a base directory.
/// - Keeps in-memory DSNs as `sqlite::memory:`.
/// - Normalizes backslashes into forward slashes.
pub fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path) -> Result<String> {
    DbHandle::detect(dsn)?;
    if is_memory_dsn(dsn) {
        return Ok("sqlite::memory:".to_string());
    }
    let raw = sqlite_path_part(dsn);
    let (path_str, query) = match raw.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (raw, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        return Err(DbError::EmptyPath);
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }

    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

// ===================== tests =====================
