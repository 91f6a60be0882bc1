use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Build a pool for `url` without connecting.
///
/// The first query opens the connection, so an unreachable or unwritable
/// database surfaces there (see [`crate::sqlite_store::SqliteStore::ping`]).
pub fn connect_lazy(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid store url: {}", url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    // Ensure parent directory exists
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_lazy_with(options);

    Ok(pool)
}
