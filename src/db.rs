use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// How long a writer waits on a catalog locked by another `desk` process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the catalog database, creating the file and its directory if needed.
///
/// The upload and library commands may run as separate processes against
/// the same file, so connections use WAL and a busy timeout.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.catalog.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create catalog directory: {}", parent.display())
        })?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .with_context(|| format!("Invalid catalog path: {}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open catalog: {}", db_path.display()))?;

    Ok(pool)
}
