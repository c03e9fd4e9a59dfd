use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;

use crate::error::{IndexError, Result};

/// How an index artifact database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Fresh file for writing. Rollback journal with full sync, so the file is
    /// self-contained once the pool is closed and can be renamed into place.
    Create,
    /// Existing artifact, never modified.
    ReadOnly,
}

pub async fn connect(path: &Path, mode: OpenMode) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new().filename(path);
    let options = match mode {
        OpenMode::Create => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
            }
            options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Delete)
                .synchronous(SqliteSynchronous::Full)
        }
        OpenMode::ReadOnly => options.read_only(true).create_if_missing(false),
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
