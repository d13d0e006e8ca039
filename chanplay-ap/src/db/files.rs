//! Stored file queries
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE files (id INTEGER PRIMARY KEY, filename TEXT NOT NULL, path TEXT NOT NULL)
//! ```

use crate::error::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// One row of the `files` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: i64,
    /// Display name
    pub filename: String,
    /// Location of the audio data on disk
    pub path: PathBuf,
}

/// SQLite-backed registry of stored audio files
#[derive(Debug, Clone)]
pub struct FileStore {
    pool: Pool<Sqlite>,
}

impl FileStore {
    /// Open (or create) the store database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        info!("Opened file store at {}", path.display());
        Ok(store)
    }

    /// Private in-memory store (single connection so every query sees the same database)
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY,
                filename TEXT NOT NULL,
                path TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Register a file and return its id
    pub async fn insert(&self, filename: &str, path: &Path) -> Result<i64> {
        let result = sqlx::query("INSERT INTO files (filename, path) VALUES (?, ?)")
            .bind(filename)
            .bind(path.to_string_lossy().to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Look up a file by id
    pub async fn get(&self, id: i64) -> Result<StoredFile> {
        let row = sqlx::query("SELECT id, filename, path FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("stored file {}", id)))?;

        Ok(StoredFile {
            id: row.get("id"),
            filename: row.get("filename"),
            path: PathBuf::from(row.get::<String, _>("path")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = FileStore::in_memory().await.unwrap();
        let id = store.insert("intro.ogg", Path::new("/srv/audio/intro.ogg")).await.unwrap();

        let file = store.get(id).await.unwrap();
        assert_eq!(file.filename, "intro.ogg");
        assert_eq!(file.path, PathBuf::from("/srv/audio/intro.ogg"));
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let store = FileStore::in_memory().await.unwrap();
        assert!(matches!(store.get(42).await, Err(Error::NotFound(_))));
    }
}
