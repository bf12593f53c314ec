//! Catalog store on SQLite
//!
//! Persists folders, messages, the folder/message cross-reference and the
//! per-folder sequence metadata. Every write is a single auto-committed
//! `INSERT ... ON CONFLICT DO NOTHING` against a UNIQUE constraint, so the
//! existence check and the insert are one atomic step even with several
//! writers on the same database file. Rows are never updated or deleted.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS folders (
    folder_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS messages (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_identifier TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS folder_message_xref (
    folder_id INTEGER NOT NULL REFERENCES folders(folder_id),
    message_id INTEGER NOT NULL REFERENCES messages(message_id),
    UNIQUE(folder_id, message_id)
);

CREATE TABLE IF NOT EXISTS sequence_metadata (
    message_identifier TEXT NOT NULL REFERENCES messages(message_identifier),
    folder_name TEXT NOT NULL,
    sequence_number INTEGER NOT NULL,
    UNIQUE(message_identifier, folder_name, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_xref_message ON folder_message_xref(message_id);
CREATE INDEX IF NOT EXISTS idx_sequence_folder ON sequence_metadata(folder_name, sequence_number);
"#;

/// Row counts per catalog table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub folders: i64,
    pub messages: i64,
    pub cross_references: i64,
    pub sequences: i64,
}

/// Handle on the catalog database
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: Pool<Sqlite>,
}

impl CatalogStore {
    /// Open or create a catalog at the given path
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!(
                    "cannot create catalog directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        info!("Opening catalog at {}", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Open an in-memory catalog (for testing)
    #[cfg(test)]
    pub async fn open_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> AppResult<()> {
        debug!("Initializing catalog schema");
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for in-flight connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a folder row unless one with this name exists
    ///
    /// Returns whether a new row was created.
    pub async fn ensure_folder(&self, name: &str) -> AppResult<bool> {
        let result =
            sqlx::query("INSERT INTO folders (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
                .bind(name)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a message row unless one with this identifier exists
    ///
    /// Returns whether a new row was created.
    pub async fn ensure_message(&self, identifier: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO messages (message_identifier) VALUES (?) \
             ON CONFLICT(message_identifier) DO NOTHING",
        )
        .bind(identifier)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record that `identifier` appears in `folder_name`
    ///
    /// Ensures the message (and folder) rows first, then inserts the pair
    /// unless already present. Returns whether a new cross-reference row was
    /// created.
    pub async fn cross_reference(&self, identifier: &str, folder_name: &str) -> AppResult<bool> {
        self.ensure_message(identifier).await?;
        self.ensure_folder(folder_name).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO folder_message_xref (folder_id, message_id)
            SELECT f.folder_id, m.message_id
            FROM folders f, messages m
            WHERE f.name = ? AND m.message_identifier = ?
            ON CONFLICT(folder_id, message_id) DO NOTHING
            "#,
        )
        .bind(folder_name)
        .bind(identifier)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the sequence number `identifier` was seen at in `folder_name`
    ///
    /// Ensures the message row first. Triples from earlier runs are kept even
    /// if the mailbox has since been renumbered. Returns whether a new row was
    /// created.
    pub async fn record_sequence(
        &self,
        identifier: &str,
        folder_name: &str,
        sequence_number: u32,
    ) -> AppResult<bool> {
        self.ensure_message(identifier).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO sequence_metadata (message_identifier, folder_name, sequence_number)
            VALUES (?, ?, ?)
            ON CONFLICT(message_identifier, folder_name, sequence_number) DO NOTHING
            "#,
        )
        .bind(identifier)
        .bind(folder_name)
        .bind(i64::from(sequence_number))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Row counts for every table
    pub async fn counts(&self) -> AppResult<CatalogCounts> {
        Ok(CatalogCounts {
            folders: self.count("SELECT COUNT(*) FROM folders").await?,
            messages: self.count("SELECT COUNT(*) FROM messages").await?,
            cross_references: self.count("SELECT COUNT(*) FROM folder_message_xref").await?,
            sequences: self.count("SELECT COUNT(*) FROM sequence_metadata").await?,
        })
    }

    async fn count(&self, sql: &'static str) -> AppResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Names of the folders a message is catalogued in, sorted
    #[cfg(test)]
    pub async fn folders_for_message(&self, identifier: &str) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT f.name
            FROM folder_message_xref x
            JOIN folders f ON f.folder_id = x.folder_id
            JOIN messages m ON m.message_id = x.message_id
            WHERE m.message_identifier = ?
            ORDER BY f.name
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// `(sequence_number, message_identifier)` pairs recorded for a folder
    #[cfg(test)]
    pub async fn sequence_entries(&self, folder_name: &str) -> AppResult<Vec<(u32, String)>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT sequence_number, message_identifier
            FROM sequence_metadata
            WHERE folder_name = ?
            ORDER BY sequence_number, message_identifier
            "#,
        )
        .bind(folder_name)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(seq, id)| {
                u32::try_from(seq)
                    .map(|seq| (seq, id))
                    .map_err(|_| AppError::Store(format!("sequence number out of range: {seq}")))
            })
            .collect()
    }
}
