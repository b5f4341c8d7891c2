//! Key-value storage backing the settings cache.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use rusqlite::OptionalExtension;
use tokio::sync::RwLock;
use tokio_rusqlite::Connection;

use crate::chat::error::ChatResult;

/// Boxed future type for settings store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable string key-value store.
pub trait SettingsStore: Send + Sync {
    /// Read the latest value of `key`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load(&self, key: &'static str) -> StoreFuture<'_, ChatResult<Option<String>>>;
    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn save(&self, key: &'static str, value: String) -> StoreFuture<'_, ChatResult<()>>;
    /// Delete one key.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn remove(&self, key: &'static str) -> StoreFuture<'_, ChatResult<()>>;
    /// Delete every key.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn clear(&self) -> StoreFuture<'_, ChatResult<()>>;
}

/// `SQLite` implementation of settings storage.
pub struct SqliteSettingsStore {
    conn: Connection,
    table: String,
}

impl SqliteSettingsStore {
    /// Table name for settings.
    pub const DEFAULT_TABLE: &'static str = "app_preferences";

    /// Open (or create) the settings database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> ChatResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::with_connection(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> ChatResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load(&self, key: &'static str) -> StoreFuture<'_, ChatResult<Option<String>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn save(&self, key: &'static str, value: String) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (key, value) VALUES (?1, ?2)
                             ON CONFLICT(key) DO UPDATE SET value = excluded.value"
                        ),
                        rusqlite::params![key, value],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove(&self, key: &'static str) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(&format!("DELETE FROM {table}"), [])?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

/// Non-durable store kept in process memory.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<&'static str, String>>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, key: &'static str) -> StoreFuture<'_, ChatResult<Option<String>>> {
        Box::pin(async move { Ok(self.values.read().await.get(key).cloned()) })
    }

    fn save(&self, key: &'static str, value: String) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            self.values.write().await.insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &'static str) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            self.values.write().await.remove(key);
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            self.values.write().await.clear();
            Ok(())
        })
    }
}
