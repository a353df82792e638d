//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Database wrapper for the local durable store
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
    path: Option<String>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().to_string();
        Self::connect_local(&path, Some(path.clone())).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Self::connect_local(":memory:", None).await
    }

    async fn connect_local(location: &str, path: Option<String>) -> Result<Self> {
        let db = Builder::new_local(location).build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn, path };
        database.configure().await?;
        migrations::run(&database.conn).await?;
        tracing::debug!("Opened local store at {location}");
        Ok(database)
    }

    /// Configure `SQLite` for durable, ordered writes
    async fn configure(&self) -> Result<()> {
        // In-memory databases reject WAL; ignore the error there
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        // FULL so an enqueue is on disk before it returns
        self.conn
            .execute("PRAGMA synchronous = FULL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Filesystem path, `None` for in-memory databases
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
