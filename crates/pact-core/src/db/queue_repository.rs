//! Mutation queue repository implementation

use crate::error::{Error, Result};
use crate::models::{NewOperation, OperationId, QueuedOperation};
use libsql::{params, Connection, Row};

const SELECT_COLUMNS: &str =
    "SELECT id, kind, collection, owner_id, payload, created_at, retry_count FROM sync_queue";

/// Trait for durable queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append an operation; the assigned id is strictly greater than any
    /// previously assigned id
    async fn append(&self, operation: &NewOperation, created_at: i64) -> Result<QueuedOperation>;

    /// All pending operations in replay order
    async fn list_pending(&self) -> Result<Vec<QueuedOperation>>;

    /// Pending operations of one owner in replay order
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<QueuedOperation>>;

    /// Pending operations of one (owner, collection) pair in replay order
    async fn list_scope(&self, owner_id: &str, collection: &str) -> Result<Vec<QueuedOperation>>;

    /// Remove confirmed operations, returning how many rows were deleted
    async fn remove(&self, ids: &[OperationId]) -> Result<u64>;

    /// Add one failed attempt to each operation
    async fn increment_retries(&self, ids: &[OperationId]) -> Result<u64>;

    /// Number of pending operations
    async fn count(&self) -> Result<u64>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queued operation from a database row
    fn parse_operation(row: &Row) -> Result<QueuedOperation> {
        let kind: String = row.get(1)?;
        let payload: String = row.get(4)?;
        let retry_count: i64 = row.get(6)?;
        Ok(QueuedOperation {
            id: OperationId(row.get(0)?),
            kind: kind.parse()?,
            collection: row.get(2)?,
            owner_id: row.get(3)?,
            payload: serde_json::from_str(&payload)?,
            created_at: row.get(5)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        })
    }

    async fn query_operations(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<QueuedOperation>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut operations = Vec::new();
        while let Some(row) = rows.next().await? {
            operations.push(Self::parse_operation(&row)?);
        }
        Ok(operations)
    }

    /// Run one statement per id inside a transaction
    async fn update_each(&self, sql: &str, ids: &[OperationId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        let mut affected = 0;
        for id in ids {
            match self.conn.execute(sql, params![id.0]).await {
                Ok(rows) => affected += rows,
                Err(e) => {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
            }
        }
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(affected)
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn append(&self, operation: &NewOperation, created_at: i64) -> Result<QueuedOperation> {
        let payload = serde_json::to_string(&operation.payload)?;

        self.conn
            .execute(
                "INSERT INTO sync_queue (kind, collection, owner_id, payload, created_at, retry_count)
                 VALUES (?, ?, ?, ?, ?, 0)",
                params![
                    operation.kind.as_str(),
                    operation.collection.as_str(),
                    operation.owner_id.as_str(),
                    payload,
                    created_at
                ],
            )
            .await?;

        let id = OperationId(self.conn.last_insert_rowid());
        if id.0 <= 0 {
            return Err(Error::Database("queue insert returned no row id".into()));
        }

        Ok(QueuedOperation {
            id,
            kind: operation.kind,
            collection: operation.collection.clone(),
            owner_id: operation.owner_id.clone(),
            payload: operation.payload.clone(),
            created_at,
            retry_count: 0,
        })
    }

    async fn list_pending(&self) -> Result<Vec<QueuedOperation>> {
        self.query_operations(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC, id ASC"), ())
            .await
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<QueuedOperation>> {
        self.query_operations(
            &format!("{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY created_at ASC, id ASC"),
            [owner_id],
        )
        .await
    }

    async fn list_scope(&self, owner_id: &str, collection: &str) -> Result<Vec<QueuedOperation>> {
        self.query_operations(
            &format!(
                "{SELECT_COLUMNS} WHERE owner_id = ? AND collection = ? ORDER BY created_at ASC, id ASC"
            ),
            [owner_id, collection],
        )
        .await
    }

    async fn remove(&self, ids: &[OperationId]) -> Result<u64> {
        self.update_each("DELETE FROM sync_queue WHERE id = ?", ids)
            .await
    }

    async fn increment_retries(&self, ids: &[OperationId]) -> Result<u64> {
        self.update_each(
            "UPDATE sync_queue SET retry_count = retry_count + 1 WHERE id = ?",
            ids,
        )
        .await
    }

    async fn count(&self) -> Result<u64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM sync_queue", ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(super::values::to_u64(count))
    }
}
