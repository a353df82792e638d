//! Local dataset repository implementation

use crate::error::Result;
use crate::models::LocalRecord;
use libsql::{params, Connection, Row};

use super::values::to_u64;

const SELECT_COLUMNS: &str =
    "SELECT collection, record_id, owner_id, data, updated_at, is_deleted FROM records";

/// Trait for local record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Insert or replace a record by (owner, collection, record id)
    async fn upsert(&self, record: &LocalRecord) -> Result<()>;

    async fn get(
        &self,
        owner_id: &str,
        collection: &str,
        record_id: &str,
    ) -> Result<Option<LocalRecord>>;

    /// Records of one owner in one collection, including soft-deleted ones
    async fn list_collection(&self, owner_id: &str, collection: &str) -> Result<Vec<LocalRecord>>;

    /// Live record counts per collection for one owner
    async fn count_by_collection(&self, owner_id: &str) -> Result<Vec<(String, u64)>>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &Row) -> Result<LocalRecord> {
        let data: String = row.get(3)?;
        Ok(LocalRecord {
            collection: row.get(0)?,
            record_id: row.get(1)?,
            owner_id: row.get(2)?,
            data: serde_json::from_str(&data)?,
            updated_at: row.get(4)?,
            is_deleted: row.get::<i32>(5)? != 0,
        })
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn upsert(&self, record: &LocalRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO records (collection, record_id, owner_id, data, updated_at, is_deleted)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    record.collection.as_str(),
                    record.record_id.as_str(),
                    record.owner_id.as_str(),
                    data,
                    record.updated_at,
                    i32::from(record.is_deleted)
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        owner_id: &str,
        collection: &str,
        record_id: &str,
    ) -> Result<Option<LocalRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "{SELECT_COLUMNS} WHERE owner_id = ? AND collection = ? AND record_id = ?"
                ),
                [owner_id, collection, record_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_collection(&self, owner_id: &str, collection: &str) -> Result<Vec<LocalRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "{SELECT_COLUMNS} WHERE owner_id = ? AND collection = ? ORDER BY record_id ASC"
                ),
                [owner_id, collection],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn count_by_collection(&self, owner_id: &str) -> Result<Vec<(String, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collection, COUNT(*) FROM records
                 WHERE owner_id = ? AND is_deleted = 0
                 GROUP BY collection
                 ORDER BY collection ASC",
                [owner_id],
            )
            .await?;

        let mut counts = Vec::new();
        while let Some(row) = rows.next().await? {
            counts.push((row.get::<String>(0)?, to_u64(row.get(1)?)));
        }
        Ok(counts)
    }
}
