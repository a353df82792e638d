//! Relationship sync status repository implementation

use crate::error::Result;
use crate::models::{ConnectionStrength, RelationshipSyncStatus};
use libsql::{params, Connection, Row};

use super::values::{nullable_integer, optional_integer};

const SELECT_COLUMNS: &str = "SELECT relationship_id, partner_id, partner_name, last_sync, quality, pending_changes, conflicts, is_online, connection_strength FROM relationship_status";

/// Trait for relationship status storage operations (async)
///
/// Statuses belong to the owner who added the relationship.
#[allow(async_fn_in_trait)]
pub trait RelationshipRepository {
    /// Insert or replace the status for its (owner, relationship id)
    async fn upsert(&self, owner_id: &str, status: &RelationshipSyncStatus) -> Result<()>;

    async fn get(
        &self,
        owner_id: &str,
        relationship_id: &str,
    ) -> Result<Option<RelationshipSyncStatus>>;

    /// One owner's statuses ordered by relationship id
    async fn list(&self, owner_id: &str) -> Result<Vec<RelationshipSyncStatus>>;

    /// Remove a status; returns whether a row existed
    async fn delete(&self, owner_id: &str, relationship_id: &str) -> Result<bool>;
}

/// libSQL implementation of `RelationshipRepository`
pub struct LibSqlRelationshipRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRelationshipRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_status(row: &Row) -> Result<RelationshipSyncStatus> {
        let quality: String = row.get(4)?;
        let pending_changes: String = row.get(5)?;
        let conflicts: String = row.get(6)?;
        let connection_strength: String = row.get(8)?;
        Ok(RelationshipSyncStatus {
            relationship_id: row.get(0)?,
            partner_id: row.get(1)?,
            partner_name: row.get(2)?,
            last_sync: optional_integer(row, 3)?,
            quality: serde_json::from_str(&quality)?,
            pending_changes: serde_json::from_str(&pending_changes)?,
            conflicts: serde_json::from_str(&conflicts)?,
            is_online: row.get::<i32>(7)? != 0,
            connection_strength: ConnectionStrength::parse(&connection_strength),
        })
    }
}

impl RelationshipRepository for LibSqlRelationshipRepository<'_> {
    async fn upsert(&self, owner_id: &str, status: &RelationshipSyncStatus) -> Result<()> {
        let quality = serde_json::to_string(&status.quality)?;
        let pending_changes = serde_json::to_string(&status.pending_changes)?;
        let conflicts = serde_json::to_string(&status.conflicts)?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO relationship_status (
                    owner_id, relationship_id, partner_id, partner_name, last_sync, quality,
                    pending_changes, conflicts, is_online, connection_strength
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    owner_id,
                    status.relationship_id.as_str(),
                    status.partner_id.as_str(),
                    status.partner_name.as_str(),
                    nullable_integer(status.last_sync),
                    quality,
                    pending_changes,
                    conflicts,
                    i32::from(status.is_online),
                    status.connection_strength.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        owner_id: &str,
        relationship_id: &str,
    ) -> Result<Option<RelationshipSyncStatus>> {
        let mut rows = self
            .conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE owner_id = ? AND relationship_id = ?"),
                [owner_id, relationship_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_status(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<RelationshipSyncStatus>> {
        let mut rows = self
            .conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY relationship_id ASC"),
                [owner_id],
            )
            .await?;

        let mut statuses = Vec::new();
        while let Some(row) = rows.next().await? {
            statuses.push(Self::parse_status(&row)?);
        }
        Ok(statuses)
    }

    async fn delete(&self, owner_id: &str, relationship_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM relationship_status WHERE owner_id = ? AND relationship_id = ?",
                [owner_id, relationship_id],
            )
            .await?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ConflictId, SyncQuality};

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_get_list_delete() {
        let db = setup().await;
        let repo = LibSqlRelationshipRepository::new(db.connection());

        let mut status = RelationshipSyncStatus::new("rel-1", "kh-1", "Keyholder", 5);
        repo.upsert("u1", &status).await.unwrap();

        status.last_sync = Some(99);
        status.is_online = true;
        status.connection_strength = ConnectionStrength::Strong;
        status.quality = SyncQuality::measure(100, 100.0, 90.0, 10_000, 99);
        status.conflicts.push(ConflictId::new());
        repo.upsert("u1", &status).await.unwrap();

        let fetched = repo.get("u1", "rel-1").await.unwrap().unwrap();
        assert_eq!(fetched, status);
        assert_eq!(repo.list("u1").await.unwrap().len(), 1);

        assert!(repo.delete("u1", "rel-1").await.unwrap());
        assert!(repo.get("u1", "rel-1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_statuses_are_per_owner() {
        let db = setup().await;
        let repo = LibSqlRelationshipRepository::new(db.connection());

        repo.upsert("u1", &RelationshipSyncStatus::new("rel-1", "kh-1", "Keyholder", 5))
            .await
            .unwrap();
        repo.upsert("u2", &RelationshipSyncStatus::new("rel-1", "kh-2", "Other", 6))
            .await
            .unwrap();

        assert_eq!(repo.get("u1", "rel-1").await.unwrap().unwrap().partner_id, "kh-1");
        assert_eq!(repo.get("u2", "rel-1").await.unwrap().unwrap().partner_id, "kh-2");
        assert!(repo.list("u3").await.unwrap().is_empty());

        assert!(!repo.delete("u3", "rel-1").await.unwrap());
        assert!(repo.delete("u2", "rel-1").await.unwrap());
        assert_eq!(repo.list("u1").await.unwrap().len(), 1);
    }
}
