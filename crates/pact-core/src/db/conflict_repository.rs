//! Data conflict repository implementation

use crate::error::Result;
use crate::models::{ConflictId, ConflictPriority, DataConflict, EntityKind};
use libsql::{params, Connection, Row};

use super::values::{nullable_text, to_u64};

const SELECT_COLUMNS: &str = "SELECT id, conflict_type, entity_kind, entity_id, versions, strategy, priority, detected_at, context FROM data_conflicts";

/// Trait for active conflict storage operations (async)
///
/// Every query is scoped to the owner whose session detected the conflict.
#[allow(async_fn_in_trait)]
pub trait ConflictRepository {
    async fn insert(&self, owner_id: &str, conflict: &DataConflict) -> Result<()>;

    /// Overwrite a stored conflict's type, versions, strategy, priority and
    /// context; returns whether a row was updated
    async fn replace(&self, owner_id: &str, conflict: &DataConflict) -> Result<bool>;

    async fn get(&self, owner_id: &str, id: &ConflictId) -> Result<Option<DataConflict>>;

    /// The active conflict on one entity within one relationship scope
    async fn find_for_entity(
        &self,
        owner_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        relationship_id: Option<&str>,
    ) -> Result<Option<DataConflict>>;

    /// Active conflicts, oldest first
    async fn list(&self, owner_id: &str) -> Result<Vec<DataConflict>>;

    /// Active conflicts scoped to one relationship, oldest first
    async fn list_for_relationship(
        &self,
        owner_id: &str,
        relationship_id: &str,
    ) -> Result<Vec<DataConflict>>;

    /// Remove a conflict; returns whether a row existed
    async fn delete(&self, owner_id: &str, id: &ConflictId) -> Result<bool>;

    /// Active conflict counts per priority, highest first
    async fn count_by_priority(&self, owner_id: &str) -> Result<Vec<(ConflictPriority, u64)>>;
}

/// libSQL implementation of `ConflictRepository`
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &Row) -> Result<DataConflict> {
        let id: String = row.get(0)?;
        let conflict_type: String = row.get(1)?;
        let entity_kind: String = row.get(2)?;
        let versions: String = row.get(4)?;
        let strategy: String = row.get(5)?;
        let priority: String = row.get(6)?;
        let context: String = row.get(8)?;
        Ok(DataConflict {
            id: id
                .parse()
                .map_err(|_| crate::Error::Database(format!("invalid conflict id '{id}'")))?,
            conflict_type: conflict_type.parse()?,
            entity_kind: entity_kind.parse()?,
            entity_id: row.get(3)?,
            versions: serde_json::from_str(&versions)?,
            strategy: strategy.parse()?,
            priority: priority.parse()?,
            detected_at: row.get(7)?,
            context: serde_json::from_str(&context)?,
        })
    }

    async fn query_conflicts(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<DataConflict>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::parse_conflict(&row)?);
        }
        Ok(conflicts)
    }
}

impl ConflictRepository for LibSqlConflictRepository<'_> {
    async fn insert(&self, owner_id: &str, conflict: &DataConflict) -> Result<()> {
        let versions = serde_json::to_string(&conflict.versions)?;
        let context = serde_json::to_string(&conflict.context)?;

        self.conn
            .execute(
                "INSERT INTO data_conflicts (
                    id, owner_id, conflict_type, entity_kind, entity_id, versions,
                    strategy, priority, detected_at, context, relationship_id
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    conflict.id.as_str(),
                    owner_id,
                    conflict.conflict_type.as_str(),
                    conflict.entity_kind.as_str(),
                    conflict.entity_id.as_str(),
                    versions,
                    conflict.strategy.as_str(),
                    conflict.priority.as_str(),
                    conflict.detected_at,
                    context,
                    nullable_text(conflict.context.relationship_id.as_deref())
                ],
            )
            .await?;
        Ok(())
    }

    async fn replace(&self, owner_id: &str, conflict: &DataConflict) -> Result<bool> {
        let versions = serde_json::to_string(&conflict.versions)?;
        let context = serde_json::to_string(&conflict.context)?;

        let rows = self
            .conn
            .execute(
                "UPDATE data_conflicts
                 SET conflict_type = ?, versions = ?, strategy = ?, priority = ?, context = ?
                 WHERE owner_id = ? AND id = ?",
                params![
                    conflict.conflict_type.as_str(),
                    versions,
                    conflict.strategy.as_str(),
                    conflict.priority.as_str(),
                    context,
                    owner_id,
                    conflict.id.as_str()
                ],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn get(&self, owner_id: &str, id: &ConflictId) -> Result<Option<DataConflict>> {
        let mut conflicts = self
            .query_conflicts(
                &format!("{SELECT_COLUMNS} WHERE owner_id = ? AND id = ?"),
                params![owner_id, id.as_str()],
            )
            .await?;
        Ok(conflicts.pop())
    }

    async fn find_for_entity(
        &self,
        owner_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        relationship_id: Option<&str>,
    ) -> Result<Option<DataConflict>> {
        // `IS` matches NULL relationship ids too
        let mut conflicts = self
            .query_conflicts(
                &format!(
                    "{SELECT_COLUMNS}
                     WHERE owner_id = ? AND entity_kind = ? AND entity_id = ? AND relationship_id IS ?
                     ORDER BY detected_at ASC, id ASC
                     LIMIT 1"
                ),
                params![
                    owner_id,
                    entity_kind.as_str(),
                    entity_id,
                    nullable_text(relationship_id)
                ],
            )
            .await?;
        Ok(conflicts.pop())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<DataConflict>> {
        self.query_conflicts(
            &format!("{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY detected_at ASC, id ASC"),
            [owner_id],
        )
        .await
    }

    async fn list_for_relationship(
        &self,
        owner_id: &str,
        relationship_id: &str,
    ) -> Result<Vec<DataConflict>> {
        self.query_conflicts(
            &format!(
                "{SELECT_COLUMNS} WHERE owner_id = ? AND relationship_id = ? ORDER BY detected_at ASC, id ASC"
            ),
            [owner_id, relationship_id],
        )
        .await
    }

    async fn delete(&self, owner_id: &str, id: &ConflictId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM data_conflicts WHERE owner_id = ? AND id = ?",
                params![owner_id, id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn count_by_priority(&self, owner_id: &str) -> Result<Vec<(ConflictPriority, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT priority, COUNT(*) FROM data_conflicts WHERE owner_id = ? GROUP BY priority",
                [owner_id],
            )
            .await?;

        let mut counts: Vec<(ConflictPriority, u64)> = Vec::new();
        while let Some(row) = rows.next().await? {
            let priority: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.push((priority.parse()?, to_u64(count)));
        }
        counts.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(counts)
    }
}
