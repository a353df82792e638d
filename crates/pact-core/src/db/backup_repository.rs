//! Backup repository implementation

use crate::error::Result;
use crate::models::{BackupId, BackupInfo, BackupSnapshot};
use libsql::{params, Connection};

/// Trait for backup storage operations (async)
#[allow(async_fn_in_trait)]
pub trait BackupRepository {
    async fn insert(&self, info: &BackupInfo, snapshot: &BackupSnapshot) -> Result<()>;

    /// Backup metadata and content, if the owner has a backup with this id
    async fn get(
        &self,
        owner_id: &str,
        id: &BackupId,
    ) -> Result<Option<(BackupInfo, BackupSnapshot)>>;

    /// Backups of one owner, newest first
    async fn list(&self, owner_id: &str) -> Result<Vec<BackupInfo>>;

    /// Delete backups whose expiry is at or before `now`
    async fn delete_expired(&self, now: i64) -> Result<u64>;
}

/// libSQL implementation of `BackupRepository`
pub struct LibSqlBackupRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBackupRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BackupRepository for LibSqlBackupRepository<'_> {
    async fn insert(&self, info: &BackupInfo, snapshot: &BackupSnapshot) -> Result<()> {
        let info_json = serde_json::to_string(info)?;
        let snapshot_json = serde_json::to_string(snapshot)?;
        self.conn
            .execute(
                "INSERT INTO backups (id, owner_id, info, snapshot, created_at, expires_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    info.id.as_str(),
                    info.owner_id.as_str(),
                    info_json,
                    snapshot_json,
                    info.created_at,
                    info.expires_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        owner_id: &str,
        id: &BackupId,
    ) -> Result<Option<(BackupInfo, BackupSnapshot)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT info, snapshot FROM backups WHERE owner_id = ? AND id = ?",
                params![owner_id, id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let info: String = row.get(0)?;
        let snapshot: String = row.get(1)?;
        Ok(Some((
            serde_json::from_str(&info)?,
            serde_json::from_str(&snapshot)?,
        )))
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<BackupInfo>> {
        let mut rows = self
            .conn
            .query(
                "SELECT info FROM backups WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
                [owner_id],
            )
            .await?;

        let mut backups = Vec::new();
        while let Some(row) = rows.next().await? {
            let info: String = row.get(0)?;
            backups.push(serde_json::from_str(&info)?);
        }
        Ok(backups)
    }

    async fn delete_expired(&self, now: i64) -> Result<u64> {
        let rows = self
            .conn
            .execute("DELETE FROM backups WHERE expires_at <= ?", params![now])
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn info(created_at: i64, expires_at: i64) -> BackupInfo {
        BackupInfo {
            id: BackupId::new(),
            owner_id: "u1".to_string(),
            size_bytes: 2,
            collections: vec!["tasks".to_string()],
            record_count: 0,
            created_at,
            expires_at,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_get_list() {
        let db = setup().await;
        let repo = LibSqlBackupRepository::new(db.connection());

        let older = info(1, 100);
        let newer = info(2, 100);
        repo.insert(&older, &BackupSnapshot::default()).await.unwrap();
        repo.insert(&newer, &BackupSnapshot::default()).await.unwrap();

        let (fetched, snapshot) = repo.get("u1", &older.id).await.unwrap().unwrap();
        assert_eq!(fetched, older);
        assert_eq!(snapshot.record_count(), 0);
        assert!(repo.get("u2", &older.id).await.unwrap().is_none());

        let listed = repo.list("u1").await.unwrap();
        assert_eq!(listed, vec![newer, older]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_expired() {
        let db = setup().await;
        let repo = LibSqlBackupRepository::new(db.connection());

        let expired = info(1, 10);
        let live = info(1, 1_000);
        repo.insert(&expired, &BackupSnapshot::default()).await.unwrap();
        repo.insert(&live, &BackupSnapshot::default()).await.unwrap();

        assert_eq!(repo.delete_expired(10).await.unwrap(), 1);
        assert!(repo.get("u1", &expired.id).await.unwrap().is_none());
        assert!(repo.get("u1", &live.id).await.unwrap().is_some());
    }
}
