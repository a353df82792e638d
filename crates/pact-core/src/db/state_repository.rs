//! Per-user permissions and metrics repository implementation

use crate::error::Result;
use crate::models::{SyncMetrics, SyncPermissions};
use libsql::{params, Connection};

use super::values::{nullable_integer, optional_integer, to_i64, to_u64};

/// Trait for per-user sync state storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    /// Load permissions, falling back to defaults when none were saved
    async fn load_permissions(&self, user_id: &str) -> Result<SyncPermissions>;

    async fn save_permissions(&self, permissions: &SyncPermissions) -> Result<()>;

    /// Load metrics, falling back to zeroed counters
    async fn load_metrics(&self, user_id: &str) -> Result<SyncMetrics>;

    async fn save_metrics(&self, metrics: &SyncMetrics) -> Result<()>;

    /// Explicit wipe; the only way counters go down
    async fn reset_metrics(&self, user_id: &str) -> Result<()>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn load_permissions(&self, user_id: &str) -> Result<SyncPermissions> {
        let mut rows = self
            .conn
            .query(
                "SELECT permissions FROM sync_permissions WHERE user_id = ?",
                [user_id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(serde_json::from_str(&value)?)
        } else {
            Ok(SyncPermissions::defaults_for(user_id))
        }
    }

    async fn save_permissions(&self, permissions: &SyncPermissions) -> Result<()> {
        let value = serde_json::to_string(permissions)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_permissions (user_id, permissions, updated_at) VALUES (?, ?, ?)",
                params![permissions.user_id.as_str(), value, permissions.updated_at],
            )
            .await?;
        Ok(())
    }

    async fn load_metrics(&self, user_id: &str) -> Result<SyncMetrics> {
        let mut rows = self
            .conn
            .query(
                "SELECT total_syncs, successful_syncs, failed_syncs, bytes_transferred,
                        conflicts_resolved, last_successful_sync
                 FROM sync_metrics WHERE user_id = ?",
                [user_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(SyncMetrics::empty(user_id));
        };

        let total_syncs = to_u64(row.get(0)?);
        let failed_syncs = to_u64(row.get(2)?);
        Ok(SyncMetrics {
            user_id: user_id.to_string(),
            total_syncs,
            successful_syncs: to_u64(row.get(1)?),
            failed_syncs,
            bytes_transferred: to_u64(row.get(3)?),
            conflicts_resolved: to_u64(row.get(4)?),
            last_successful_sync: optional_integer(&row, 5)?,
            reliability_score: SyncMetrics::reliability_for(total_syncs, failed_syncs),
        })
    }

    async fn save_metrics(&self, metrics: &SyncMetrics) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_metrics (
                    user_id, total_syncs, successful_syncs, failed_syncs,
                    bytes_transferred, conflicts_resolved, last_successful_sync
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    metrics.user_id.as_str(),
                    to_i64(metrics.total_syncs),
                    to_i64(metrics.successful_syncs),
                    to_i64(metrics.failed_syncs),
                    to_i64(metrics.bytes_transferred),
                    to_i64(metrics.conflicts_resolved),
                    nullable_integer(metrics.last_successful_sync)
                ],
            )
            .await?;
        Ok(())
    }

    async fn reset_metrics(&self, user_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_metrics WHERE user_id = ?", [user_id])
            .await?;
        Ok(())
    }
}
