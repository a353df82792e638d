//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, &V1_QUEUE).await?;
    }
    if version < 2 {
        apply(conn, 2, &V2_SYNC_STATE).await?;
    }
    if version < 3 {
        apply(conn, 3, &V3_DATASET).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Version 1: schema tracking and the mutation queue
const V1_QUEUE: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    // AUTOINCREMENT keeps ids monotonic even after the tail is deleted
    "CREATE TABLE IF NOT EXISTS sync_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        collection TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_scope ON sync_queue(owner_id, collection, created_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue(created_at, id)",
    "INSERT INTO schema_version (version) VALUES (1)",
];

/// Version 2: conflicts, relationships, permissions and metrics
const V2_SYNC_STATE: [&str; 9] = [
    "CREATE TABLE IF NOT EXISTS data_conflicts (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        conflict_type TEXT NOT NULL,
        entity_kind TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        versions TEXT NOT NULL,
        strategy TEXT NOT NULL,
        priority TEXT NOT NULL,
        detected_at INTEGER NOT NULL,
        context TEXT NOT NULL,
        relationship_id TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_data_conflicts_owner ON data_conflicts(owner_id, detected_at)",
    "CREATE INDEX IF NOT EXISTS idx_data_conflicts_relationship ON data_conflicts(owner_id, relationship_id)",
    "CREATE INDEX IF NOT EXISTS idx_data_conflicts_entity ON data_conflicts(owner_id, entity_kind, entity_id)",
    "CREATE TABLE IF NOT EXISTS relationship_status (
        owner_id TEXT NOT NULL,
        relationship_id TEXT NOT NULL,
        partner_id TEXT NOT NULL,
        partner_name TEXT NOT NULL,
        last_sync INTEGER,
        quality TEXT NOT NULL,
        pending_changes TEXT NOT NULL,
        conflicts TEXT NOT NULL,
        is_online INTEGER NOT NULL DEFAULT 0,
        connection_strength TEXT NOT NULL,
        PRIMARY KEY (owner_id, relationship_id)
    )",
    "CREATE TABLE IF NOT EXISTS sync_permissions (
        user_id TEXT PRIMARY KEY,
        permissions TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sync_metrics (
        user_id TEXT PRIMARY KEY,
        total_syncs INTEGER NOT NULL DEFAULT 0,
        successful_syncs INTEGER NOT NULL DEFAULT 0,
        failed_syncs INTEGER NOT NULL DEFAULT 0,
        bytes_transferred INTEGER NOT NULL DEFAULT 0,
        conflicts_resolved INTEGER NOT NULL DEFAULT 0,
        last_successful_sync INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_relationship_partner ON relationship_status(owner_id, partner_id)",
    "INSERT INTO schema_version (version) VALUES (2)",
];

/// Version 3: local dataset records and backups
const V3_DATASET: [&str; 5] = [
    // Every owner has its own record namespace on a shared device
    "CREATE TABLE IF NOT EXISTS records (
        owner_id TEXT NOT NULL,
        collection TEXT NOT NULL,
        record_id TEXT NOT NULL,
        data TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (owner_id, collection, record_id)
    )",
    "CREATE TABLE IF NOT EXISTS backups (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        info TEXT NOT NULL,
        snapshot TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_backups_owner ON backups(owner_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_backups_expires ON backups(expires_at)",
    "INSERT INTO schema_version (version) VALUES (3)",
];

/// Apply one migration's statements in a single transaction
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version} (target {CURRENT_VERSION})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, table: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [table],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_create_persisted_state_layout() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in [
            "sync_queue",
            "data_conflicts",
            "relationship_status",
            "sync_permissions",
            "sync_metrics",
            "records",
            "backups",
        ] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }
}
