use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
///
/// Safe to call on every start; already applied versions are skipped.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Probes and uptime timeline").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: probe definitions and the append-only uptime timeline
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS probes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            request_spec TEXT NOT NULL,
            condition_expr TEXT NOT NULL
        )",
        (),
    )
    .await?;

    // Rows are only ever inserted; probe deletion leaves history in place.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS uptimes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            probe_id INTEGER NOT NULL,
            status INTEGER NOT NULL CHECK (status IN (0, 1)),
            timestamp INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_probes_name ON probes(name)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_uptimes_probe_status_timestamp ON uptimes(probe_id, status, timestamp DESC)",
        (),
    )
    .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_uptimes_timestamp ON uptimes(timestamp DESC)", ()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::pool::open_pool;

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let pool = open_pool(dir.path().join("migrate.db")).await?;
        let conn = pool.get().await?;

        run_migrations(&conn).await?;
        run_migrations(&conn).await?;
        assert_eq!(get_current_version(&conn).await?, SCHEMA_VERSION);

        let mut rows = conn.query("SELECT COUNT(*) FROM schema_migrations", ()).await?;
        let applied: i64 = rows.next().await?.expect("count row").get(0)?;
        assert_eq!(applied, 1);

        // Status flags other than 0/1 are rejected
        conn.execute("INSERT INTO probes (name, request_spec, condition_expr) VALUES ('a', '\"\"', 'True')", ())
            .await?;
        assert!(
            conn.execute("INSERT INTO uptimes (probe_id, status, timestamp) VALUES (1, 2, 0)", ())
                .await
                .is_err()
        );

        Ok(())
    }
}
