/// Database abstraction layer
///
/// Probe definitions and the uptime timeline live in a local LibSQL
/// (SQLite) database accessed through a connection pool.

pub mod repository;
pub mod migrations;
pub mod models;

pub use repository::{DatabaseImpl, ProbeStore, TimelineStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::{TempDir, tempdir};

    use super::{DatabaseImpl, initialize_database};
    use crate::pool::open_pool;

    /// Fresh migrated database in a temporary directory.
    ///
    /// Keep the returned directory alive for as long as the database is used.
    pub async fn create_test_database() -> Result<(Arc<DatabaseImpl>, TempDir)> {
        let temp_dir = tempdir()?;
        let pool = open_pool(temp_dir.path().join("test.db")).await?;

        let conn = pool.get().await?;
        initialize_database(&conn).await?;
        drop(conn);

        Ok((Arc::new(DatabaseImpl::new_from_pool(pool)), temp_dir))
    }
}
