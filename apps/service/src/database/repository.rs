use anyhow::Result;
use async_trait::async_trait;
use libsql::{Row, params};
use std::time::SystemTime;

use super::models::{
    HistoryEntry, HistoryFilter, NewProbe, Probe, ProbeStatus, UptimeRecord, i64_to_timestamp,
    timestamp_to_i64,
};
use crate::monitoring::types::MonitorStatus;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Storage of probe definitions.
///
/// The scheduler only reads probes; the write side belongs to whatever
/// manages them (the `probe` subcommands here).
#[async_trait]
pub trait ProbeStore: Send + Sync {
    /// All probes, in storage order
    async fn list_probes(&self) -> Result<Vec<Probe>>;

    async fn get_probe(&self, id: i64) -> Result<Option<Probe>>;

    /// Insert a probe and return its id
    async fn create_probe(&self, probe: &NewProbe) -> Result<i64>;

    /// Returns `false` if no probe has this id
    async fn update_probe(&self, id: i64, probe: &NewProbe) -> Result<bool>;

    /// Returns `false` if no probe has this id
    async fn delete_probe(&self, id: i64) -> Result<bool>;
}

/// Append-only timeline of probe statuses
#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Append one sample; existing samples are never modified
    async fn append(
        &self,
        probe_id: i64,
        status: MonitorStatus,
        timestamp: SystemTime,
    ) -> Result<UptimeRecord>;

    /// Time of the most recent `up` sample of a probe
    async fn last_up_timestamp(&self, probe_id: i64) -> Result<Option<SystemTime>>;

    /// Latest status of every probe
    async fn latest_statuses(&self) -> Result<Vec<ProbeStatus>>;

    /// Most recent samples, newest first
    async fn history(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn probe_from_row(row: &Row) -> Result<Probe> {
    Ok(Probe {
        id: row.get(0)?,
        name: row.get(1)?,
        request_spec: row.get(2)?,
        condition_expr: row.get(3)?,
    })
}

#[async_trait]
impl ProbeStore for DatabaseImpl {
    async fn list_probes(&self) -> Result<Vec<Probe>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT id, name, request_spec, condition_expr FROM probes ORDER BY id", ())
            .await?;

        let mut probes = Vec::new();
        while let Some(row) = rows.next().await? {
            probes.push(probe_from_row(&row)?);
        }

        Ok(probes)
    }

    async fn get_probe(&self, id: i64) -> Result<Option<Probe>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, request_spec, condition_expr FROM probes WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(probe_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_probe(&self, probe: &NewProbe) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO probes (name, request_spec, condition_expr) VALUES (?, ?, ?)",
            params![probe.name.clone(), probe.request_spec.clone(), probe.condition_expr.clone()],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_probe(&self, id: i64, probe: &NewProbe) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE probes SET name = ?, request_spec = ?, condition_expr = ? WHERE id = ?",
                params![
                    probe.name.clone(),
                    probe.request_spec.clone(),
                    probe.condition_expr.clone(),
                    id
                ],
            )
            .await?;

        Ok(changed > 0)
    }

    async fn delete_probe(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn.execute("DELETE FROM probes WHERE id = ?", params![id]).await?;
        Ok(changed > 0)
    }
}

#[async_trait]
impl TimelineStore for DatabaseImpl {
    async fn append(
        &self,
        probe_id: i64,
        status: MonitorStatus,
        timestamp: SystemTime,
    ) -> Result<UptimeRecord> {
        let conn = self.get_conn().await?;
        let stored_at = timestamp_to_i64(timestamp);
        conn.execute(
            "INSERT INTO uptimes (probe_id, status, timestamp) VALUES (?, ?, ?)",
            params![probe_id, status.as_flag(), stored_at],
        )
        .await?;

        Ok(UptimeRecord {
            id: conn.last_insert_rowid(),
            probe_id,
            status,
            timestamp: i64_to_timestamp(stored_at),
        })
    }

    async fn last_up_timestamp(&self, probe_id: i64) -> Result<Option<SystemTime>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT timestamp FROM uptimes WHERE probe_id = ? AND status = 1 ORDER BY timestamp DESC, id DESC LIMIT 1",
                params![probe_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(i64_to_timestamp(row.get(0)?))),
            None => Ok(None),
        }
    }

    async fn latest_statuses(&self) -> Result<Vec<ProbeStatus>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT probes.id, probes.name, u.status, u.timestamp
                 FROM probes
                 LEFT JOIN uptimes u ON u.id = (
                     SELECT id FROM uptimes WHERE probe_id = probes.id ORDER BY timestamp DESC, id DESC LIMIT 1
                 )
                 ORDER BY probes.id",
                (),
            )
            .await?;

        let mut statuses = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: Option<i64> = row.get(2)?;
            let timestamp: Option<i64> = row.get(3)?;

            statuses.push(ProbeStatus {
                probe_id: row.get(0)?,
                name: row.get(1)?,
                status: status.map_or(MonitorStatus::Unknown, MonitorStatus::from_flag),
                last_checked: timestamp.map(i64_to_timestamp),
            });
        }

        Ok(statuses)
    }

    async fn history(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT probes.name, uptimes.status, uptimes.timestamp
                 FROM uptimes
                 JOIN probes ON uptimes.probe_id = probes.id
                 WHERE (?1 IS NULL OR probes.name = ?1)
                   AND (?2 IS NULL OR uptimes.status = ?2)
                 ORDER BY uptimes.timestamp DESC, uptimes.id DESC
                 LIMIT ?3",
                params![
                    filter.probe_name.clone(),
                    filter.status.map(MonitorStatus::as_flag),
                    filter.limit as i64
                ],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(HistoryEntry {
                name: row.get(0)?,
                status: MonitorStatus::from_flag(row.get(1)?),
                timestamp: i64_to_timestamp(row.get(2)?),
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::database::test_support::create_test_database;

    fn new_probe(name: &str) -> NewProbe {
        NewProbe::from_command(name.into(), "curl https://example.com", "response_code == 200".into())
    }

    #[tokio::test]
    async fn test_probe_crud() -> Result<()> {
        let (db, _dir) = create_test_database().await?;

        let id = db.create_probe(&new_probe("api")).await?;
        let probe = db.get_probe(id).await?.expect("probe exists");
        assert_eq!(probe.name, "api");
        assert_eq!(probe.command()?, "curl https://example.com");

        assert!(db.update_probe(id, &new_probe("api-v2")).await?);
        assert_eq!(db.get_probe(id).await?.unwrap().name, "api-v2");
        assert!(!db.update_probe(id + 100, &new_probe("ghost")).await?);

        db.create_probe(&new_probe("web")).await?;
        let names: Vec<_> = db.list_probes().await?.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["api-v2", "web"]);

        assert!(db.delete_probe(id).await?);
        assert!(db.get_probe(id).await?.is_none());
        assert!(!db.delete_probe(id).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_last_up_timestamp() -> Result<()> {
        let (db, _dir) = create_test_database().await?;
        let id = db.create_probe(&new_probe("api")).await?;
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        assert_eq!(db.last_up_timestamp(id).await?, None);

        let record = db.append(id, MonitorStatus::Down, base).await?;
        assert_eq!(record.probe_id, id);
        assert_eq!(record.status, MonitorStatus::Down);
        assert_eq!(record.timestamp, base);
        assert_eq!(db.last_up_timestamp(id).await?, None);

        db.append(id, MonitorStatus::Up, base + Duration::from_secs(60)).await?;
        db.append(id, MonitorStatus::Down, base + Duration::from_secs(120)).await?;
        assert_eq!(db.last_up_timestamp(id).await?, Some(base + Duration::from_secs(60)));

        // Other probes' samples do not count
        let other = db.create_probe(&new_probe("web")).await?;
        db.append(other, MonitorStatus::Up, base + Duration::from_secs(600)).await?;
        assert_eq!(db.last_up_timestamp(id).await?, Some(base + Duration::from_secs(60)));

        Ok(())
    }

    #[tokio::test]
    async fn test_latest_statuses_and_history() -> Result<()> {
        let (db, _dir) = create_test_database().await?;
        let api = db.create_probe(&new_probe("api")).await?;
        let web = db.create_probe(&new_probe("web")).await?;
        let idle = db.create_probe(&new_probe("idle")).await?;
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        db.append(api, MonitorStatus::Up, base).await?;
        db.append(api, MonitorStatus::Down, base).await?;
        db.append(web, MonitorStatus::Up, base + Duration::from_secs(5)).await?;

        let statuses = db.latest_statuses().await?;
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].status, MonitorStatus::Down);
        assert_eq!(statuses[1].status, MonitorStatus::Up);
        assert_eq!(statuses[2].probe_id, idle);
        assert_eq!(statuses[2].status, MonitorStatus::Unknown);
        assert_eq!(statuses[2].last_checked, None);

        let all = db.history(&HistoryFilter::default()).await?;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "web");
        assert_eq!(all[1].status, MonitorStatus::Down);

        let api_up = db
            .history(&HistoryFilter {
                probe_name: Some("api".into()),
                status: Some(MonitorStatus::Up),
                limit: 10,
            })
            .await?;
        assert_eq!(api_up.len(), 1);
        assert_eq!(api_up[0].timestamp, base);

        let limited = db.history(&HistoryFilter { limit: 1, ..Default::default() }).await?;
        assert_eq!(limited.len(), 1);

        Ok(())
    }
}
