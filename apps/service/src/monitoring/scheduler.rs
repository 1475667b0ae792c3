use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::alert::{AlertDispatcher, DownAlert};
use super::checker::Checker;
use super::types::CheckResult;
use crate::database::models::Probe;
use crate::database::{ProbeStore, TimelineStore};

/// Monitoring scheduler - checks every probe once per cycle, records the
/// outcome in the timeline and alerts on down transitions.
pub struct MonitoringScheduler {
    probes: Arc<dyn ProbeStore>,
    timeline: Arc<dyn TimelineStore>,
    alerts: Arc<dyn AlertDispatcher>,
    checker: Checker,
    interval: Duration,
    /// Alert deliveries still in flight; the cycle never waits on them
    deliveries: Mutex<JoinSet<()>>,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(
        probes: Arc<dyn ProbeStore>,
        timeline: Arc<dyn TimelineStore>,
        alerts: Arc<dyn AlertDispatcher>,
        checker: Checker,
        interval: Duration,
    ) -> Self {
        Self { probes, timeline, alerts, checker, interval, deliveries: Mutex::default() }
    }

    /// Run cycles until `shutdown` turns true.
    ///
    /// The interval is slept after each cycle finishes. Only store errors end
    /// the loop early; a failing probe never does. Pending alerts are flushed
    /// before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            interval_seconds = self.interval.as_secs(),
            timeout_seconds = self.checker.timeout().as_secs(),
            "Starting monitoring scheduler"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await?;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender means nobody can stop us any more; treat it as a stop.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.flush_alerts().await;
        info!("Monitoring scheduler stopped");
        Ok(())
    }

    /// Wait for every alert delivery started so far
    pub async fn flush_alerts(&self) {
        let mut pending = {
            let mut deliveries = self.deliveries.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *deliveries)
        };
        while let Some(delivery) = pending.join_next().await {
            if let Err(e) = delivery {
                warn!(error = %e, "Alert delivery task failed");
            }
        }
    }

    fn deliver(&self, alert: DownAlert) {
        let alerts = self.alerts.clone();
        let mut deliveries = self.deliveries.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished deliveries so the set only holds in-flight ones
        while deliveries.try_join_next().is_some() {}
        deliveries.spawn(async move { alerts.dispatch(&alert).await });
    }

    /// Spawn [`run`](Self::run) as a background task
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Check every probe once, sequentially, in store order.
    pub async fn run_cycle(&self) -> Result<Vec<CheckResult>> {
        let probes = self.probes.list_probes().await.context("failed to list probes")?;
        debug!(count = probes.len(), "Starting check cycle");

        let mut results = Vec::with_capacity(probes.len());
        for probe in &probes {
            results.push(self.process_probe(probe).await?);
        }

        let up = results.iter().filter(|r| r.is_up()).count();
        info!(up, down = results.len() - up, "Check cycle finished");

        Ok(results)
    }

    /// Check → MaybeAlert → Record for one probe
    async fn process_probe(&self, probe: &Probe) -> Result<CheckResult> {
        let result = self.checker.check(probe).await;

        if !result.is_up() {
            let last_up = self
                .timeline
                .last_up_timestamp(probe.id)
                .await
                .context("failed to read uptime timeline")?;

            match last_up {
                Some(last_up) => {
                    warn!(probe = %probe.name, error = ?result.error, "Probe is down");
                    let alert = DownAlert {
                        probe_name: probe.name.clone(),
                        observed_at: result.observed_at,
                        last_up,
                    };
                    self.deliver(alert);
                }
                // Never been up: probably still being set up, stay quiet
                None => debug!(probe = %probe.name, "Probe is down but was never up, not alerting"),
            }
        }

        self.timeline
            .append(probe.id, result.status, result.observed_at)
            .await
            .context("failed to append to uptime timeline")?;

        Ok(result)
    }
}
