use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::error::CheckError;

/// Status of a probe check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Unknown,
}

impl MonitorStatus {
    /// Status column value in the uptime timeline (`1` up, `0` otherwise)
    pub fn as_flag(self) -> i64 {
        match self {
            MonitorStatus::Up => 1,
            MonitorStatus::Down | MonitorStatus::Unknown => 0,
        }
    }

    pub fn from_flag(flag: i64) -> Self {
        if flag == 1 { MonitorStatus::Up } else { MonitorStatus::Down }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => f.pad("up"),
            MonitorStatus::Down => f.pad("down"),
            MonitorStatus::Unknown => f.pad("unknown"),
        }
    }
}

fn serialize_time<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&DateTime::<Utc>::from(*time).to_rfc3339())
}

/// Result of a single probe check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// ID of the probe that was checked
    pub probe_id: i64,

    /// Display name of the probe
    pub probe_name: String,

    /// Up/down verdict; `Unknown` until the check has finished
    pub status: MonitorStatus,

    /// When the check was performed
    #[serde(serialize_with = "serialize_time")]
    pub observed_at: SystemTime,

    /// Wall-clock time spent running the probe command
    pub elapsed_seconds: f64,

    /// HTTP status code, if the response could be parsed
    pub http_status: Option<u16>,

    pub response_body: String,

    pub response_headers: BTreeMap<String, String>,

    /// Timing as reported by the probe tool itself on stderr
    pub transfer_time: Option<String>,

    /// Why the check failed, when it did not get as far as evaluating the condition
    pub error: Option<String>,
}

impl CheckResult {
    /// Create a new, not yet evaluated check result
    pub fn new(probe_id: i64, probe_name: String) -> Self {
        Self {
            probe_id,
            probe_name,
            status: MonitorStatus::Unknown,
            observed_at: SystemTime::now(),
            elapsed_seconds: 0.0,
            http_status: None,
            response_body: String::new(),
            response_headers: BTreeMap::new(),
            transfer_time: None,
            error: None,
        }
    }

    /// The fixed result recorded when the probe did not finish in time
    pub fn timed_out(mut self, timeout: Duration) -> Self {
        self.status = MonitorStatus::Down;
        self.elapsed_seconds = timeout.as_secs_f64();
        self.http_status = None;
        self.response_body.clear();
        self.response_headers.clear();
        self.transfer_time = None;
        self.error = Some(CheckError::ExecutionTimeout(timeout.as_secs()).to_string());
        self
    }

    /// Mark the check as failed with error
    pub fn failure(mut self, error: CheckError) -> Self {
        self.status = MonitorStatus::Down;
        self.error = Some(error.to_string());
        self
    }

    /// Stamp the observation time once the check is over
    pub fn finished(mut self) -> Self {
        self.observed_at = SystemTime::now();
        self
    }

    /// Record the condition verdict
    pub fn evaluated(mut self, is_up: bool) -> Self {
        self.status = if is_up { MonitorStatus::Up } else { MonitorStatus::Down };
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == MonitorStatus::Up
    }
}
