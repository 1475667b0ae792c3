use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::monitoring::command::{decode_request_spec, encode_request_spec};
use crate::monitoring::error::CheckError;
use crate::monitoring::types::MonitorStatus;

/// Probe model - a stored probe definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub id: i64,
    pub name: String,
    /// Encoded literal command, see [`encode_request_spec`]
    pub request_spec: String,
    pub condition_expr: String,
}

impl Probe {
    /// The command line as the probe author wrote it
    pub fn command(&self) -> Result<String, CheckError> {
        decode_request_spec(&self.request_spec)
    }
}

/// Fields of a probe that is about to be created or updated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProbe {
    pub name: String,
    pub request_spec: String,
    pub condition_expr: String,
}

impl NewProbe {
    /// Build from a literal command, encoding it for storage
    pub fn from_command(name: String, command: &str, condition_expr: String) -> Self {
        Self { name, request_spec: encode_request_spec(command), condition_expr }
    }
}

/// UptimeRecord model - one entry of the append-only timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeRecord {
    pub id: i64,
    pub probe_id: i64,
    pub status: MonitorStatus,
    pub timestamp: SystemTime,
}

/// Latest known status of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeStatus {
    pub probe_id: i64,
    pub name: String,
    /// `Unknown` when the probe has never been checked
    pub status: MonitorStatus,
    pub last_checked: Option<SystemTime>,
}

/// Timeline entry joined with its probe name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub name: String,
    pub status: MonitorStatus,
    pub timestamp: SystemTime,
}

/// Filters for timeline queries
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub probe_name: Option<String>,
    pub status: Option<MonitorStatus>,
    pub limit: usize,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self { probe_name: None, status: None, limit: 10 }
    }
}

/// Convert SystemTime to Unix timestamp
pub fn timestamp_to_i64(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Convert Unix timestamp to SystemTime
pub fn i64_to_timestamp(timestamp: i64) -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_secs(timestamp.max(0) as u64)
}
