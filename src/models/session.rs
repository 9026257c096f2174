// Process, session and health models for the resources category

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Converts a Unix epoch (seconds) to a timestamp; zero or negative means unknown.
pub fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// One row of the process listing. Rebuilt on every sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub pid: u32,
    pub parent_pid: u32,
    pub cpu_percent: f64,
    pub resident_bytes: u64,
}

/// A multiplexer session and the root pids of its panes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionAnchor {
    pub session_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub anchor_pids: BTreeSet<u32>,
}

/// Aggregated usage of one session for one sampling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_name: String,
    /// Sum over the session's process tree; may exceed 100.
    pub cpu_percent: f64,
    pub resident_bytes: u64,
    pub process_count: usize,
    pub uptime_secs: u64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn uptime(&self) -> Duration {
        Duration::from_secs(self.uptime_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Alert,
    Stale,
}

/// Colour band of one sparkline cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTier {
    Unknown,
    Normal,
    Elevated,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparkCell {
    pub glyph: char,
    pub tier: LoadTier,
}

/// A snapshot together with its classification, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHealth {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub health: HealthStatus,
    pub sparkline: String,
    pub cells: Vec<SparkCell>,
}
