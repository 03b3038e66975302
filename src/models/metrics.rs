use crate::models::config::Thresholds;
use crate::models::host::Host;
use crate::services::classifier::classify;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity tier of a latency observation.
///
/// Variant order is the severity order used for worst-of aggregation:
/// `Unknown` (no data yet) ranks above `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
    Unknown,
}

impl LatencyStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            LatencyStatus::Excellent => "Excellent",
            LatencyStatus::Good => "Good",
            LatencyStatus::Fair => "Fair",
            LatencyStatus::Poor => "Poor",
            LatencyStatus::Offline => "Offline",
            LatencyStatus::Unknown => "Unknown",
        }
    }

    pub fn is_problematic(&self) -> bool {
        matches!(self, LatencyStatus::Poor | LatencyStatus::Offline)
    }

    /// Worst tier of the iterator, `Unknown` when it is empty.
    pub fn worst<I>(statuses: I) -> LatencyStatus
    where
        I: IntoIterator<Item = LatencyStatus>,
    {
        statuses.into_iter().max().unwrap_or(LatencyStatus::Unknown)
    }
}

impl Default for LatencyStatus {
    fn default() -> Self {
        LatencyStatus::Unknown
    }
}

impl std::fmt::Display for LatencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One probe outcome for one host at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub host_id: Uuid,
    pub host_label: String,
    pub host_address: String,
    pub latency_ms: Option<f64>, // None = timeout/unreachable
    pub status: LatencyStatus,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        host: &Host,
        latency_ms: Option<f64>,
        thresholds: &Thresholds,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            host_id: host.id(),
            host_label: host.label.clone(),
            host_address: host.address.clone(),
            latency_ms,
            status: classify(latency_ms, thresholds),
            timestamp,
        }
    }

    pub fn display_latency(&self) -> String {
        match self.latency_ms {
            Some(ms) if ms < 1.0 => "<1ms".to_string(),
            Some(ms) => format!("{}ms", ms.round() as i64),
            None => "--".to_string(),
        }
    }
}

/// Aggregate of one polling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub readings: Vec<Reading>,
    pub timestamp: DateTime<Utc>,
    pub overall_status: LatencyStatus,
}

impl HistorySample {
    pub fn new(readings: Vec<Reading>, timestamp: DateTime<Utc>) -> Self {
        let overall_status = LatencyStatus::worst(readings.iter().map(|r| r.status));
        Self {
            readings,
            timestamp,
            overall_status,
        }
    }
}

/// Total wall-clock time attributed to one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierDuration {
    pub status: LatencyStatus,
    pub duration_secs: f64,
}
