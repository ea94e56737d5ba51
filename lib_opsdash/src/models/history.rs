//! `/api/history?days=N` payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryReport {
    /// Oldest first.
    pub metrics: Vec<HistoryMetric>,
    pub alerts: Vec<HistoryAlert>,
    pub service_events: Vec<ServiceEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryMetric {
    pub timestamp: i64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub load_average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryAlert {
    pub timestamp: i64,
    pub severity: String,
    pub category: String,
    pub message: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEvent {
    pub timestamp: i64,
    pub service: String,
    pub event: ServiceEventKind,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceEventKind {
    Started,
    Stopped,
    Restarted,
    Failed,
    #[default]
    #[serde(other)]
    Other,
}
