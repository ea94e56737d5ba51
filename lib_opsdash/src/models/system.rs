//! `/api/system` payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Point-in-time host metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    /// Total CPU utilisation in percent.
    pub cpu_usage: f64,
    pub memory: MemoryStats,
    /// Keyed by mount path, e.g. `/`.
    pub disk: BTreeMap<String, DiskStats>,
    pub load_average: LoadAverage,
    pub network: NetworkStats,
    /// Epoch seconds.
    pub timestamp: i64,
}

impl SystemSnapshot {
    /// Usage of the root mount, falling back to the first reported mount.
    pub fn root_disk_percent(&self) -> f64 {
        self.disk
            .get("/")
            .or_else(|| self.disk.values().next())
            .map(|d| d.percent)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub percent: f64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadAverage {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_partial_snapshot() {
        // A failed memory probe comes back as an empty object.
        let snapshot: SystemSnapshot = serde_json::from_value(json!({
            "cpu_usage": 12.5,
            "memory": {},
            "disk": {"/data": {"total": 10, "used": 4, "free": 6, "percent": 40.0}},
            "load_average": {"load1": 0.5, "load5": 0.4, "load15": 0.3},
            "network": {},
            "timestamp": 1700000000
        }))
        .unwrap();

        assert_eq!(snapshot.memory, MemoryStats::default());
        assert_eq!(snapshot.root_disk_percent(), 40.0);
        assert_eq!(snapshot.timestamp, 1_700_000_000);
    }
}
