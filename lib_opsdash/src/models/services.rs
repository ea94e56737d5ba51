//! `/api/services` payload.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesReport {
    pub healthy_count: u32,
    pub unhealthy_count: u32,
    /// Keyed by unit name.
    pub services: BTreeMap<String, ServiceInfo>,
}

impl ServicesReport {
    /// `true` when `name` is known and reported as running.
    pub fn is_running(&self, name: &str) -> bool {
        self.services
            .get(name)
            .is_some_and(|svc| svc.status == ServiceStatus::Running)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    pub service: String,
    pub active: bool,
    pub enabled: bool,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Unknown => "unknown",
        })
    }
}
