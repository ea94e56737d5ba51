//! `/health` payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Whether the backend can reach the monitored host.
    pub ssh_connection: Option<bool>,
    pub error: Option<String>,
    pub timestamp: i64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.ssh_connection != Some(false)
    }
}
