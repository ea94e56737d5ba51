//! `/api/applications` payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationsReport {
    pub healthy_count: u32,
    pub unhealthy_count: u32,
    pub applications: BTreeMap<String, ApplicationInfo>,
}

/// Result of one HTTP health probe against an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationInfo {
    pub name: String,
    pub url: String,
    pub healthy: bool,
    pub status_code: Option<u16>,
    /// Seconds.
    pub response_time: Option<f64>,
    pub error: Option<String>,
}
