//! `/api/security` payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityReport {
    pub firewall: FirewallStatus,
    pub active_sessions: Vec<Session>,
    pub failed_logins: FailedLogins,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallStatus {
    pub enabled: bool,
    pub default_incoming: Option<String>,
    pub default_outgoing: Option<String>,
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub user: String,
    pub terminal: String,
    pub login_time: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailedLogins {
    pub total_failed: u32,
    pub recent_attempts: Vec<LoginAttempt>,
    /// `(ip, count)` pairs, most frequent first.
    pub top_attacking_ips: Vec<(String, u32)>,
    /// `(user, count)` pairs, most frequent first.
    pub top_targeted_users: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginAttempt {
    pub timestamp: String,
    pub success: bool,
    pub user: Option<String>,
    pub ip: Option<String>,
    pub raw_line: String,
}
