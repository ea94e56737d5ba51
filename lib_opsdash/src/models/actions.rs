//! Action request bodies and the shared action response.

use serde::{Deserialize, Serialize};

use crate::core::plan::ItemKind;

/// Body of `POST /api/actions/restart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRequest {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub name: String,
}

/// Body of `POST /api/actions/resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub issue_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeModeMode {
    Enter,
    Exit,
}

/// Body of `POST /api/actions/safe_mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeModeRequest {
    pub mode: SafeModeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Response of every action endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Absent on minimal backends; a decodable 2xx body counts as success.
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Filled by the resolve endpoint.
    #[serde(default)]
    pub actions_taken: Vec<String>,
}

fn default_success() -> bool {
    true
}
