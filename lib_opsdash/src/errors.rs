//! # Error Taxonomy
//!
//! Every failure in the dashboard is contained at the component that produced
//! it. These types carry just enough context for that component to record or
//! surface the failure; none of them is fatal to the process.

use std::time::Duration;

use thiserror::Error;

use crate::core::plan::QueueItem;

/// Transport-level failure of a single HTTP exchange.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request path could not be joined onto the configured base URL.
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    /// The request never produced a response (DNS, connect, timeout, retries exhausted).
    #[error("network error: {0}")]
    Network(#[from] reqwest_middleware::Error),

    /// A 2xx response whose body could not be read or decoded as JSON.
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// Failure of one fetch cycle of a polled resource.
///
/// Stored in `ResourceState::error` next to the last good payload, so it has to
/// be cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected payload: {0}")]
    Decode(String),
}

/// Failure of a submitted operator action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The backend answered with a non-success status or `success: false`.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    /// Manual restarts are locked out while a safe-mode run is in progress.
    #[error("a safe-mode run is in progress; manual restarts are disabled")]
    SafeModeActive,
}

impl ActionError {
    /// HTTP status of a backend rejection, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ActionError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ApiError> for ActionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Decode(msg) => ActionError::Decode(msg),
            other => ActionError::Transport(other.to_string()),
        }
    }
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Decode(msg) => FetchError::Decode(msg),
            other => FetchError::Transport(other.to_string()),
        }
    }
}

/// Rejected safe-mode lifecycle request. Rejections never change run state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafeModeError {
    #[error("the restart plan is empty")]
    EmptyPlan,

    #[error("a safe-mode run is already in progress")]
    AlreadyRunning,

    #[error("safe mode cannot be closed while a run is in progress")]
    RunInProgress,
}

/// Failure of a command palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    SafeMode(#[from] SafeModeError),
}

/// Why a safe-mode step aborted its run. Appended to the run log verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error("restart of {item} failed: {error}")]
    Restart { item: QueueItem, error: ActionError },

    #[error("{item} did not report running within {}s", waited.as_secs())]
    Timeout { item: QueueItem, waited: Duration },

    #[error("cancelled by operator")]
    Cancelled,
}

/// Invalid startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme '{scheme}' for {field}")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field} has no host")]
    MissingHost { field: &'static str },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
