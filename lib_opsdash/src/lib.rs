//! # lib_opsdash
//!
//! Client-side orchestration core of the `opsdash` monitoring dashboard.
//!
//! The crate keeps a live, cached view of one remote host's telemetry
//! (system metrics, services, containers, applications, security, diagnostics,
//! history) and lets an operator issue corrective actions, including the guided
//! multi-step safe-mode restart sequence.
//!
//! ## Layout
//!
//! - **`retrieve`**: the HTTP transport seam and the `reqwest` based `ApiClient`.
//! - **`models`**: serde payloads for every backend endpoint and stream frame.
//! - **`ingestors`**: the per-resource polling cache and the realtime WebSocket client.
//! - **`core`**: dispatcher, reconciler, rolling point buffer, action gateway,
//!   restart plan heuristic, safe-mode orchestrator and the command registry.
//! - **`dashboard`**: wires all of the above into one shared state object.
//! - **`configs`** / **`loggers`**: resolved settings and log sinks for binaries.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod configs;
pub mod core;
pub mod dashboard;
pub mod errors;
pub mod ingestors;
#[cfg(feature = "loggers")]
pub mod loggers;
pub mod models;
pub mod retrieve;

// --- Public API Re-exports ---
pub use configs::config_dashboard::{DashboardSettings, Endpoints};
pub use dashboard::Dashboard;
pub use errors::{
    ActionError, ApiError, CommandError, ConfigError, FetchError, SafeModeError, StepFailure,
};
