//! # Data Ingestors Module
//!
//! The two ways telemetry enters the dashboard:
//!
//! - **`polling`**: `PollingCache`, a self-scheduling fetch/refresh/cache unit
//!   per backend resource with request supersession and stale-but-available
//!   error handling.
//! - **`telemetry_wss`**: `StreamClient`, the reconnecting WebSocket client for
//!   the realtime channel.

#![forbid(unsafe_code)]

/// Per-resource polling cache.
pub mod polling;
/// The WebSocket client for the backend's realtime channel.
pub mod telemetry_wss;

// --- Public API Re-exports ---
pub use polling::{PollingCache, Resource, ResourceKind, ResourceState};
pub use telemetry_wss::{ConnectionState, ConnectionStatus, ReconnectPolicy, StreamClient};
