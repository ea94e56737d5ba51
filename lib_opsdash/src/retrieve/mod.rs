//! # Data Retrieval Module
//!
//! Everything that talks HTTP to the telemetry backend goes through the
//! [`ApiTransport`] seam defined here. Components above it (polling caches,
//! the action gateway) interpret `ApiResponse`s; they never see `reqwest`.
//!
//! ## Contained Modules:
//!
//! - **`transport`**: the object-safe `ApiTransport` trait and `ApiResponse`.
//! - **`ky_http`**: `ApiClient`, the `reqwest` + `reqwest-middleware`
//!   implementation with optional transient retries.

#![forbid(unsafe_code)]

/// The transport trait and the normalized HTTP response.
pub mod transport;
/// Generic HTTP API client with retry middleware.
pub mod ky_http;

#[cfg(test)]
pub(crate) mod fake;

pub use ky_http::ApiClient;
pub use transport::{ApiResponse, ApiTransport};
