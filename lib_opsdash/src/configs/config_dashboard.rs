//! # Dashboard Settings
//!
//! Settings are resolved once at startup and are immutable afterwards. The only
//! non-trivial step is endpoint resolution:
//!
//! - an empty API base means "same origin", i.e. the configured page origin;
//! - an empty WebSocket URL is derived from the page origin as
//!   `<ws|wss>://<host[:port]>/ws`, using the secure scheme when the origin is
//!   served over HTTPS.

use std::time::Duration;

use url::Url;

use crate::core::safe_mode::SafeModeTimings;
use crate::errors::ConfigError;
use crate::ingestors::telemetry_wss::ReconnectPolicy;

/// Origin used when nothing else is configured (the backend's default bind).
pub const DEFAULT_ORIGIN: &str = "http://localhost:3001";
/// Path of the realtime channel on the backend.
pub const DEFAULT_WS_PATH: &str = "/ws";
/// Capacity of the rolling chart buffer fed by `system_update` frames.
pub const DEFAULT_BUFFER_CAPACITY: usize = 120;

/// Fully resolved network endpoints of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Base URL every `/api/*` path is joined onto. Always ends with `/`.
    pub api_base: Url,
    /// Absolute `ws://` or `wss://` URL of the realtime channel.
    pub ws_url: Url,
}

impl Endpoints {
    /// Resolves the endpoints from the raw configuration strings.
    ///
    /// `api_base` and `ws_url` may be empty (after trimming), in which case they
    /// are derived from `origin`.
    pub fn resolve(origin: &str, api_base: &str, ws_url: &str) -> Result<Self, ConfigError> {
        let origin = parse_url("origin", origin.trim())?;
        require_scheme("origin", &origin, &["http", "https"])?;

        let api_base = match api_base.trim() {
            "" => origin.clone(),
            raw => {
                let url = parse_url("api base", raw)?;
                require_scheme("api base", &url, &["http", "https"])?;
                url
            }
        };

        let ws_url = match ws_url.trim() {
            "" => derive_ws_url(&origin)?,
            raw => {
                let url = parse_url("websocket", raw)?;
                require_scheme("websocket", &url, &["ws", "wss"])?;
                url
            }
        };

        Ok(Self {
            api_base: with_trailing_slash(api_base),
            ws_url,
        })
    }
}

/// Derives the realtime channel URL from a page origin.
pub fn derive_ws_url(origin: &Url) -> Result<Url, ConfigError> {
    let scheme = match origin.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ConfigError::UnsupportedScheme {
                field: "origin",
                scheme: other.to_string(),
            })
        }
    };
    let host = origin
        .host_str()
        .ok_or(ConfigError::MissingHost { field: "origin" })?;
    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    parse_url("websocket", &format!("{scheme}://{authority}{DEFAULT_WS_PATH}"))
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })?;
    if url.host_str().is_none() {
        return Err(ConfigError::MissingHost { field });
    }
    Ok(url)
}

fn require_scheme(field: &'static str, url: &Url, allowed: &[&str]) -> Result<(), ConfigError> {
    if allowed.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedScheme {
            field,
            scheme: url.scheme().to_string(),
        })
    }
}

// `Url::join` replaces the last path segment unless the base ends with a slash.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Everything the library needs to build a `Dashboard`.
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub endpoints: Endpoints,
    /// Window requested from `/api/history`.
    pub history_days: u32,
    /// Per-request timeout of the HTTP client.
    pub http_timeout: Duration,
    /// Transient retries for polled GETs. Actions never retry.
    pub http_retries: u32,
    pub reconnect: ReconnectPolicy,
    pub buffer_capacity: usize,
    pub safe_mode: SafeModeTimings,
}

impl DashboardSettings {
    /// Settings with library defaults around already resolved endpoints.
    pub fn with_endpoints(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            history_days: 1,
            http_timeout: Duration::from_secs(10),
            http_retries: 1,
            reconnect: ReconnectPolicy::default(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            safe_mode: SafeModeTimings::default(),
        }
    }
}
