//! # Transport Seam
//!
//! `ApiTransport` is the single boundary between the orchestration core and
//! the network. It is object-safe (`Arc<dyn ApiTransport>`) so the caches,
//! the action gateway and the safe-mode orchestrator can share one client, and
//! tests can swap in an in-memory backend.

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;

use crate::errors::ApiError;

/// A normalized HTTP exchange.
///
/// A non-2xx status is *not* an error at this layer; callers decide what a
/// failure means for them (stale data for a cache, a rejection for an action).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// The decoded JSON body of a successful response.
    pub data: Option<Value>,
    /// The raw body of a failed response, if it could be read.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

impl ApiResponse {
    /// A 2xx response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            error_body: None,
            status: 200,
            success: true,
        }
    }

    /// A failed response with the raw body the server sent.
    pub fn failed(status: u16, error_body: impl Into<String>) -> Self {
        Self {
            data: None,
            error_body: Some(error_body.into()),
            status,
            success: false,
        }
    }

    /// Human readable reason for a failed response.
    ///
    /// Prefers a server-provided `message` or `detail` field of a JSON error
    /// body, then a short plain-text body, then the canonical status text.
    pub fn failure_message(&self) -> String {
        if let Some(body) = self.error_body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            if let Ok(json) = serde_json::from_str::<Value>(body) {
                for key in ["message", "detail", "error"] {
                    if let Some(text) = json.get(key).and_then(Value::as_str) {
                        return text.to_string();
                    }
                }
            } else if body.len() <= 200 && !body.starts_with('<') {
                return body.to_string();
            }
        }

        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// # API Transport
///
/// Relative `path`s (e.g. `/api/system`) are resolved against the backend
/// base URL by the implementation.
pub trait ApiTransport: Send + Sync {
    /// Issues a `GET` and decodes a successful body as JSON.
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<ApiResponse, ApiError>>;

    /// Issues a `POST` with a JSON body and decodes a successful body as JSON.
    fn post<'a>(&'a self, path: &'a str, body: Value) -> BoxFuture<'a, Result<ApiResponse, ApiError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_preferred() {
        let resp = ApiResponse::failed(500, r#"{"detail":"Failed to restart service nginx: unit not found"}"#);
        assert_eq!(resp.failure_message(), "Failed to restart service nginx: unit not found");

        let resp = ApiResponse::failed(400, r#"{"success":false,"message":"bad type"}"#);
        assert_eq!(resp.failure_message(), "bad type");
    }

    #[test]
    fn falls_back_to_status_text() {
        assert_eq!(ApiResponse::failed(404, "").failure_message(), "Not Found");
        assert_eq!(
            ApiResponse::failed(502, "<html><body>bad gateway</body></html>").failure_message(),
            "Bad Gateway"
        );
        assert_eq!(ApiResponse::failed(503, "upstream down").failure_message(), "upstream down");
    }
}
