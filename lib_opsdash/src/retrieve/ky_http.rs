//! # HTTP Retrieval Utilities
//!
//! This module provides an asynchronous API client wrapper around `reqwest`.
//! It includes optional middleware for exponential backoff retries of transient
//! failures and standardized JSON response handling.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{header::CONTENT_TYPE, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;

use crate::errors::ApiError;
use crate::retrieve::transport::{ApiResponse, ApiTransport};

/// A flexible asynchronous HTTP client bound to one backend.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    /// * `base_url` - Absolute base URL, ideally ending with `/`.
    /// * `timeout` - Per-request timeout.
    /// * `max_retries` - Transient-failure retries (5xx, timeouts, connect errors).
    ///   `0` disables the retry middleware entirely.
    pub fn new(base_url: Url, timeout: Duration, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("opsdash/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default(); // Fallback to a default client if builder fails.

        let inner = if max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            ClientBuilder::new(client)
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build()
        } else {
            ClientBuilder::new(client).build()
        };

        Self { inner, base_url }
    }

    /// The base URL all paths are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a generic HTTP request and normalizes the response.
    ///
    /// # Errors
    /// Returns an `ApiError` if URL joining or network execution fails, or if a
    /// successful response does not carry a JSON body. Non-2xx statuses are
    /// returned as `Ok` with `success == false`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        // 1. Construct the full absolute URL. Paths are joined relative to the
        //    base so a base like `https://host/dash/` keeps its prefix.
        let full_url = self.base_url.join(path.trim_start_matches('/'))?;
        let mut req = self.inner.request(method.clone(), full_url);

        // 2. Serialize and attach the JSON body if present
        if let Some(b) = body {
            let json_body = serde_json::to_string(b).map_err(|e| ApiError::Decode(e.to_string()))?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        // 3. Execute the request and capture response metadata
        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        log::trace!("{} {} -> {}", method, path, status);

        // 4. Handle the result based on success status
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            let data: Value =
                serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            // Capture the error body as a string for the failure message
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
            })
        }
    }
}

impl ApiTransport for ApiClient {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<ApiResponse, ApiError>> {
        Box::pin(self.request(Method::GET, path, None))
    }

    fn post<'a>(&'a self, path: &'a str, body: Value) -> BoxFuture<'a, Result<ApiResponse, ApiError>> {
        Box::pin(async move { self.request(Method::POST, path, Some(&body)).await })
    }
}
