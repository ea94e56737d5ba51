//! In-memory backend for unit tests.
//!
//! Responses are scripted per path as a queue; the last scripted response of a
//! path is sticky. Every call is appended to a journal so tests can assert on
//! the exact order of requests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::errors::ApiError;
use crate::retrieve::transport::{ApiResponse, ApiTransport};

#[derive(Clone)]
pub(crate) struct Scripted {
    pub delay: Duration,
    pub response: Result<ApiResponse, String>,
}

impl Scripted {
    pub fn ok(data: Value) -> Self {
        Self { delay: Duration::ZERO, response: Ok(ApiResponse::ok(data)) }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self { delay: Duration::ZERO, response: Ok(ApiResponse::failed(status, body)) }
    }

    pub fn network(msg: &str) -> Self {
        Self { delay: Duration::ZERO, response: Err(msg.to_string()) }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    journal: Mutex<Vec<String>>,
    bodies: Mutex<Vec<(String, Value)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one scripted response for `path`.
    pub fn script(&self, path: &str, scripted: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(scripted);
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn posted(&self, path: &str) -> Vec<Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, b)| b.clone())
            .collect()
    }

    fn next(&self, path: &str) -> Scripted {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Scripted::status(404, r#"{"detail":"Not Found"}"#),
        }
    }

    async fn respond(&self, scripted: Scripted) -> Result<ApiResponse, ApiError> {
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted
            .response
            .map_err(|msg| ApiError::Network(reqwest_middleware::Error::Middleware(anyhow::anyhow!(msg))))
    }
}

impl ApiTransport for FakeBackend {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<ApiResponse, ApiError>> {
        self.journal.lock().unwrap().push(format!("GET {path}"));
        let scripted = self.next(path);
        Box::pin(self.respond(scripted))
    }

    fn post<'a>(&'a self, path: &'a str, body: Value) -> BoxFuture<'a, Result<ApiResponse, ApiError>> {
        let label = body
            .get("name")
            .or_else(|| body.get("issue_id"))
            .or_else(|| body.get("mode"))
            .and_then(Value::as_str)
            .unwrap_or("");
        self.journal.lock().unwrap().push(format!("POST {path} {label}"));
        self.bodies.lock().unwrap().push((path.to_string(), body));
        let scripted = self.next(path);
        Box::pin(self.respond(scripted))
    }
}
