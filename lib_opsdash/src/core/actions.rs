//! # Action Gateway
//!
//! Single request/response path for every operator action. One call sends
//! exactly one request: there is no retry at this layer.
//!
//! Success means a 2xx response whose body decodes as an [`ActionResponse`]
//! that does not report `success: false`. Everything else is an
//! [`ActionError`] carrying the most useful message available (the server's
//! `message`/`detail`, else the HTTP status text).
//!
//! Restarts share the host with the safe-mode orchestrator. While a run holds
//! the [`SafeModeLock`], plain restart submissions are refused; the
//! orchestrator submits its own steps with a [`SafeModePermit`], which only
//! this crate can create.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::core::plan::{ItemKind, QueueItem};
use crate::errors::ActionError;
use crate::models::actions::{
    ActionResponse, ResolveRequest, RestartRequest, SafeModeMode, SafeModeRequest,
};
use crate::retrieve::transport::ApiTransport;

pub const RESTART_PATH: &str = "/api/actions/restart";
pub const RESOLVE_PATH: &str = "/api/actions/resolve";
pub const SAFE_MODE_PATH: &str = "/api/actions/safe_mode";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    RestartService(String),
    RestartContainer(String),
    ResolveIssue(String),
    SafeModeEnter { reason: Option<String> },
    SafeModeExit,
}

impl ActionRequest {
    pub fn restart(item: &QueueItem) -> Self {
        match item.kind {
            ItemKind::Service => ActionRequest::RestartService(item.name.clone()),
            ItemKind::Container => ActionRequest::RestartContainer(item.name.clone()),
        }
    }

    pub fn is_restart(&self) -> bool {
        matches!(self, ActionRequest::RestartService(_) | ActionRequest::RestartContainer(_))
    }

    pub fn path(&self) -> &'static str {
        match self {
            ActionRequest::RestartService(_) | ActionRequest::RestartContainer(_) => RESTART_PATH,
            ActionRequest::ResolveIssue(_) => RESOLVE_PATH,
            ActionRequest::SafeModeEnter { .. } | ActionRequest::SafeModeExit => SAFE_MODE_PATH,
        }
    }

    fn body(&self) -> Result<Value, ActionError> {
        match self {
            ActionRequest::RestartService(name) => to_body(&RestartRequest {
                kind: ItemKind::Service,
                name: name.clone(),
            }),
            ActionRequest::RestartContainer(name) => to_body(&RestartRequest {
                kind: ItemKind::Container,
                name: name.clone(),
            }),
            ActionRequest::ResolveIssue(issue_id) => to_body(&ResolveRequest {
                issue_id: issue_id.clone(),
            }),
            ActionRequest::SafeModeEnter { reason } => to_body(&SafeModeRequest {
                mode: SafeModeMode::Enter,
                reason: reason.clone(),
            }),
            ActionRequest::SafeModeExit => to_body(&SafeModeRequest {
                mode: SafeModeMode::Exit,
                reason: None,
            }),
        }
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRequest::RestartService(name) => write!(f, "restart service {name}"),
            ActionRequest::RestartContainer(name) => write!(f, "restart container {name}"),
            ActionRequest::ResolveIssue(id) => write!(f, "resolve issue {id}"),
            ActionRequest::SafeModeEnter { .. } => f.write_str("enter safe mode"),
            ActionRequest::SafeModeExit => f.write_str("exit safe mode"),
        }
    }
}

fn to_body<T: Serialize>(body: &T) -> Result<Value, ActionError> {
    serde_json::to_value(body).map_err(|e| ActionError::Decode(e.to_string()))
}

/// Result of an accepted action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub message: String,
    /// Steps the backend reports having performed (resolve only).
    pub actions_taken: Vec<String>,
}

/// Shared "a safe-mode run owns restarts" flag.
#[derive(Debug, Clone, Default)]
pub struct SafeModeLock(Arc<AtomicBool>);

impl SafeModeLock {
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `false` if the lock was already held.
    pub(crate) fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Capability to restart while the [`SafeModeLock`] is held.
#[derive(Debug)]
pub struct SafeModePermit(());

impl SafeModePermit {
    pub(crate) fn issue() -> Self {
        SafeModePermit(())
    }
}

/// # Action Gateway
pub struct ActionGateway {
    transport: Arc<dyn ApiTransport>,
    lock: SafeModeLock,
}

impl ActionGateway {
    /// `transport` should not retry: actions are not idempotent.
    pub fn new(transport: Arc<dyn ApiTransport>, lock: SafeModeLock) -> Self {
        Self { transport, lock }
    }

    pub fn lock(&self) -> &SafeModeLock {
        &self.lock
    }

    /// # Submit
    ///
    /// Sends `request` once.
    ///
    /// # Errors
    /// `SafeModeActive` for a restart while a safe-mode run holds the lock;
    /// otherwise whatever the exchange produced.
    pub async fn submit(&self, request: ActionRequest) -> Result<ActionOutcome, ActionError> {
        if request.is_restart() && self.lock.is_held() {
            log::warn!("Refusing to {}: safe-mode run in progress", request);
            return Err(ActionError::SafeModeActive);
        }
        self.send(&request).await
    }

    /// Restart submitted by the safe-mode run that holds the lock.
    pub async fn restart_with_permit(
        &self,
        _permit: &SafeModePermit,
        item: &QueueItem,
    ) -> Result<ActionOutcome, ActionError> {
        self.send(&ActionRequest::restart(item)).await
    }

    async fn send(&self, request: &ActionRequest) -> Result<ActionOutcome, ActionError> {
        let result = self.exchange(request).await;
        match &result {
            Ok(outcome) => log::info!("Action '{}' accepted: {}", request, outcome.message),
            Err(e) => log::error!("Action '{}' failed: {}", request, e),
        }
        result
    }

    async fn exchange(&self, request: &ActionRequest) -> Result<ActionOutcome, ActionError> {
        let response = self.transport.post(request.path(), request.body()?).await?;

        if !response.success {
            return Err(ActionError::Rejected {
                status: response.status,
                message: response.failure_message(),
            });
        }

        let body: ActionResponse = serde_json::from_value(response.data.unwrap_or(Value::Null))
            .map_err(|e| ActionError::Decode(e.to_string()))?;

        if !body.success {
            let message = if body.message.is_empty() {
                format!("backend refused to {request}")
            } else {
                body.message
            };
            return Err(ActionError::Rejected { status: response.status, message });
        }

        Ok(ActionOutcome {
            message: body.message,
            actions_taken: body.actions_taken,
        })
    }
}
